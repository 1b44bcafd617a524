use std::env;
use std::path::PathBuf;

use log::warn;

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub admin_chat_id: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub upload_dir: PathBuf,
    pub telegram: Option<TelegramConfig>,
}

impl Config {
    /// Reads configuration from the environment (after `.env` loading).
    /// Missing Telegram credentials disable forwarding but never fail
    /// startup.
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(4000);
        let upload_dir = env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("public/uploads"));

        let telegram = match (
            env::var("TELEGRAM_BOT_TOKEN"),
            env::var("TELEGRAM_ADMIN_CHAT_ID"),
        ) {
            (Ok(bot_token), Ok(admin_chat_id))
                if !bot_token.is_empty() && !admin_chat_id.is_empty() =>
            {
                Some(TelegramConfig {
                    bot_token,
                    admin_chat_id,
                })
            }
            _ => {
                warn!(
                    "TELEGRAM_BOT_TOKEN or TELEGRAM_ADMIN_CHAT_ID not set; \
                     Telegram forwarding disabled"
                );
                None
            }
        };

        Config {
            port,
            upload_dir,
            telegram,
        }
    }
}
