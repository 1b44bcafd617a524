//! Formats newly created submissions into admin-chat notifications and
//! dispatches them without blocking the intake request.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::{debug, warn};

use crate::config::TelegramConfig;
use crate::models::{dwt_tokens, Submission, SubmissionDetail};
use crate::telegram::{decision_keyboard, TelegramClient, TelegramError};

/// A photo payload ready for the bot transport, classified from however the
/// submitter supplied the image. The stored submission is never rewritten.
pub enum PhotoPayload {
    Url(String),
    Bytes(Vec<u8>),
}

/// Hosted URLs pass through; anything else is treated as a base64 payload
/// (with an optional `data:...;base64,` prefix) and decoded.
pub fn classify_image(image: &str) -> Result<PhotoPayload, TelegramError> {
    if image.starts_with("http://") || image.starts_with("https://") {
        return Ok(PhotoPayload::Url(image.to_string()));
    }
    let data = match image.split_once(',') {
        Some((_, rest)) => rest,
        None => image,
    };
    let content = BASE64
        .decode(data.trim())
        .map_err(|_| TelegramError::InvalidImage)?;
    Ok(PhotoPayload::Bytes(content))
}

#[derive(Clone)]
pub struct Notifier {
    bot: Option<(TelegramClient, String)>,
}

impl Notifier {
    pub fn new(config: Option<&TelegramConfig>) -> Self {
        let bot = config.map(|c| {
            (
                TelegramClient::new(c.bot_token.clone()),
                c.admin_chat_id.clone(),
            )
        });
        Notifier { bot }
    }

    /// A notifier that drops everything; used when the bot is unconfigured.
    pub fn disabled() -> Self {
        Notifier { bot: None }
    }

    pub fn is_configured(&self) -> bool {
        self.bot.is_some()
    }

    /// Fire-and-forget: the intake response never waits on Telegram, and a
    /// failed send is logged and dropped. The submission stays pending either
    /// way.
    pub fn dispatch(&self, submission: Submission) {
        let Some((client, chat_id)) = self.bot.clone() else {
            debug!(
                "Telegram not configured, skipping notification for submission {}",
                submission.id
            );
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = notify(&client, &chat_id, &submission).await {
                warn!(
                    "Telegram notification error for submission {}: {}",
                    submission.id, e
                );
            }
        });
    }

    /// Forward a raw gift-card code with its photos to the admin chat.
    /// Unlike `dispatch` this is awaited by its endpoint and surfaces errors.
    pub async fn forward_gift_code(
        &self,
        code: &str,
        images: &[String],
    ) -> Result<(), TelegramError> {
        let Some((client, chat_id)) = &self.bot else {
            return Ok(());
        };
        let text = format!(
            "🎁 New Apple gift card submission:\n💾 Code: {code}\n📷 Images: {} file(s)",
            images.len()
        );
        client.send_message(chat_id, &text).await?;
        for (index, image) in images.iter().enumerate() {
            match classify_image(image)? {
                PhotoPayload::Url(url) => client.send_photo_url(chat_id, &url, None).await?,
                PhotoPayload::Bytes(content) => {
                    client
                        .send_photo_bytes(chat_id, format!("gift-card-{index}.jpg"), content)
                        .await?;
                }
            }
        }
        Ok(())
    }
}

/// Send the notification text with its Approve/Reject buttons, then each
/// attached image.
pub async fn notify(
    client: &TelegramClient,
    chat_id: &str,
    submission: &Submission,
) -> Result<(), TelegramError> {
    let keyboard = decision_keyboard(submission.detail.kind(), submission.id);
    client
        .send_message_with_keyboard(chat_id, &submission_text(submission), keyboard)
        .await?;

    match &submission.detail {
        SubmissionDetail::GiftCard { images, .. } => {
            for (index, image) in images.iter().enumerate() {
                match classify_image(image)? {
                    PhotoPayload::Url(url) => client.send_photo_url(chat_id, &url, None).await?,
                    PhotoPayload::Bytes(content) => {
                        client
                            .send_photo_bytes(
                                chat_id,
                                format!("giftcard-{}-{index}.jpg", submission.id),
                                content,
                            )
                            .await?;
                    }
                }
            }
        }
        SubmissionDetail::TokenPurchase { amount, image, .. } => {
            let caption = format!("Payment Proof for {amount} DWT");
            match classify_image(image)? {
                PhotoPayload::Url(url) => {
                    client.send_photo_url(chat_id, &url, Some(&caption)).await?;
                }
                PhotoPayload::Bytes(content) => {
                    client
                        .send_photo_bytes(chat_id, format!("dwt-{}.jpg", submission.id), content)
                        .await?;
                }
            }
        }
    }
    Ok(())
}

fn submission_text(submission: &Submission) -> String {
    let user_id = submission.user_id.as_deref().unwrap_or("-");
    let timestamp = submission.timestamp.format("%Y-%m-%d %H:%M:%S UTC");
    match &submission.detail {
        SubmissionDetail::GiftCard { amount, .. } => format!(
            "🎁 *NEW GIFT CARD SUBMISSION*\n\
             👤 Name: {}\n\
             📧 Email: {}\n\
             📱 Phone: {}\n\
             💰 Amount: ${:.2}\n\
             🪙 Tokens: {}\n\
             🆔 User ID: {user_id}\n\
             ⏰ Timestamp: {timestamp}",
            submission.name,
            submission.email,
            submission.phone,
            amount,
            dwt_tokens(*amount),
        ),
        SubmissionDetail::TokenPurchase { amount, price, .. } => format!(
            "🪙 *NEW DWT PURCHASE REQUEST*\n\
             👤 Name: {}\n\
             📧 Email: {}\n\
             📱 Phone: {}\n\
             💵 Amount: {amount} DWT\n\
             💰 Price: ${price:.2}\n\
             🆔 User ID: {user_id}\n\
             ⏰ Timestamp: {timestamp}",
            submission.name, submission.email, submission.phone,
        ),
    }
}
