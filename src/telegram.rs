//! Outbound transport to the Telegram Bot API plus the inbound update types
//! delivered to the webhook. All sends target the single configured admin
//! chat; callers treat failures as non-fatal.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::models::{SubmissionKind, SubmissionStatus};

const API_BASE: &str = "https://api.telegram.org";

/// HTTP request timeout for a single send.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Telegram API returned HTTP {0}")]
    HttpStatus(u16),
    #[error("Invalid image payload")]
    InvalidImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn status(self) -> SubmissionStatus {
        match self {
            Decision::Approve => SubmissionStatus::Approved,
            Decision::Reject => SubmissionStatus::Rejected,
        }
    }
}

/// Inline-button payload carrying a pending decision against a submission.
///
/// Encoded as compact JSON rather than a delimiter-joined string so an id can
/// never be confused with a field separator. Telegram caps callback data at
/// 64 bytes; the short field names keep the encoding well under that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackToken {
    #[serde(rename = "a")]
    pub action: Decision,
    #[serde(rename = "k")]
    pub kind: SubmissionKind,
    #[serde(rename = "id")]
    pub submission_id: u64,
}

impl CallbackToken {
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn parse(data: &str) -> Option<Self> {
        serde_json::from_str(data).ok()
    }
}

/// Approve/Reject button row for a submission notification.
pub fn decision_keyboard(kind: SubmissionKind, submission_id: u64) -> serde_json::Value {
    let approve = CallbackToken {
        action: Decision::Approve,
        kind,
        submission_id,
    };
    let reject = CallbackToken {
        action: Decision::Reject,
        kind,
        submission_id,
    };
    json!([[
        { "text": "✅ Approve", "callback_data": approve.encode() },
        { "text": "❌ Reject", "callback_data": reject.encode() },
    ]])
}

// ---------------------------------------------------------------------------
// Inbound update types
// ---------------------------------------------------------------------------

/// A webhook update. Exactly one of the optional payloads is set per event;
/// unknown fields from the API are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[allow(dead_code)]
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub from: Option<Sender>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub from: Option<Sender>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(bot_token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        TelegramClient { client, bot_token }
    }

    fn url(&self, method: &str) -> String {
        format!("{API_BASE}/bot{}/{method}", self.bot_token)
    }

    fn check(response: &reqwest::Response) -> Result<(), TelegramError> {
        if !response.status().is_success() {
            return Err(TelegramError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TelegramError> {
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        let response = self
            .client
            .post(self.url("sendMessage"))
            .json(&payload)
            .send()
            .await?;
        Self::check(&response)
    }

    pub async fn send_message_with_keyboard(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: serde_json::Value,
    ) -> Result<(), TelegramError> {
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "reply_markup": { "inline_keyboard": keyboard },
        });
        let response = self
            .client
            .post(self.url("sendMessage"))
            .json(&payload)
            .send()
            .await?;
        Self::check(&response)
    }

    /// Send an already-hosted photo by URL.
    pub async fn send_photo_url(
        &self,
        chat_id: &str,
        photo_url: &str,
        caption: Option<&str>,
    ) -> Result<(), TelegramError> {
        let mut payload = json!({ "chat_id": chat_id, "photo": photo_url });
        if let Some(caption) = caption {
            payload["caption"] = json!(caption);
        }
        let response = self
            .client
            .post(self.url("sendPhoto"))
            .json(&payload)
            .send()
            .await?;
        Self::check(&response)
    }

    /// Upload photo bytes as a multipart form.
    pub async fn send_photo_bytes(
        &self,
        chat_id: &str,
        filename: String,
        content: Vec<u8>,
    ) -> Result<(), TelegramError> {
        let part = reqwest::multipart::Part::bytes(content).file_name(filename);
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part("photo", part);
        let response = self
            .client
            .post(self.url("sendPhoto"))
            .multipart(form)
            .send()
            .await?;
        Self::check(&response)
    }

    /// Acknowledge a callback click so the button never shows as stuck.
    pub async fn answer_callback(
        &self,
        callback_query_id: &str,
        text: &str,
    ) -> Result<(), TelegramError> {
        let payload = json!({
            "callback_query_id": callback_query_id,
            "text": text,
        });
        let response = self
            .client
            .post(self.url("answerCallbackQuery"))
            .json(&payload)
            .send()
            .await?;
        Self::check(&response)
    }
}
