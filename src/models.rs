use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Price of one DWT token in USD. Gift-card amounts convert at this rate.
pub const DWT_PRICE_USD: f64 = 50.0;

/// Tokens earned for a gift-card amount: floor(amount / 50).
pub fn dwt_tokens(amount: f64) -> i64 {
    (amount / DWT_PRICE_USD).floor() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionKind {
    GiftCard,
    TokenPurchase,
}

/// Kind-specific submission payload. Image strings are kept exactly as
/// received: either a data URL (base64 payload) or an already-hosted URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SubmissionDetail {
    GiftCard { amount: f64, images: Vec<String> },
    TokenPurchase { amount: u32, price: f64, image: String },
}

impl SubmissionDetail {
    pub fn kind(&self) -> SubmissionKind {
        match self {
            SubmissionDetail::GiftCard { .. } => SubmissionKind::GiftCard,
            SubmissionDetail::TokenPurchase { .. } => SubmissionKind::TokenPurchase,
        }
    }
}

/// One user request awaiting a manual approve/reject decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub status: SubmissionStatus,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(flatten)]
    pub detail: SubmissionDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: String,
    pub banned: bool,
}

/// Display identity attached to chat traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "userName", skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    System,
}

/// One unit of room traffic. Every message belongs to exactly one room;
/// private messages additionally carry `private: true` and target a
/// `user:<id>` room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub room: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<ChatUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub timestamp: i64,
    #[serde(default)]
    pub private: bool,
}
