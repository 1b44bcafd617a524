//! Inbound side of the bot integration: decision callbacks from the inline
//! buttons and the small set of admin text commands.

use log::{info, warn};

use crate::config::TelegramConfig;
use crate::models::{dwt_tokens, Submission, SubmissionDetail, SubmissionStatus};
use crate::store::Store;
use crate::telegram::{
    CallbackQuery, CallbackToken, Decision, IncomingMessage, TelegramClient, Update,
};

const START_TEXT: &str =
    "🤖 Pennysavia admin bot.\nCommands: /pending, /approved, /stats";

/// What a decision callback did to the store. The callback is acknowledged
/// on every variant; only `Applied` also sends a confirmation message.
#[derive(Debug)]
pub enum DecisionOutcome {
    Applied(Submission, Decision),
    UnknownSubmission,
    MalformedToken,
}

/// Parse and apply a decision token against the store. Separated from the
/// transport so the mutation can be exercised without a live bot.
pub async fn apply_decision(store: &Store, data: Option<&str>) -> DecisionOutcome {
    let Some(token) = data.and_then(CallbackToken::parse) else {
        return DecisionOutcome::MalformedToken;
    };
    match store
        .set_submission_status(token.submission_id, token.action.status())
        .await
    {
        Ok(submission) => DecisionOutcome::Applied(submission, token.action),
        Err(_) => DecisionOutcome::UnknownSubmission,
    }
}

#[derive(Clone)]
pub struct Bot {
    client: TelegramClient,
    admin_chat_id: String,
}

impl Bot {
    pub fn new(config: &TelegramConfig) -> Self {
        Bot {
            client: TelegramClient::new(config.bot_token.clone()),
            admin_chat_id: config.admin_chat_id.clone(),
        }
    }

    pub async fn handle_update(&self, store: &Store, update: Update) {
        if let Some(query) = update.callback_query {
            self.handle_callback(store, query).await;
        } else if let Some(message) = update.message {
            self.handle_command(store, message).await;
        }
    }

    async fn handle_callback(&self, store: &Store, query: CallbackQuery) {
        let clicked_by = query
            .from
            .as_ref()
            .map(|s| s.username.clone().unwrap_or_else(|| s.id.to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        let outcome = apply_decision(store, query.data.as_deref()).await;

        let ack = match &outcome {
            DecisionOutcome::Applied(submission, decision) => {
                info!(
                    "Submission {} {} by {}",
                    submission.id,
                    submission.status.as_str(),
                    clicked_by
                );
                let confirmation = match decision {
                    Decision::Approve => format!("✅ Submission #{} approved", submission.id),
                    Decision::Reject => format!("❌ Submission #{} rejected", submission.id),
                };
                if let Err(e) = self
                    .client
                    .send_message(&self.admin_chat_id, &confirmation)
                    .await
                {
                    warn!("Failed to send decision confirmation: {e}");
                }
                match decision {
                    Decision::Approve => "Approved",
                    Decision::Reject => "Rejected",
                }
            }
            DecisionOutcome::UnknownSubmission => "Submission not found",
            DecisionOutcome::MalformedToken => "Malformed decision data",
        };

        // The click is acknowledged on every path so the button never hangs.
        if let Err(e) = self.client.answer_callback(&query.id, ack).await {
            warn!("Failed to answer callback {}: {}", query.id, e);
        }
    }

    async fn handle_command(&self, store: &Store, message: IncomingMessage) {
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let command = text.split_whitespace().next().unwrap_or("");
        let chat_id = message.chat.id.to_string();
        let authorized = chat_id == self.admin_chat_id;

        let reply = match command {
            "/start" => Some(START_TEXT.to_string()),
            "/pending" if authorized => Some(format_submission_list(
                &store.submissions().await,
                SubmissionStatus::Pending,
            )),
            "/approved" if authorized => Some(format_submission_list(
                &store.submissions().await,
                SubmissionStatus::Approved,
            )),
            "/stats" if authorized => Some(format_stats(&store.submissions().await)),
            _ => {
                // Privileged commands from other chats are accepted silently.
                if matches!(command, "/pending" | "/approved" | "/stats") {
                    let sender = message
                        .from
                        .as_ref()
                        .and_then(|s| s.username.as_deref())
                        .unwrap_or("unknown");
                    info!("Ignoring {command} from unauthorized chat {chat_id} ({sender})");
                }
                None
            }
        };

        if let Some(reply) = reply {
            if let Err(e) = self.client.send_message(&chat_id, &reply).await {
                warn!("Failed to reply to {command} in chat {chat_id}: {e}");
            }
        }
    }
}

fn format_submission_list(submissions: &[Submission], status: SubmissionStatus) -> String {
    let matching: Vec<&Submission> = submissions.iter().filter(|s| s.status == status).collect();
    if matching.is_empty() {
        return format!("No {} submissions.", status.as_str());
    }
    let mut out = format!("{} submission(s) {}:\n", matching.len(), status.as_str());
    for submission in matching {
        match &submission.detail {
            SubmissionDetail::GiftCard { amount, .. } => {
                out.push_str(&format!(
                    "#{} gift-card ${:.2} ({} tokens) from {}\n",
                    submission.id,
                    amount,
                    dwt_tokens(*amount),
                    submission.name
                ));
            }
            SubmissionDetail::TokenPurchase { amount, price, .. } => {
                out.push_str(&format!(
                    "#{} token-purchase {} DWT ${:.2} from {}\n",
                    submission.id, amount, price, submission.name
                ));
            }
        }
    }
    out
}

fn format_stats(submissions: &[Submission]) -> String {
    let count = |status: SubmissionStatus| submissions.iter().filter(|s| s.status == status).count();
    format!(
        "📊 *Submission stats*\nTotal: {}\nPending: {}\nApproved: {}\nRejected: {}",
        submissions.len(),
        count(SubmissionStatus::Pending),
        count(SubmissionStatus::Approved),
        count(SubmissionStatus::Rejected),
    )
}
