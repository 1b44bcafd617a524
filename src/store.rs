use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{ChatMessage, Submission, SubmissionDetail, SubmissionStatus, User};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("Submission not found")]
    SubmissionNotFound,
    #[error("User not found")]
    UserNotFound,
}

/// Intake fields for a submission; the store assigns id, timestamp and status.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub detail: SubmissionDetail,
}

/// In-memory repository owning the submission list, user list and message
/// log. State lives for the process lifetime only; a restart loses it.
///
/// Every collection sits behind its own `RwLock` and no method holds a lock
/// across an await on external I/O, so find-then-mutate stays atomic.
pub struct Store {
    submissions: RwLock<Vec<Submission>>,
    users: RwLock<Vec<User>>,
    messages: RwLock<Vec<ChatMessage>>,
    next_submission_id: AtomicU64,
    next_message_seq: AtomicU64,
}

impl Store {
    pub fn new() -> Self {
        Store {
            submissions: RwLock::new(Vec::new()),
            users: RwLock::new(Vec::new()),
            messages: RwLock::new(Vec::new()),
            next_submission_id: AtomicU64::new(1),
            next_message_seq: AtomicU64::new(0),
        }
    }

    pub async fn create_submission(&self, new: NewSubmission) -> Submission {
        let submission = Submission {
            id: self.next_submission_id.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            status: SubmissionStatus::Pending,
            name: new.name,
            email: new.email,
            phone: new.phone,
            user_id: new.user_id,
            user_name: new.user_name,
            detail: new.detail,
        };
        let mut submissions = self.submissions.write().await;
        submissions.push(submission.clone());
        submission
    }

    pub async fn submission(&self, id: u64) -> Result<Submission, StoreError> {
        let submissions = self.submissions.read().await;
        submissions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(StoreError::SubmissionNotFound)
    }

    /// Overwrites the status unconditionally; decided records can be
    /// re-decided through the admin endpoint.
    pub async fn set_submission_status(
        &self,
        id: u64,
        status: SubmissionStatus,
    ) -> Result<Submission, StoreError> {
        let mut submissions = self.submissions.write().await;
        let submission = submissions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::SubmissionNotFound)?;
        submission.status = status;
        Ok(submission.clone())
    }

    /// All submissions in insertion order.
    pub async fn submissions(&self) -> Vec<Submission> {
        self.submissions.read().await.clone()
    }

    pub async fn add_user(&self, user: User) {
        let mut users = self.users.write().await;
        users.push(user);
    }

    pub async fn users(&self) -> Vec<User> {
        self.users.read().await.clone()
    }

    pub async fn update_user(
        &self,
        id: &str,
        role: Option<String>,
        banned: Option<bool>,
    ) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::UserNotFound)?;
        if let Some(role) = role {
            user.role = role;
        }
        if let Some(banned) = banned {
            user.banned = banned;
        }
        Ok(user.clone())
    }

    pub async fn append_message(&self, message: ChatMessage) {
        let mut messages = self.messages.write().await;
        messages.push(message);
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().await.clone()
    }

    /// Time-derived, unique message id: `<millis>-<seq>`.
    pub fn next_message_id(&self) -> String {
        let seq = self.next_message_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", Utc::now().timestamp_millis(), seq)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gift_card(name: &str, amount: f64) -> NewSubmission {
        NewSubmission {
            name: name.to_string(),
            email: format!("{name}@x.com"),
            phone: "555".to_string(),
            user_id: None,
            user_name: None,
            detail: SubmissionDetail::GiftCard {
                amount,
                images: vec!["img1".to_string(), "img2".to_string()],
            },
        }
    }

    #[tokio::test]
    async fn create_then_find_returns_pending() {
        let store = Store::new();
        let created = store.create_submission(gift_card("Ann", 250.0)).await;
        let found = store.submission(created.id).await.unwrap();
        assert_eq!(found.status, SubmissionStatus::Pending);
        assert_eq!(found.name, "Ann");
    }

    #[tokio::test]
    async fn ids_are_unique_and_monotonic() {
        let store = Store::new();
        let a = store.create_submission(gift_card("a", 50.0)).await;
        let b = store.create_submission(gift_card("b", 50.0)).await;
        let c = store.create_submission(gift_card("c", 50.0)).await;
        assert!(a.id < b.id && b.id < c.id);
    }

    #[tokio::test]
    async fn set_status_reflects_on_read() {
        let store = Store::new();
        let created = store.create_submission(gift_card("Ann", 250.0)).await;
        store
            .set_submission_status(created.id, SubmissionStatus::Approved)
            .await
            .unwrap();
        let found = store.submission(created.id).await.unwrap();
        assert_eq!(found.status, SubmissionStatus::Approved);
        // A second read still sees the decision.
        let again = store.submission(created.id).await.unwrap();
        assert_eq!(again.status, SubmissionStatus::Approved);
    }

    #[tokio::test]
    async fn set_status_unknown_id_is_not_found_and_leaves_store_alone() {
        let store = Store::new();
        store.create_submission(gift_card("Ann", 250.0)).await;
        let err = store
            .set_submission_status(9999, SubmissionStatus::Approved)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::SubmissionNotFound);
        assert_eq!(store.submissions().await.len(), 1);
        assert_eq!(
            store.submissions().await[0].status,
            SubmissionStatus::Pending
        );
    }

    #[tokio::test]
    async fn submissions_keep_insertion_order() {
        let store = Store::new();
        for name in ["first", "second", "third"] {
            store.create_submission(gift_card(name, 50.0)).await;
        }
        let names: Vec<String> = store
            .submissions()
            .await
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn update_user_patches_role_and_banned() {
        let store = Store::new();
        store
            .add_user(User {
                id: "u1".to_string(),
                user_name: Some("ann".to_string()),
                full_name: None,
                email: None,
                role: "user".to_string(),
                banned: false,
            })
            .await;

        let updated = store
            .update_user("u1", Some("admin".to_string()), None)
            .await
            .unwrap();
        assert_eq!(updated.role, "admin");
        assert!(!updated.banned);

        let updated = store.update_user("u1", None, Some(true)).await.unwrap();
        assert_eq!(updated.role, "admin");
        assert!(updated.banned);

        assert_eq!(
            store.update_user("nope", None, None).await.unwrap_err(),
            StoreError::UserNotFound
        );
    }

    #[tokio::test]
    async fn message_ids_are_unique() {
        let store = Store::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(store.next_message_id()));
        }
    }
}
