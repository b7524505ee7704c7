//! Persistence collaborator contracts.
//!
//! The relay writes messages, notifications and presence through these
//! traits and never reads its own writes back. The read methods exist for the
//! boundary layer (history, notification list, user directory).

use crate::model::{
    Identity, Message, MessageDraft, Notification, NotificationDraft, PresenceRecord, User,
};
use async_trait::async_trait;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or refused the write.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The write conflicts with existing data.
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Message persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Store a new message, assigning its ID and creation time.
    async fn create_message(&self, draft: MessageDraft) -> Result<Message, StoreError>;

    /// Find a message by ID.
    async fn find_message(&self, id: &str) -> Result<Option<Message>, StoreError>;

    /// All messages exchanged between two users, oldest first.
    async fn conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<Message>, StoreError>;
}

/// Notification persistence.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Store a new unread notification.
    async fn create_notification(
        &self,
        draft: NotificationDraft,
    ) -> Result<Notification, StoreError>;

    /// A user's notifications, newest first.
    async fn notifications_for(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError>;

    /// Mark a notification owned by `user_id` as read.
    ///
    /// Returns `false` if no such notification exists for that owner.
    async fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<bool, StoreError>;
}

/// User presence persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Write a user's presence fields.
    async fn update_presence(
        &self,
        user: &Identity,
        presence: PresenceRecord,
    ) -> Result<(), StoreError>;

    /// Find a user by ID.
    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// All users except one, online first then by username.
    async fn users_except(&self, id: &str) -> Result<Vec<User>, StoreError>;
}

/// Everything the relay needs from persistence.
pub trait Store: MessageStore + NotificationStore + UserStore {}

impl<T: MessageStore + NotificationStore + UserStore> Store for T {}
