//! Persisted entities and identities.
//!
//! Messages, notifications and user presence are owned by the store. This
//! crate writes them but only the boundary layer reads them back.

use chrono::{DateTime, Utc};
use parley_protocol::{
    MessageType, NewNotification, NotificationKind, ReceiveMessage, ServerEvent,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// An authenticated user identity extracted from a credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

impl Identity {
    #[must_use]
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// A chat message as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build the `receive_message` event delivered to the receiver.
    #[must_use]
    pub fn to_receive_event(&self, sender_username: &str) -> ServerEvent {
        ServerEvent::ReceiveMessage(ReceiveMessage {
            id: self.id.clone(),
            sender_id: self.sender_id.clone(),
            sender_username: sender_username.to_string(),
            content: self.content.clone(),
            message_type: self.message_type,
            timestamp: self.created_at,
        })
    }
}

/// A message that has not been stored yet.
///
/// The store assigns `id`, `created_at` and `is_read`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub message_type: MessageType,
}

/// A notification as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    /// Owner of the notification.
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Build the `new_notification` event pushed to the owner.
    #[must_use]
    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::NewNotification(NewNotification {
            id: self.id.clone(),
            kind: self.kind,
            title: self.title.clone(),
            content: self.content.clone(),
            timestamp: self.created_at,
        })
    }
}

/// A notification that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub data: serde_json::Value,
}

impl NotificationDraft {
    /// The notification recorded for the receiver of a stored message.
    ///
    /// `data` always carries the sender and message IDs.
    #[must_use]
    pub fn for_message(message: &Message, sender_username: &str) -> Self {
        Self {
            user_id: message.receiver_id.clone(),
            kind: NotificationKind::Message,
            title: format!("New message from {}", sender_username),
            content: message.content.clone(),
            data: json!({
                "senderId": message.sender_id,
                "messageId": message.id,
            }),
        }
    }
}

/// Durable presence fields of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

impl PresenceRecord {
    #[must_use]
    pub fn online(at: DateTime<Utc>) -> Self {
        Self {
            is_online: true,
            last_seen: at,
        }
    }

    #[must_use]
    pub fn offline(at: DateTime<Utc>) -> Self {
        Self {
            is_online: false,
            last_seen: at,
        }
    }
}

/// A user directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

impl User {
    /// Presence fields of this user.
    #[must_use]
    pub fn presence(&self) -> PresenceRecord {
        PresenceRecord {
            is_online: self.is_online,
            last_seen: self.last_seen,
        }
    }
}
