//! Event types for the Parley protocol.
//!
//! Every frame on the wire is one event: a name plus a payload. Both
//! directions are modelled as adjacently tagged enums so that the JSON form
//! reads `{"event": "send_message", "data": {...}}` and dispatch can match
//! exhaustively.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of content carried by a chat message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
}

impl MessageType {
    /// Wire name of the message type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
        }
    }
}

/// Kind of a persisted notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Message,
    Mention,
    System,
}

/// Payload of `send_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    /// Recipient user ID.
    pub receiver_id: String,
    /// Message body, stored verbatim.
    pub content: String,
    /// Content kind, `text` when omitted.
    #[serde(default)]
    pub message_type: MessageType,
}

/// Payload of `typing_start` / `typing_stop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingTarget {
    /// User whose indicator should change.
    pub receiver_id: String,
}

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SendMessage(SendMessage),
    TypingStart(TypingTarget),
    TypingStop(TypingTarget),
}

impl ClientEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::SendMessage(_) => "send_message",
            ClientEvent::TypingStart(_) => "typing_start",
            ClientEvent::TypingStop(_) => "typing_stop",
        }
    }
}

/// Payload of `receive_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveMessage {
    pub id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub content: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
}

/// Payload of `message_sent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// Payload of `new_notification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Payload of `user_online` / `user_offline`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceChange {
    pub user_id: String,
    pub username: String,
}

/// Payload of `user_typing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTyping {
    pub user_id: String,
    pub username: String,
    pub is_typing: bool,
}

/// Payload of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ReceiveMessage(ReceiveMessage),
    MessageSent(MessageSent),
    NewNotification(NewNotification),
    UserOnline(PresenceChange),
    UserOffline(PresenceChange),
    UserTyping(UserTyping),
    Error(ErrorEvent),
}

impl ServerEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ReceiveMessage(_) => "receive_message",
            ServerEvent::MessageSent(_) => "message_sent",
            ServerEvent::NewNotification(_) => "new_notification",
            ServerEvent::UserOnline(_) => "user_online",
            ServerEvent::UserOffline(_) => "user_offline",
            ServerEvent::UserTyping(_) => "user_typing",
            ServerEvent::Error(_) => "error",
        }
    }

    /// Create a `user_online` event.
    #[must_use]
    pub fn user_online(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        ServerEvent::UserOnline(PresenceChange {
            user_id: user_id.into(),
            username: username.into(),
        })
    }

    /// Create a `user_offline` event.
    #[must_use]
    pub fn user_offline(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        ServerEvent::UserOffline(PresenceChange {
            user_id: user_id.into(),
            username: username.into(),
        })
    }

    /// Create a `user_typing` event.
    #[must_use]
    pub fn user_typing(
        user_id: impl Into<String>,
        username: impl Into<String>,
        is_typing: bool,
    ) -> Self {
        ServerEvent::UserTyping(UserTyping {
            user_id: user_id.into(),
            username: username.into(),
            is_typing,
        })
    }

    /// Create a `message_sent` acknowledgment.
    #[must_use]
    pub fn message_sent(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        ServerEvent::MessageSent(MessageSent {
            id: id.into(),
            timestamp,
        })
    }

    /// Create an `error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorEvent {
            message: message.into(),
        })
    }
}
