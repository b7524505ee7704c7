//! Message relay.
//!
//! Every accepted message is stored first. If the receiver is reachable it
//! gets the message and its notification live; otherwise only the
//! notification is stored and the receiver sees it later through the
//! notification list. The sender is acknowledged in both cases.
//!
//! The message write and the notification write are independent. A failure
//! in either ends the event with a generic error to the sender and nothing
//! already written is undone.

use crate::model::{MessageDraft, NotificationDraft};
use crate::registry::{ConnectionRegistry, Session};
use crate::store::{Store, StoreError};
use parley_protocol::{SendMessage, ServerEvent};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Default maximum message length in characters.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 10_000;

/// Error text sent to the sender when persistence fails.
pub const SEND_FAILED: &str = "Failed to send message";

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Content is empty or whitespace only.
    #[error("Message content cannot be empty")]
    EmptyContent,

    /// No receiver was named.
    #[error("Receiver is required")]
    MissingReceiver,

    /// Content is longer than allowed.
    #[error("Message content exceeds {max} characters")]
    ContentTooLong { len: usize, max: usize },

    /// A store write failed.
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

impl RelayError {
    /// Check if the request was rejected before touching the store.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(self, RelayError::Persistence(_))
    }

    /// Text of the `error` event sent to the sender.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RelayError::Persistence(_) => SEND_FAILED.to_string(),
            other => other.to_string(),
        }
    }
}

/// How a `send_message` event ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Receiver was online and got the message live.
    Delivered,
    /// Receiver was offline; a notification was stored.
    Stored,
    /// Request failed validation.
    Rejected,
    /// A store write failed.
    Failed,
}

impl RelayOutcome {
    /// Short label for metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayOutcome::Delivered => "delivered",
            RelayOutcome::Stored => "stored",
            RelayOutcome::Rejected => "rejected",
            RelayOutcome::Failed => "failed",
        }
    }
}

/// Relays chat messages between users.
pub struct MessageRelay {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn Store>,
    max_content_length: usize,
}

impl MessageRelay {
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn Store>) -> Self {
        Self {
            registry,
            store,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
        }
    }

    /// Limit message length in characters.
    #[must_use]
    pub fn with_max_content_length(mut self, max: usize) -> Self {
        self.max_content_length = max;
        self
    }

    /// Handle a `send_message` event, reporting failures to the sender.
    pub async fn send(&self, sender: &Session, request: SendMessage) -> RelayOutcome {
        match self.relay(sender, request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(user = %sender.user_id, error = %e, "send_message failed");
                sender.handle.send(ServerEvent::error(e.client_message()));
                if e.is_validation() {
                    RelayOutcome::Rejected
                } else {
                    RelayOutcome::Failed
                }
            }
        }
    }

    /// Store, deliver and acknowledge one message.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any write, or the first failed
    /// store write. Events already queued are not recalled.
    pub async fn relay(
        &self,
        sender: &Session,
        request: SendMessage,
    ) -> Result<RelayOutcome, RelayError> {
        self.validate(&request)?;

        let message = self
            .store
            .create_message(MessageDraft {
                sender_id: sender.user_id.clone(),
                receiver_id: request.receiver_id,
                content: request.content,
                message_type: request.message_type,
            })
            .await?;

        let receiver = self.registry.lookup(&message.receiver_id);
        if let Some(handle) = &receiver {
            handle.send(message.to_receive_event(&sender.username));
        }

        let notification = self
            .store
            .create_notification(NotificationDraft::for_message(&message, &sender.username))
            .await?;

        let outcome = match &receiver {
            Some(handle) => {
                handle.send(notification.to_event());
                RelayOutcome::Delivered
            }
            None => RelayOutcome::Stored,
        };

        sender
            .handle
            .send(ServerEvent::message_sent(&message.id, message.created_at));

        debug!(
            from = %message.sender_id,
            to = %message.receiver_id,
            message = %message.id,
            outcome = outcome.as_str(),
            "Message relayed"
        );

        Ok(outcome)
    }

    fn validate(&self, request: &SendMessage) -> Result<(), RelayError> {
        if request.receiver_id.trim().is_empty() {
            return Err(RelayError::MissingReceiver);
        }
        if request.content.trim().is_empty() {
            return Err(RelayError::EmptyContent);
        }
        let len = request.content.chars().count();
        if len > self.max_content_length {
            return Err(RelayError::ContentTooLong {
                len,
                max: self.max_content_length,
            });
        }
        Ok(())
    }
}
