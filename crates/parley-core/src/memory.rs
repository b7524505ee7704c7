//! In-memory store.
//!
//! Backs a single process. Contents are lost on restart.

use crate::model::{
    Identity, Message, MessageDraft, Notification, NotificationDraft, PresenceRecord, User,
};
use crate::store::{MessageStore, NotificationStore, StoreError, UserStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

/// A store that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: RwLock<Vec<Message>>,
    notifications: RwLock<Vec<Notification>>,
    users: DashMap<String, User>,
    clock: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation time for the next record. Never goes backwards.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.clock.lock();
        let now = Utc::now();
        let ts = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        *last = Some(ts);
        ts
    }

    /// Number of stored messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.read().len()
    }

    /// Number of stored notifications.
    #[must_use]
    pub fn notification_count(&self) -> usize {
        self.notifications.read().len()
    }

    /// Snapshot of every stored notification, oldest first.
    #[must_use]
    pub fn all_notifications(&self) -> Vec<Notification> {
        self.notifications.read().clone()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(&self, draft: MessageDraft) -> Result<Message, StoreError> {
        let mut messages = self.messages.write();
        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender_id: draft.sender_id,
            receiver_id: draft.receiver_id,
            content: draft.content,
            message_type: draft.message_type,
            is_read: false,
            created_at: self.next_timestamp(),
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn find_message(&self, id: &str) -> Result<Option<Message>, StoreError> {
        Ok(self.messages.read().iter().find(|m| m.id == id).cloned())
    }

    async fn conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.read();
        Ok(messages
            .iter()
            .filter(|m| {
                (m.sender_id == user_a && m.receiver_id == user_b)
                    || (m.sender_id == user_b && m.receiver_id == user_a)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create_notification(
        &self,
        draft: NotificationDraft,
    ) -> Result<Notification, StoreError> {
        let mut notifications = self.notifications.write();
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: draft.user_id,
            kind: draft.kind,
            title: draft.title,
            content: draft.content,
            data: draft.data,
            is_read: false,
            created_at: self.next_timestamp(),
        };
        notifications.push(notification.clone());
        Ok(notification)
    }

    async fn notifications_for(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError> {
        let notifications = self.notifications.read();
        Ok(notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<bool, StoreError> {
        let mut notifications = self.notifications.write();
        match notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        {
            Some(notification) => {
                notification.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn update_presence(
        &self,
        user: &Identity,
        presence: PresenceRecord,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .users
            .entry(user.user_id.clone())
            .or_insert_with(|| User {
                id: user.user_id.clone(),
                username: user.username.clone(),
                is_online: false,
                last_seen: presence.last_seen,
            });
        entry.is_online = presence.is_online;
        entry.last_seen = presence.last_seen;
        Ok(())
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn users_except(&self, id: &str) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.key() != id)
            .map(|u| u.clone())
            .collect();
        users.sort_by(|a, b| {
            b.is_online
                .cmp(&a.is_online)
                .then_with(|| a.username.cmp(&b.username))
        });
        Ok(users)
    }
}
