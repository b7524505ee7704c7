//! Test doubles shared by unit tests.

use crate::memory::MemoryStore;
use crate::model::{
    Identity, Message, MessageDraft, Notification, NotificationDraft, PresenceRecord, User,
};
use crate::store::{MessageStore, NotificationStore, StoreError, UserStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// A [`MemoryStore`] whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_messages: AtomicBool,
    pub fail_notifications: AtomicBool,
    pub fail_presence: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn create_message(&self, draft: MessageDraft) -> Result<Message, StoreError> {
        Self::check(&self.fail_messages)?;
        self.inner.create_message(draft).await
    }

    async fn find_message(&self, id: &str) -> Result<Option<Message>, StoreError> {
        self.inner.find_message(id).await
    }

    async fn conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<Message>, StoreError> {
        self.inner.conversation(user_a, user_b).await
    }
}

#[async_trait]
impl NotificationStore for FlakyStore {
    async fn create_notification(
        &self,
        draft: NotificationDraft,
    ) -> Result<Notification, StoreError> {
        Self::check(&self.fail_notifications)?;
        self.inner.create_notification(draft).await
    }

    async fn notifications_for(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError> {
        self.inner.notifications_for(user_id, limit).await
    }

    async fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<bool, StoreError> {
        self.inner.mark_notification_read(id, user_id).await
    }
}

#[async_trait]
impl UserStore for FlakyStore {
    async fn update_presence(
        &self,
        user: &Identity,
        presence: PresenceRecord,
    ) -> Result<(), StoreError> {
        Self::check(&self.fail_presence)?;
        self.inner.update_presence(user, presence).await
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user(id).await
    }

    async fn users_except(&self, id: &str) -> Result<Vec<User>, StoreError> {
        self.inner.users_except(id).await
    }
}
