//! Presence propagation for Parley.
//!
//! When a user connects or disconnects, the durable presence record is
//! updated and every other registered session is told. The two steps are not
//! transactional: a failed write is logged and the broadcast still happens.

use crate::model::PresenceRecord;
use crate::registry::{ConnectionRegistry, Session};
use crate::store::Store;
use chrono::Utc;
use parley_protocol::ServerEvent;
use std::sync::Arc;
use tracing::{debug, warn};

/// Announces presence changes to connected peers.
pub struct PresenceBroadcaster {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn Store>,
}

impl PresenceBroadcaster {
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn Store>) -> Self {
        Self { registry, store }
    }

    /// Mark the session's user online and tell every other session.
    ///
    /// Returns the number of peers the event was queued for.
    pub async fn announce_online(&self, session: &Session) -> usize {
        self.persist(session, PresenceRecord::online(Utc::now()))
            .await;
        let count = self.broadcast(
            session,
            ServerEvent::user_online(&session.user_id, &session.username),
        );
        debug!(user = %session.user_id, peers = count, "Announced online");
        count
    }

    /// Mark the session's user offline and tell every other session.
    ///
    /// Returns the number of peers the event was queued for.
    pub async fn announce_offline(&self, session: &Session) -> usize {
        self.persist(session, PresenceRecord::offline(Utc::now()))
            .await;
        let count = self.broadcast(
            session,
            ServerEvent::user_offline(&session.user_id, &session.username),
        );
        debug!(user = %session.user_id, peers = count, "Announced offline");
        count
    }

    async fn persist(&self, session: &Session, record: PresenceRecord) {
        if let Err(e) = self
            .store
            .update_presence(&session.identity(), record)
            .await
        {
            warn!(
                user = %session.user_id,
                online = record.is_online,
                error = %e,
                "Presence write failed"
            );
        }
    }

    fn broadcast(&self, origin: &Session, event: ServerEvent) -> usize {
        let event = Arc::new(event);
        self.registry
            .peers(&origin.user_id)
            .iter()
            .filter(|peer| peer.send_shared(Arc::clone(&event)))
            .count()
    }
}
