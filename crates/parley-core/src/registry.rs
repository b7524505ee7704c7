//! Directory of reachable users.
//!
//! The registry maps a user ID to the session currently used to reach that
//! user. Registering a second session for the same user replaces the first
//! one without closing it (last connect wins).

use crate::model::Identity;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parley_protocol::ServerEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// A process-unique session identifier.
pub type SessionId = u64;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocate a new session ID.
#[must_use]
pub fn next_session_id() -> SessionId {
    SESSION_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Receiving half of a session's outbound queue.
pub type Outbound = mpsc::UnboundedReceiver<Arc<ServerEvent>>;

/// Sending half of a session's outbound queue.
///
/// Only the connection's writer task drains the queue, so events queued from
/// different handlers never interleave on the transport.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    outbound: mpsc::UnboundedSender<Arc<ServerEvent>>,
}

impl SessionHandle {
    /// Create a handle and the matching receiver.
    #[must_use]
    pub fn channel(session_id: SessionId) -> (Self, Outbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                session_id,
                outbound: tx,
            },
            rx,
        )
    }

    /// Session this handle belongs to.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Queue an event. Returns `false` if the connection is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.send_shared(Arc::new(event))
    }

    /// Queue a shared event (used for fan-out).
    pub fn send_shared(&self, event: Arc<ServerEvent>) -> bool {
        self.outbound.send(event).is_ok()
    }

    /// Check if the receiving side has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// A live, authenticated connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub username: String,
    pub handle: SessionHandle,
    pub connected_at: DateTime<Utc>,
}

impl Session {
    /// Open a session for an identity, returning its outbound receiver.
    #[must_use]
    pub fn open(identity: Identity) -> (Self, Outbound) {
        let id = next_session_id();
        let (handle, outbound) = SessionHandle::channel(id);
        let session = Self {
            id,
            user_id: identity.user_id,
            username: identity.username,
            handle,
            connected_at: Utc::now(),
        };
        (session, outbound)
    }

    /// Identity of the session's user.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(self.user_id.clone(), self.username.clone())
    }
}

/// The connection registry.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<String, Session>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing any existing entry for the same user.
    ///
    /// Returns the replaced session. It is not closed.
    pub fn register(&self, session: Session) -> Option<Session> {
        let user_id = session.user_id.clone();
        let session_id = session.id;
        let previous = self.sessions.insert(user_id.clone(), session);

        match &previous {
            Some(old) => debug!(
                user = %user_id,
                session = session_id,
                replaced = old.id,
                "Session replaced"
            ),
            None => debug!(user = %user_id, session = session_id, "Session registered"),
        }

        previous
    }

    /// Look up the handle currently reaching a user.
    #[must_use]
    pub fn lookup(&self, user_id: &str) -> Option<SessionHandle> {
        self.sessions.get(user_id).map(|s| s.handle.clone())
    }

    /// Get the session currently registered for a user.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<Session> {
        self.sessions.get(user_id).map(|s| s.clone())
    }

    /// Remove a user's entry. No-op if absent.
    pub fn remove(&self, user_id: &str) -> Option<Session> {
        let removed = self.sessions.remove(user_id).map(|(_, s)| s);
        if removed.is_some() {
            debug!(user = %user_id, "Session removed");
        }
        removed
    }

    /// Remove a user's entry only if it still belongs to `session_id`.
    ///
    /// Returns `true` if the entry was removed.
    pub fn remove_session(&self, user_id: &str, session_id: SessionId) -> bool {
        let removed = self
            .sessions
            .remove_if(user_id, |_, s| s.id == session_id)
            .is_some();
        if removed {
            debug!(user = %user_id, session = session_id, "Session removed");
        }
        removed
    }

    /// Handles of every registered user except `user_id`.
    #[must_use]
    pub fn peers(&self, user_id: &str) -> Vec<SessionHandle> {
        self.sessions
            .iter()
            .filter(|entry| entry.key() != user_id)
            .map(|entry| entry.handle.clone())
            .collect()
    }

    /// Check if a user is reachable.
    #[must_use]
    pub fn is_online(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    /// IDs of all reachable users.
    #[must_use]
    pub fn online_user_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of reachable users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if nobody is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
