//! The relay hub.
//!
//! A single `Hub` is built at startup and shared by every connection
//! handler. It owns the registry, the rooms and the components that act on
//! them, and exposes the three entry points of a connection's life:
//! [`Hub::connect`], [`Hub::dispatch`] and [`Hub::disconnect`].

use crate::model::Identity;
use crate::presence::PresenceBroadcaster;
use crate::registry::{ConnectionRegistry, Outbound, Session, SessionId};
use crate::relay::{MessageRelay, RelayOutcome, DEFAULT_MAX_CONTENT_LENGTH};
use crate::room::{forward_to_session, private_room, RoomError, RoomRouter, DEFAULT_ROOM_CAPACITY};
use crate::store::Store;
use crate::typing::TypingSignal;
use dashmap::DashMap;
use parley_protocol::ClientEvent;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum message length in characters.
    pub max_content_length: usize,
    /// Broadcast buffer per room.
    pub room_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            room_capacity: DEFAULT_ROOM_CAPACITY,
        }
    }
}

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// The user's private room could not be joined.
    #[error(transparent)]
    Room(#[from] RoomError),
}

/// Result of dispatching one client event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A `send_message` event finished.
    Relay(RelayOutcome),
    /// A typing signal reached this many connections.
    Typing { recipients: usize },
}

/// Hub statistics.
#[derive(Debug, Clone)]
pub struct HubStats {
    /// Number of reachable users.
    pub online_users: usize,
    /// Number of open private rooms (one per user with a live connection).
    pub rooms: usize,
}

/// Shared context of all connections.
pub struct Hub {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomRouter>,
    store: Arc<dyn Store>,
    presence: PresenceBroadcaster,
    relay: MessageRelay,
    typing: TypingSignal,
    room_tasks: DashMap<SessionId, JoinHandle<()>>,
}

impl Hub {
    /// Create a hub with default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_config(store, HubConfig::default())
    }

    /// Create a hub with custom configuration.
    #[must_use]
    pub fn with_config(store: Arc<dyn Store>, config: HubConfig) -> Self {
        info!("Creating hub with config: {:?}", config);

        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomRouter::with_capacity(config.room_capacity));

        Self {
            presence: PresenceBroadcaster::new(Arc::clone(&registry), Arc::clone(&store)),
            relay: MessageRelay::new(Arc::clone(&registry), Arc::clone(&store))
                .with_max_content_length(config.max_content_length),
            typing: TypingSignal::new(Arc::clone(&rooms)),
            registry,
            rooms,
            store,
            room_tasks: DashMap::new(),
        }
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The room router.
    #[must_use]
    pub fn rooms(&self) -> &Arc<RoomRouter> {
        &self.rooms
    }

    /// The persistence collaborator.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            online_users: self.registry.len(),
            rooms: self.rooms.room_count(),
        }
    }

    /// Bring an authenticated identity online.
    ///
    /// Returns the session and the receiver its writer must drain.
    ///
    /// # Errors
    ///
    /// Returns an error if the user's private room cannot be joined. Nothing
    /// is registered in that case.
    pub async fn connect(&self, identity: Identity) -> Result<(Session, Outbound), HubError> {
        let (session, outbound) = Session::open(identity);

        let rx = self.rooms.join(&private_room(&session.user_id), session.id)?;
        let task = forward_to_session(rx, session.handle.clone());
        self.room_tasks.insert(session.id, task);

        self.registry.register(session.clone());
        self.presence.announce_online(&session).await;

        debug!(user = %session.user_id, session = session.id, "Connected");
        Ok((session, outbound))
    }

    /// Handle one client event to completion.
    pub async fn dispatch(&self, session: &Session, event: ClientEvent) -> DispatchOutcome {
        match event {
            ClientEvent::SendMessage(request) => {
                DispatchOutcome::Relay(self.relay.send(session, request).await)
            }
            ClientEvent::TypingStart(target) => DispatchOutcome::Typing {
                recipients: self.typing.forward(session, &target.receiver_id, true),
            },
            ClientEvent::TypingStop(target) => DispatchOutcome::Typing {
                recipients: self.typing.forward(session, &target.receiver_id, false),
            },
        }
    }

    /// Take a session offline.
    ///
    /// Presence is only announced if the session was still the registered
    /// one for its user; a replaced session leaves quietly. Returns `true` if
    /// `user_offline` was announced.
    pub async fn disconnect(&self, session: &Session) -> bool {
        if let Some((_, task)) = self.room_tasks.remove(&session.id) {
            task.abort();
        }
        self.rooms.leave(&private_room(&session.user_id), session.id);

        let was_current = self.registry.remove_session(&session.user_id, session.id);
        if was_current {
            self.presence.announce_offline(session).await;
        } else {
            debug!(
                user = %session.user_id,
                session = session.id,
                "Replaced session closed"
            );
        }

        debug!(user = %session.user_id, session = session.id, "Disconnected");
        was_current
    }
}
