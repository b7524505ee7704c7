//! Rooms for Parley.
//!
//! A room is a named broadcast group. Every connection joins its user's
//! private room (`user:<id>`) so that signals addressed to a user reach all
//! of that user's live connections, not only the one in the registry.

use crate::registry::{SessionHandle, SessionId};
use dashmap::DashMap;
use parley_protocol::ServerEvent;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Maximum room name length.
pub const MAX_ROOM_NAME_LENGTH: usize = 256;

/// Default broadcast capacity per room.
pub const DEFAULT_ROOM_CAPACITY: usize = 256;

/// A room identifier.
pub type RoomId = String;

/// Room errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    /// Invalid room name.
    #[error("Invalid room name: {0}")]
    InvalidName(&'static str),
}

/// Name of a user's private room.
#[must_use]
pub fn private_room(user_id: &str) -> RoomId {
    format!("user:{}", user_id)
}

/// Validate a room name.
///
/// # Errors
///
/// Returns an error message if the room name is invalid.
pub fn validate_room_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Room name cannot be empty");
    }
    if name.len() > MAX_ROOM_NAME_LENGTH {
        return Err("Room name too long");
    }
    if name.chars().any(char::is_control) {
        return Err("Room name contains control characters");
    }
    Ok(())
}

/// An event published into a room.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    /// Session that published the event; it is not delivered back to it.
    pub source: Option<SessionId>,
    pub event: Arc<ServerEvent>,
}

impl RoomEvent {
    #[must_use]
    pub fn new(event: ServerEvent) -> Self {
        Self {
            source: None,
            event: Arc::new(event),
        }
    }

    #[must_use]
    pub fn from_session(mut self, source: SessionId) -> Self {
        self.source = Some(source);
        self
    }
}

struct Room {
    sender: broadcast::Sender<Arc<RoomEvent>>,
    members: HashSet<SessionId>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            members: HashSet::new(),
        }
    }
}

/// Room membership and fan-out.
pub struct RoomRouter {
    rooms: DashMap<RoomId, Room>,
    capacity: usize,
}

impl RoomRouter {
    /// Create a router with the default room capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ROOM_CAPACITY)
    }

    /// Create a router whose rooms buffer up to `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Join a room, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the room name is invalid.
    pub fn join(
        &self,
        room: &str,
        session_id: SessionId,
    ) -> Result<broadcast::Receiver<Arc<RoomEvent>>, RoomError> {
        validate_room_name(room).map_err(RoomError::InvalidName)?;

        let mut entry = self.rooms.entry(room.to_string()).or_insert_with(|| {
            debug!(room = %room, "Creating room");
            Room::new(self.capacity)
        });
        entry.members.insert(session_id);

        debug!(
            room = %room,
            session = session_id,
            members = entry.members.len(),
            "Joined room"
        );

        Ok(entry.sender.subscribe())
    }

    /// Leave a room. Empty rooms are deleted.
    ///
    /// Returns `true` if the session was a member.
    pub fn leave(&self, room: &str, session_id: SessionId) -> bool {
        let Some(mut entry) = self.rooms.get_mut(room) else {
            return false;
        };

        let removed = entry.members.remove(&session_id);
        let now_empty = entry.members.is_empty();
        drop(entry);

        if now_empty {
            self.rooms.remove_if(room, |_, r| r.members.is_empty());
            debug!(room = %room, "Deleted empty room");
        }

        removed
    }

    /// Publish an event to a room.
    ///
    /// Returns the number of receivers, 0 if the room does not exist.
    pub fn publish(&self, room: &str, event: RoomEvent) -> usize {
        match self.rooms.get(room) {
            Some(entry) => {
                let count = entry.sender.send(Arc::new(event)).unwrap_or_default();
                trace!(room = %room, recipients = count, "Published to room");
                count
            }
            None => {
                trace!(room = %room, "No listeners, event dropped");
                0
            }
        }
    }

    /// Check if a room exists.
    #[must_use]
    pub fn room_exists(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Number of sessions in a room.
    #[must_use]
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|r| r.members.len()).unwrap_or(0)
    }

    /// Number of rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward room events into a session's outbound queue.
///
/// Events published by the session itself are skipped. The task ends when the
/// room is dropped or the session's queue is closed.
pub fn forward_to_session(
    mut rx: broadcast::Receiver<Arc<RoomEvent>>,
    handle: SessionHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let own = handle.session_id();
        loop {
            match rx.recv().await {
                Ok(room_event) => {
                    if room_event.source == Some(own) {
                        continue;
                    }
                    if !handle.send_shared(Arc::clone(&room_event.event)) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(session = own, skipped, "Room receiver lagged");
                    continue;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_private_room_name() {
        assert_eq!(private_room("u1"), "user:u1");
        assert!(validate_room_name(&private_room("u1")).is_ok());
    }

    #[test]
    fn test_room_name_validation() {
        assert!(validate_room_name("").is_err());
        assert!(validate_room_name("user:\n").is_err());

        let long_name = "a".repeat(MAX_ROOM_NAME_LENGTH + 1);
        assert!(validate_room_name(&long_name).is_err());

        let router = RoomRouter::new();
        assert_eq!(
            router.join("", 1).unwrap_err(),
            RoomError::InvalidName("Room name cannot be empty")
        );
    }

    #[test]
    fn test_join_leave_deletes_empty_room() {
        let router = RoomRouter::new();

        let _rx1 = router.join("user:u1", 1).unwrap();
        let _rx2 = router.join("user:u1", 2).unwrap();
        assert_eq!(router.member_count("user:u1"), 2);

        assert!(router.leave("user:u1", 1));
        assert!(router.room_exists("user:u1"));
        assert!(!router.leave("user:u1", 1));

        assert!(router.leave("user:u1", 2));
        assert!(!router.room_exists("user:u1"));
        assert_eq!(router.room_count(), 0);
    }

    #[test]
    fn test_publish_to_missing_room() {
        let router = RoomRouter::new();
        assert_eq!(
            router.publish("user:nobody", RoomEvent::new(ServerEvent::error("x"))),
            0
        );
    }

    #[test]
    fn test_publish_reaches_members() {
        let router = RoomRouter::new();
        let mut rx1 = router.join("user:u2", 1).unwrap();
        let mut rx2 = router.join("user:u2", 2).unwrap();

        let count = router.publish(
            "user:u2",
            RoomEvent::new(ServerEvent::user_typing("u1", "alice", true)),
        );
        assert_eq!(count, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_forwarder_skips_own_events() {
        let router = RoomRouter::new();
        let (handle, mut outbound) = SessionHandle::channel(7);
        let rx = router.join("user:u1", 7).unwrap();
        let task = forward_to_session(rx, handle);

        router.publish(
            "user:u1",
            RoomEvent::new(ServerEvent::error("own")).from_session(7),
        );
        router.publish("user:u1", RoomEvent::new(ServerEvent::error("other")));

        let event = tokio::time::timeout(Duration::from_secs(1), outbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*event, ServerEvent::error("other"));

        task.abort();
    }
}
