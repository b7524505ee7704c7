//! Typing indicators.
//!
//! Forwards `user_typing` into the receiver's private room. Nothing is stored
//! and nothing expires: an indicator stays on until the sender stops it.

use crate::registry::Session;
use crate::room::{private_room, RoomEvent, RoomRouter};
use parley_protocol::ServerEvent;
use std::sync::Arc;
use tracing::trace;

/// Stateless typing forwarder.
pub struct TypingSignal {
    rooms: Arc<RoomRouter>,
}

impl TypingSignal {
    #[must_use]
    pub fn new(rooms: Arc<RoomRouter>) -> Self {
        Self { rooms }
    }

    /// Tell `receiver_id` whether `sender` is typing.
    ///
    /// Returns the number of connections reached; 0 when the receiver is
    /// offline, in which case the signal is dropped.
    pub fn forward(&self, sender: &Session, receiver_id: &str, is_typing: bool) -> usize {
        let event = RoomEvent::new(ServerEvent::user_typing(
            &sender.user_id,
            &sender.username,
            is_typing,
        ))
        .from_session(sender.id);

        let count = self.rooms.publish(&private_room(receiver_id), event);
        trace!(
            from = %sender.user_id,
            to = %receiver_id,
            is_typing,
            recipients = count,
            "Typing signal"
        );
        count
    }
}
