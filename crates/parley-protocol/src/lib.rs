//! # parley-protocol
//!
//! Wire protocol definitions for the Parley relay server.
//!
//! Clients and the server exchange named events. Each direction is a tagged
//! union, so unknown or malformed events are rejected at the decode boundary
//! rather than deep inside a handler.
//!
//! ## Client events
//!
//! - `send_message` - Relay a chat message to another user
//! - `typing_start` / `typing_stop` - Ephemeral typing indicator
//!
//! ## Server events
//!
//! - `receive_message` / `message_sent` - Delivery and acknowledgment
//! - `new_notification` - A notification was stored for the user
//! - `user_online` / `user_offline` / `user_typing` - Presence fan-out
//! - `error` - A client event was rejected
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, ClientEvent};
//!
//! let text = r#"{"event":"typing_start","data":{"receiverId":"u2"}}"#;
//! let event: ClientEvent = codec::decode_json(text).unwrap();
//!
//! let encoded = codec::encode(&event).unwrap();
//! let decoded: ClientEvent = codec::decode(&encoded).unwrap();
//! assert_eq!(event, decoded);
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, encode, Encoding, ProtocolError};
pub use events::{
    ClientEvent, ErrorEvent, MessageSent, MessageType, NewNotification, NotificationKind,
    PresenceChange, ReceiveMessage, SendMessage, ServerEvent, TypingTarget, UserTyping,
};
