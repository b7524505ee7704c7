//! # parley-core
//!
//! Presence tracking and message relay for the Parley server.
//!
//! This crate provides the building blocks behind every connection:
//!
//! - **AuthGate** - Verify the credential presented at connect time
//! - **ConnectionRegistry** - Which session currently reaches each user
//! - **RoomRouter** - Private per-user rooms for ephemeral signals
//! - **PresenceBroadcaster** - Persist and fan out online/offline changes
//! - **MessageRelay** - Store, deliver or notify, then acknowledge
//! - **TypingSignal** - Forward typing indicators
//! - **Hub** - Wires the above together for connection handlers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────────┐
//! │  Connection │────▶│     Hub     │────▶│ MessageRelay     │──┐
//! └─────────────┘     └─────────────┘     │ TypingSignal     │  │
//!        ▲                   │            │ PresenceBroadcast│  │
//!        │                   ▼            └──────────────────┘  │
//!        │            ┌─────────────┐     ┌─────────────┐       │
//!        └────────────│  Registry   │     │    Store    │◀──────┘
//!       outbound      │  + Rooms    │     └─────────────┘
//!                     └─────────────┘
//! ```

pub mod auth;
pub mod hub;
pub mod memory;
pub mod model;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod room;
pub mod store;
pub mod typing;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthError, AuthGate, Claims};
pub use hub::{DispatchOutcome, Hub, HubConfig, HubError, HubStats};
pub use memory::MemoryStore;
pub use model::{
    Identity, Message, MessageDraft, Notification, NotificationDraft, PresenceRecord, User,
};
pub use presence::PresenceBroadcaster;
pub use registry::{ConnectionRegistry, Outbound, Session, SessionHandle, SessionId};
pub use relay::{MessageRelay, RelayError, RelayOutcome};
pub use room::{RoomError, RoomEvent, RoomRouter};
pub use store::{MessageStore, NotificationStore, Store, StoreError, UserStore};
pub use typing::TypingSignal;
