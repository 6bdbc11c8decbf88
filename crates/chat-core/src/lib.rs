//! # chat-core
//!
//! Domain layer for the gateway client: the events delivered to listeners, the
//! entity cache seam that dispatch handlers mutate, and the small value types the
//! session engine passes around. This crate has no network dependencies.

pub mod cache;
pub mod entities;
pub mod events;
pub mod traits;

// Re-export commonly used types at crate root
pub use cache::{member_key, EntityCache, EntityKind, InMemoryEntityCache};
pub use entities::{MessageReceiver, StatusSnapshot, VoiceChannel};
pub use events::{
    BanEvent, ChannelEvent, ClientEvent, DisconnectedEvent, EventCategory, GuildEvent,
    HandlerFailedEvent, MemberEvent, MessageCreatedEvent, MessageDeletedEvent,
    MessageUpdatedEvent, PresenceEvent, ReadyEvent, ReconnectFailedEvent, RoleEvent,
    TypingStartedEvent, VoiceConnectedEvent,
};
pub use traits::{StaticTokenProvider, TokenError, TokenProvider};
