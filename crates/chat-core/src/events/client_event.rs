//! Client events - high-level events delivered to listeners
//!
//! Dispatch handlers turn gateway envelopes into these events after updating the
//! entity cache. Listeners subscribe per [`EventCategory`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::MessageReceiver;

/// Category used to route events to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Ready, resumed, disconnect and reconnect outcomes
    Connection,
    Channel,
    Message,
    Typing,
    /// Servers joined, updated or left
    Server,
    Member,
    Ban,
    Role,
    Presence,
    Voice,
    /// Handler failures and other non-fatal problems
    Diagnostic,
}

impl EventCategory {
    /// Every category, for listeners that want the whole stream
    pub const ALL: [Self; 11] = [
        Self::Connection,
        Self::Channel,
        Self::Message,
        Self::Typing,
        Self::Server,
        Self::Member,
        Self::Ban,
        Self::Role,
        Self::Presence,
        Self::Voice,
        Self::Diagnostic,
    ];
}

/// All events delivered to listeners
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientEvent {
    // =========================================================================
    // Connection Events
    // =========================================================================
    Ready(ReadyEvent),
    Resumed(ReadyEvent),
    Disconnected(DisconnectedEvent),
    ReconnectFailed(ReconnectFailedEvent),

    // =========================================================================
    // Channel Events
    // =========================================================================
    ChannelCreated(ChannelEvent),
    ChannelUpdated(ChannelEvent),
    ChannelDeleted(ChannelEvent),

    // =========================================================================
    // Message Events
    // =========================================================================
    MessageCreated(MessageCreatedEvent),
    MessageUpdated(MessageUpdatedEvent),
    MessageDeleted(MessageDeletedEvent),
    TypingStarted(TypingStartedEvent),

    // =========================================================================
    // Server Events
    // =========================================================================
    ServerJoined(GuildEvent),
    ServerUpdated(GuildEvent),
    ServerLeft(GuildEvent),
    MemberJoined(MemberEvent),
    MemberUpdated(MemberEvent),
    MemberLeft(MemberEvent),
    UserBanned(BanEvent),
    UserUnbanned(BanEvent),
    RoleCreated(RoleEvent),
    RoleUpdated(RoleEvent),
    RoleDeleted(RoleEvent),

    // =========================================================================
    // Presence and Voice Events
    // =========================================================================
    PresenceUpdated(PresenceEvent),
    VoiceConnected(VoiceConnectedEvent),

    // =========================================================================
    // Diagnostics
    // =========================================================================
    HandlerFailed(HandlerFailedEvent),
}

impl ClientEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Ready(_) => "READY",
            Self::Resumed(_) => "RESUMED",
            Self::Disconnected(_) => "DISCONNECTED",
            Self::ReconnectFailed(_) => "RECONNECT_FAILED",
            Self::ChannelCreated(_) => "CHANNEL_CREATED",
            Self::ChannelUpdated(_) => "CHANNEL_UPDATED",
            Self::ChannelDeleted(_) => "CHANNEL_DELETED",
            Self::MessageCreated(_) => "MESSAGE_CREATED",
            Self::MessageUpdated(_) => "MESSAGE_UPDATED",
            Self::MessageDeleted(_) => "MESSAGE_DELETED",
            Self::TypingStarted(_) => "TYPING_STARTED",
            Self::ServerJoined(_) => "SERVER_JOINED",
            Self::ServerUpdated(_) => "SERVER_UPDATED",
            Self::ServerLeft(_) => "SERVER_LEFT",
            Self::MemberJoined(_) => "MEMBER_JOINED",
            Self::MemberUpdated(_) => "MEMBER_UPDATED",
            Self::MemberLeft(_) => "MEMBER_LEFT",
            Self::UserBanned(_) => "USER_BANNED",
            Self::UserUnbanned(_) => "USER_UNBANNED",
            Self::RoleCreated(_) => "ROLE_CREATED",
            Self::RoleUpdated(_) => "ROLE_UPDATED",
            Self::RoleDeleted(_) => "ROLE_DELETED",
            Self::PresenceUpdated(_) => "PRESENCE_UPDATED",
            Self::VoiceConnected(_) => "VOICE_CONNECTED",
            Self::HandlerFailed(_) => "HANDLER_FAILED",
        }
    }

    /// Get the category subscribers register for
    pub fn category(&self) -> EventCategory {
        match self {
            Self::Ready(_) | Self::Resumed(_) | Self::Disconnected(_) | Self::ReconnectFailed(_) => {
                EventCategory::Connection
            }
            Self::ChannelCreated(_) | Self::ChannelUpdated(_) | Self::ChannelDeleted(_) => {
                EventCategory::Channel
            }
            Self::MessageCreated(_) | Self::MessageUpdated(_) | Self::MessageDeleted(_) => {
                EventCategory::Message
            }
            Self::TypingStarted(_) => EventCategory::Typing,
            Self::ServerJoined(_) | Self::ServerUpdated(_) | Self::ServerLeft(_) => {
                EventCategory::Server
            }
            Self::MemberJoined(_) | Self::MemberUpdated(_) | Self::MemberLeft(_) => {
                EventCategory::Member
            }
            Self::UserBanned(_) | Self::UserUnbanned(_) => EventCategory::Ban,
            Self::RoleCreated(_) | Self::RoleUpdated(_) | Self::RoleDeleted(_) => {
                EventCategory::Role
            }
            Self::PresenceUpdated(_) => EventCategory::Presence,
            Self::VoiceConnected(_) => EventCategory::Voice,
            Self::HandlerFailed(_) => EventCategory::Diagnostic,
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Ready(e) | Self::Resumed(e) => e.timestamp,
            Self::Disconnected(e) => e.timestamp,
            Self::ReconnectFailed(e) => e.timestamp,
            Self::ChannelCreated(e) | Self::ChannelUpdated(e) | Self::ChannelDeleted(e) => {
                e.timestamp
            }
            Self::MessageCreated(e) => e.timestamp,
            Self::MessageUpdated(e) => e.timestamp,
            Self::MessageDeleted(e) => e.timestamp,
            Self::TypingStarted(e) => e.timestamp,
            Self::ServerJoined(e) | Self::ServerUpdated(e) | Self::ServerLeft(e) => e.timestamp,
            Self::MemberJoined(e) | Self::MemberUpdated(e) | Self::MemberLeft(e) => e.timestamp,
            Self::UserBanned(e) | Self::UserUnbanned(e) => e.timestamp,
            Self::RoleCreated(e) | Self::RoleUpdated(e) | Self::RoleDeleted(e) => e.timestamp,
            Self::PresenceUpdated(e) => e.timestamp,
            Self::VoiceConnected(e) => e.timestamp,
            Self::HandlerFailed(e) => e.timestamp,
        }
    }
}

// =============================================================================
// Connection Event Payloads
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyEvent {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub server_count: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectedEvent {
    /// Close code, absent when the socket dropped without a close frame
    pub code: Option<u16>,
    pub reason: String,
    pub remote: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectFailedEvent {
    pub url: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Channel and Message Event Payloads
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub private: bool,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCreatedEvent {
    pub message_id: String,
    pub channel_id: String,
    pub author_id: Option<String>,
    pub content: String,
    pub receiver: MessageReceiver,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageUpdatedEvent {
    pub message_id: String,
    pub channel_id: String,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDeletedEvent {
    pub message_id: String,
    pub channel_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingStartedEvent {
    pub channel_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Server Event Payloads
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildEvent {
    pub guild_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberEvent {
    pub guild_id: String,
    pub user_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanEvent {
    pub guild_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEvent {
    pub guild_id: String,
    pub role_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Presence, Voice and Diagnostic Event Payloads
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub guild_id: Option<String>,
    pub user_id: String,
    pub status: Option<String>,
    pub game: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConnectedEvent {
    pub guild_id: String,
    pub channel_id: String,
    pub endpoint: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerFailedEvent {
    /// Gateway event type whose handler failed
    pub event_type: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}
