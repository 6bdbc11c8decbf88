//! Payload definitions
//!
//! Outbound payloads are fully typed. Inbound payloads only name the fields the
//! session engine itself reads; everything else stays as raw JSON for handlers.

use chat_core::{StatusSnapshot, VoiceChannel};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway protocol version sent in identify
pub const GATEWAY_VERSION: u8 = 3;

// =============================================================================
// Outbound
// =============================================================================

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub v: u8,
    pub properties: IdentifyProperties,
    pub large_threshold: u32,
    pub compress: bool,
}

impl IdentifyPayload {
    #[must_use]
    pub fn new(token: impl Into<String>, large_threshold: u32, compress: bool) -> Self {
        Self {
            token: token.into(),
            v: GATEWAY_VERSION,
            properties: IdentifyProperties::default(),
            large_threshold,
            compress,
        }
    }
}

/// Client connection properties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyProperties {
    #[serde(rename = "$os")]
    pub os: String,
    #[serde(rename = "$browser")]
    pub browser: String,
    #[serde(rename = "$device")]
    pub device: String,
    #[serde(rename = "$referrer")]
    pub referrer: String,
    #[serde(rename = "$referring_domain")]
    pub referring_domain: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "None".to_string(),
            device: String::new(),
            referrer: "https://discordapp.com/@me".to_string(),
            referring_domain: "discordapp.com".to_string(),
        }
    }
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    pub seq: Option<u64>,
}

/// Payload for op 3 (Status Update)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdatePayload {
    pub game: GamePayload,
    pub idle_since: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamePayload {
    pub name: Option<String>,
}

impl From<&StatusSnapshot> for StatusUpdatePayload {
    fn from(status: &StatusSnapshot) -> Self {
        Self {
            game: GamePayload {
                name: status.activity.clone(),
            },
            idle_since: status.idle.then_some(1),
        }
    }
}

/// Payload for op 4 (Voice State Update)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStatePayload {
    pub guild_id: String,
    pub channel_id: String,
    pub self_mute: bool,
    pub self_deaf: bool,
}

impl From<&VoiceChannel> for VoiceStatePayload {
    fn from(channel: &VoiceChannel) -> Self {
        Self {
            guild_id: channel.guild_id.clone(),
            channel_id: channel.id.clone(),
            self_mute: false,
            self_deaf: false,
        }
    }
}

/// Payload for op 0 on the voice transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceIdentifyPayload {
    pub server_id: String,
    pub user_id: String,
    pub session_id: String,
    pub token: String,
}

// =============================================================================
// Inbound
// =============================================================================

/// Payload for op 10 (Hello)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HelloPayload {
    #[serde(default)]
    pub heartbeat_interval: Option<u64>,
}

/// Payload for op 7 (Reconnect)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconnectPayload {
    #[serde(default)]
    pub url: Option<String>,
}

/// `READY` dispatch payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReadyPayload {
    pub heartbeat_interval: Option<u64>,
    pub session_id: Option<String>,
    pub user: Option<Value>,
    pub guilds: Vec<Value>,
    pub private_channels: Vec<Value>,
}

impl ReadyPayload {
    /// Id of the connected user
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref()?.get("id")?.as_str()
    }
}
