//! Voice channel target

use serde::{Deserialize, Serialize};

/// A voice channel the client can join
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceChannel {
    /// Channel id
    pub id: String,
    /// Id of the server owning the channel
    pub guild_id: String,
}

impl VoiceChannel {
    /// Create a voice channel target
    #[must_use]
    pub fn new(id: impl Into<String>, guild_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            guild_id: guild_id.into(),
        }
    }
}
