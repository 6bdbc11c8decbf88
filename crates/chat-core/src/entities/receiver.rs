//! Message receiver
//!
//! A message is received either in a server channel or in a private channel with
//! one user. Resolution is done against the entity cache; an unknown channel id
//! stays a channel receiver rather than falling back to the message author.

use crate::cache::{EntityCache, EntityKind};
use serde::{Deserialize, Serialize};

/// Where a message was sent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum MessageReceiver {
    /// A server channel, by channel id
    Channel(String),
    /// A private conversation, by recipient user id
    User(String),
}

impl MessageReceiver {
    /// Resolve the receiver of a message sent in `channel_id`
    pub fn resolve(cache: &dyn EntityCache, channel_id: &str) -> Self {
        let recipient = cache
            .get(EntityKind::PrivateChannel, channel_id)
            .and_then(|channel| {
                channel
                    .get("recipient")
                    .and_then(|r| r.get("id"))
                    .and_then(serde_json::Value::as_str)
                    .map(String::from)
            });

        match recipient {
            Some(user_id) => Self::User(user_id),
            None => Self::Channel(channel_id.to_string()),
        }
    }

    /// Get the id of the channel or user
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Channel(id) | Self::User(id) => id,
        }
    }

    /// Check if this is a private conversation
    #[must_use]
    pub const fn is_private(&self) -> bool {
        matches!(self, Self::User(_))
    }
}
