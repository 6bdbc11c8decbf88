//! Entity cache seam
//!
//! Dispatch handlers keep a local view of servers, channels, members and messages
//! in sync with the gateway. The cache itself lives outside the session engine;
//! handlers only ever issue single-key operations against it.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of cached entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A server (guild)
    Server,
    /// A server text or voice channel
    Channel,
    /// A direct-message channel with a single recipient
    PrivateChannel,
    /// A server member, keyed by [`member_key`]
    Member,
    /// A message
    Message,
    /// A server role
    Role,
    /// A user
    User,
    /// A server ban, keyed by [`member_key`]
    Ban,
}

impl EntityKind {
    /// Get the name of this entity kind
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Channel => "channel",
            Self::PrivateChannel => "private_channel",
            Self::Member => "member",
            Self::Message => "message",
            Self::Role => "role",
            Self::User => "user",
            Self::Ban => "ban",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Build the cache key for an entity scoped to a server (members, bans)
#[must_use]
pub fn member_key(guild_id: &str, user_id: &str) -> String {
    format!("{guild_id}:{user_id}")
}

/// Concurrent keyed store for gateway entities
///
/// Implementations must allow concurrent single-key insert, remove and lookup.
/// The session engine never needs multi-key transactions.
pub trait EntityCache: Send + Sync {
    /// Insert or replace an entity, returning the previous value
    fn put(&self, kind: EntityKind, id: &str, value: Value) -> Option<Value>;

    /// Remove an entity, returning it if it was cached
    fn remove(&self, kind: EntityKind, id: &str) -> Option<Value>;

    /// Look up an entity
    fn get(&self, kind: EntityKind, id: &str) -> Option<Value>;

    /// Check whether an entity is cached
    fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.get(kind, id).is_some()
    }
}

/// In-memory [`EntityCache`] backed by `DashMap`
#[derive(Debug, Default)]
pub struct InMemoryEntityCache {
    entries: DashMap<(EntityKind, String), Value>,
}

impl InMemoryEntityCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of cached entities of one kind
    pub fn count(&self, kind: EntityKind) -> usize {
        self.entries.iter().filter(|e| e.key().0 == kind).count()
    }

    /// Total number of cached entities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EntityCache for InMemoryEntityCache {
    fn put(&self, kind: EntityKind, id: &str, value: Value) -> Option<Value> {
        self.entries.insert((kind, id.to_string()), value)
    }

    fn remove(&self, kind: EntityKind, id: &str) -> Option<Value> {
        self.entries
            .remove(&(kind, id.to_string()))
            .map(|(_, value)| value)
    }

    fn get(&self, kind: EntityKind, id: &str) -> Option<Value> {
        self.entries
            .get(&(kind, id.to_string()))
            .map(|entry| entry.value().clone())
    }
}
