//! Presence status snapshot

use serde::{Deserialize, Serialize};

/// The client's own presence: current activity and idle flag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Name of the game or activity being shown, if any
    pub activity: Option<String>,
    /// Whether the client reports itself as idle
    pub idle: bool,
}

impl StatusSnapshot {
    /// Create a status snapshot
    #[must_use]
    pub fn new(activity: Option<String>, idle: bool) -> Self {
        Self { activity, idle }
    }
}
