//! Gateway session
//!
//! The top-level state machine. A supervisor task owns the connection loop:
//! it opens one physical connection at a time, runs its read loop, and asks the
//! [`crate::reconnect::ReconnectController`] what to do when it ends.

mod connection;
mod gateway;

pub use gateway::GatewaySession;

use serde::Serialize;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    /// Opening the transport
    Connecting,
    /// Transport open, identify (or resume) being sent
    Identifying,
    /// Waiting for `READY`
    AwaitingReady,
    Ready,
    /// Close requested or the stream was corrupt
    Closing,
}

impl SessionState {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::AwaitingReady => "awaiting_ready",
            Self::Ready => "ready",
            Self::Closing => "closing",
        }
    }

    /// Whether a physical connection is open or being opened
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Frame queued for the socket writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Send a close frame and stop writing
    Close { code: u16, reason: String },
}
