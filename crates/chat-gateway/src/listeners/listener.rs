//! Subscriber trait and registration handle

use chat_core::ClientEvent;
use uuid::Uuid;

/// Receives client events for the categories it was subscribed to
///
/// Calls happen on the bus worker thread, one event at a time, in the order the
/// events were posted. A slow listener delays later events but never the socket.
pub trait Listener: Send + Sync {
    fn on_event(&self, event: &ClientEvent);

    /// Name used in logs
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl<F> Listener for F
where
    F: Fn(&ClientEvent) + Send + Sync,
{
    fn on_event(&self, event: &ClientEvent) {
        self(event);
    }
}

/// Registration handle for a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
