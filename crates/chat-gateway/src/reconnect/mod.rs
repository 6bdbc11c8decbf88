//! Reconnect controller
//!
//! Classifies a connection loss and decides what the session does next. The
//! resume hint (op 7 URL) is consumed by the first decision after it was stored.

use parking_lot::Mutex;

/// Why a physical connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// The socket closed, with or without a close frame
    Closed {
        code: Option<u16>,
        reason: String,
        /// Initiated by the server or the network rather than by this client
        remote: bool,
    },
    /// A compressed frame failed to inflate; the client closed the socket
    CorruptStream(String),
}

impl Disconnect {
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Closed { remote: true, .. })
    }

    #[must_use]
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Closed { code, .. } => *code,
            Self::CorruptStream(_) => None,
        }
    }
}

/// What to do after a connection loss
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reconnect to the hinted URL and resume the session
    Resume { url: String },
    /// Open a fresh connection and identify again
    Fresh,
    /// Stay disconnected
    Terminal,
}

/// Decides between resume, fresh reconnect and terminal close
#[derive(Debug)]
pub struct ReconnectController {
    auto_reconnect: bool,
    resume_hint: Mutex<Option<String>>,
}

impl ReconnectController {
    #[must_use]
    pub fn new(auto_reconnect: bool) -> Self {
        Self {
            auto_reconnect,
            resume_hint: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    /// Remember the URL from an op 7 until the next close
    pub fn remember_hint(&self, url: impl Into<String>) {
        *self.resume_hint.lock() = Some(url.into());
    }

    /// Drop any stored hint (after a successful fresh identify)
    pub fn clear_hint(&self) {
        self.resume_hint.lock().take();
    }

    #[must_use]
    pub fn has_hint(&self) -> bool {
        self.resume_hint.lock().is_some()
    }

    /// Decide the next step for a connection loss, consuming the stored hint
    pub fn decide(&self, disconnect: &Disconnect) -> ReconnectDecision {
        let hint = self.resume_hint.lock().take();
        let decision = Self::classify(disconnect, hint, self.auto_reconnect);

        tracing::debug!(
            remote = disconnect.is_remote(),
            code = ?disconnect.code(),
            auto_reconnect = self.auto_reconnect,
            decision = ?decision,
            "Reconnect decision"
        );

        decision
    }

    fn classify(
        disconnect: &Disconnect,
        hint: Option<String>,
        auto_reconnect: bool,
    ) -> ReconnectDecision {
        match (disconnect, hint) {
            (Disconnect::Closed { remote: true, .. }, Some(url)) => ReconnectDecision::Resume { url },
            (Disconnect::Closed { remote: true, .. }, None) if auto_reconnect => {
                ReconnectDecision::Fresh
            }
            (Disconnect::CorruptStream(_), _) => ReconnectDecision::Fresh,
            _ => ReconnectDecision::Terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(remote: bool) -> Disconnect {
        Disconnect::Closed {
            code: Some(4000),
            reason: String::new(),
            remote,
        }
    }

    #[test]
    fn test_remote_with_hint_resumes() {
        let controller = ReconnectController::new(false);
        controller.remember_hint("wss://resume.example");

        assert_eq!(
            controller.decide(&closed(true)),
            ReconnectDecision::Resume {
                url: "wss://resume.example".to_string()
            }
        );
    }

    #[test]
    fn test_remote_without_hint_and_auto_reconnect_is_fresh() {
        let controller = ReconnectController::new(true);
        assert_eq!(controller.decide(&closed(true)), ReconnectDecision::Fresh);
    }

    #[test]
    fn test_local_close_is_terminal() {
        let controller = ReconnectController::new(true);
        controller.remember_hint("wss://resume.example");
        assert_eq!(controller.decide(&closed(false)), ReconnectDecision::Terminal);
    }

    #[test]
    fn test_no_auto_reconnect_without_hint_is_terminal() {
        let controller = ReconnectController::new(false);
        assert_eq!(controller.decide(&closed(true)), ReconnectDecision::Terminal);
    }

    #[test]
    fn test_hint_is_consumed_once() {
        let controller = ReconnectController::new(false);
        controller.remember_hint("wss://resume.example");

        assert!(matches!(
            controller.decide(&closed(true)),
            ReconnectDecision::Resume { .. }
        ));
        assert!(!controller.has_hint());
        assert_eq!(controller.decide(&closed(true)), ReconnectDecision::Terminal);
    }

    #[test]
    fn test_hint_discarded_on_terminal_close() {
        let controller = ReconnectController::new(true);
        controller.remember_hint("wss://resume.example");
        let _ = controller.decide(&closed(false));
        assert!(!controller.has_hint());
    }

    #[test]
    fn test_corrupt_stream_is_always_fresh() {
        for auto_reconnect in [true, false] {
            let controller = ReconnectController::new(auto_reconnect);
            assert_eq!(
                controller.decide(&Disconnect::CorruptStream("bad".to_string())),
                ReconnectDecision::Fresh
            );
        }
    }

    #[test]
    fn test_clear_hint() {
        let controller = ReconnectController::new(true);
        controller.remember_hint("wss://resume.example");
        controller.clear_hint();
        assert_eq!(controller.decide(&closed(true)), ReconnectDecision::Fresh);
    }
}
