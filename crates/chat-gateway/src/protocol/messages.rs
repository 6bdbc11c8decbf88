//! Gateway message format
//!
//! [`GatewayMessage`] is what the client writes; [`Envelope`] is what it reads.

use super::{
    IdentifyPayload, OpCode, ResumePayload, StatusUpdatePayload, VoiceIdentifyPayload,
    VoiceStatePayload,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound control frame
#[derive(Debug, Clone, Serialize)]
pub struct GatewayMessage<D> {
    /// Operation code
    pub op: OpCode,
    /// Event data payload
    pub d: D,
}

impl<D: Serialize> GatewayMessage<D> {
    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        debug_assert!(self.op.is_client_op(), "{} is not a client op code", self.op);
        serde_json::to_string(self)
    }
}

impl GatewayMessage<IdentifyPayload> {
    /// Create an Identify message (op=2)
    #[must_use]
    pub fn identify(payload: IdentifyPayload) -> Self {
        Self {
            op: OpCode::Identify,
            d: payload,
        }
    }
}

impl GatewayMessage<u64> {
    /// Create a Heartbeat message (op=1) carrying a millisecond timestamp
    #[must_use]
    pub fn heartbeat(timestamp_ms: u64) -> Self {
        Self {
            op: OpCode::Heartbeat,
            d: timestamp_ms,
        }
    }
}

impl GatewayMessage<StatusUpdatePayload> {
    /// Create a Status Update message (op=3)
    #[must_use]
    pub fn status_update(payload: StatusUpdatePayload) -> Self {
        Self {
            op: OpCode::StatusUpdate,
            d: payload,
        }
    }
}

impl GatewayMessage<VoiceStatePayload> {
    /// Create a Voice State Update message (op=4)
    #[must_use]
    pub fn voice_state_update(payload: VoiceStatePayload) -> Self {
        Self {
            op: OpCode::VoiceStateUpdate,
            d: payload,
        }
    }
}

impl GatewayMessage<ResumePayload> {
    /// Create a Resume message (op=6)
    #[must_use]
    pub fn resume(payload: ResumePayload) -> Self {
        Self {
            op: OpCode::Resume,
            d: payload,
        }
    }
}

/// Voice identify frame; the voice transport uses op 0 for identify
#[derive(Debug, Clone, Serialize)]
pub struct VoiceIdentifyMessage {
    pub op: u8,
    pub d: VoiceIdentifyPayload,
}

impl VoiceIdentifyMessage {
    #[must_use]
    pub fn new(payload: VoiceIdentifyPayload) -> Self {
        Self { op: 0, d: payload }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decoded inbound frame
///
/// The op code is kept raw so frames with op codes this client does not know
/// still decode and can be logged.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// Operation code
    pub op: u8,

    /// Event type (only for op=0 Dispatch)
    #[serde(default)]
    pub t: Option<String>,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(default)]
    pub s: Option<u64>,

    /// Event data payload
    #[serde(default)]
    pub d: Value,
}

impl Envelope {
    /// Get the known op code, if any
    #[must_use]
    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_u8(self.op)
    }

    /// Deserialize from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.t {
            Some(t) => write!(f, "Envelope(op={}, t={t})", self.op),
            None => write!(f, "Envelope(op={})", self.op),
        }
    }
}
