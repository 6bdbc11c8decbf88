//! Gateway protocol definitions
//!
//! Defines the WebSocket protocol including op codes, message formats, and close codes.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::CloseCode;
pub use messages::{Envelope, GatewayMessage, VoiceIdentifyMessage};
pub use opcodes::OpCode;
pub use payloads::{
    GamePayload, HelloPayload, IdentifyPayload, IdentifyProperties, ReadyPayload,
    ReconnectPayload, ResumePayload, StatusUpdatePayload, VoiceIdentifyPayload,
    VoiceStatePayload, GATEWAY_VERSION,
};
