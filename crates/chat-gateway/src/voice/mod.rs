//! Voice handshake coordinator
//!
//! Joining a voice channel needs two pieces of information that arrive in
//! separate dispatches: the voice server's token and endpoint, and this client's
//! voice session id. The secondary transport opens once both are known.

mod connector;
mod handshake;

pub use connector::{voice_url, VoiceConnectRequest, VoiceConnection, VoiceConnector, WsVoiceConnector};
pub use handshake::{VoiceHandshake, VoiceHandshakeState};
