//! Gateway error types

use crate::codec::DecodeError;
use chat_common::RestError;
use chat_core::TokenError;
use thiserror::Error;

/// Errors surfaced by the gateway session
#[derive(Debug, Error)]
pub enum GatewayError {
    /// TLS setup failure, malformed URI or socket failure while connecting
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The socket closed before `READY` was received
    #[error("Connection closed before ready")]
    ClosedBeforeReady,

    #[error("Duplicate dispatch handler for {0}")]
    DuplicateHandler(String),

    #[error("Token provider error: {0}")]
    Token(#[from] TokenError),

    #[error("REST error: {0}")]
    Rest(#[from] RestError),

    #[error("Voice transport error: {0}")]
    Voice(String),

    #[error("Session is not connected")]
    NotConnected,

    #[error("Session is already connected")]
    AlreadyConnected,

    #[error("Session is shutting down")]
    Shutdown,
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
