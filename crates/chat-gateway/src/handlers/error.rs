//! Handler error types

use thiserror::Error;

/// Failure of one dispatch handler call
///
/// Handler errors never leave the dispatch call; they are logged and reported
/// to listeners as a diagnostic event.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Payload has an unexpected shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// A required field is absent or has the wrong type
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;
