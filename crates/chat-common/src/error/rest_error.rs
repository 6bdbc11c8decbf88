//! REST error types
//!
//! Non-success HTTP statuses are returned as classified values instead of being
//! raised, so callers can tell a permission problem from a generic failure.

/// Error returned by outbound REST calls
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Resource not found")]
    NotFound,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl RestError {
    /// Classify a non-success HTTP status
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            _ => Self::Status {
                status,
                body: body.into(),
            },
        }
    }

    /// Get the HTTP status code behind this error, if any
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::PermissionDenied => Some(403),
            Self::NotFound => Some(404),
            Self::RateLimited => Some(429),
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) | Self::Decode(_) => None,
        }
    }

    /// Get error code for logs and diagnostic events
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimited => "RATE_LIMITED",
            Self::Status { .. } => "UNEXPECTED_STATUS",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Decode(_) => "DECODE_ERROR",
        }
    }

    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }
}

/// Result type alias for REST operations
pub type RestResult<T> = Result<T, RestError>;
