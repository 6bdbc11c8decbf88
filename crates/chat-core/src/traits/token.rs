//! Token provider
//!
//! The session never performs login itself; it asks the provider for the current
//! auth token whenever it builds an identify, resume or REST request.

use thiserror::Error;

/// Errors returned by a [`TokenProvider`]
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("No token available")]
    Unavailable,

    #[error("Token provider failed: {0}")]
    Provider(String),
}

/// Source of the current auth token
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Result<String, TokenError>;
}

/// A provider returning a fixed token
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token(&self) -> Result<String, TokenError> {
        if self.token.is_empty() {
            return Err(TokenError::Unavailable);
        }
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_token() {
        let provider = StaticTokenProvider::new("T");
        assert_eq!(provider.token().unwrap(), "T");
    }

    #[test]
    fn test_empty_token_is_unavailable() {
        let provider = StaticTokenProvider::new("");
        assert!(matches!(provider.token(), Err(TokenError::Unavailable)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let provider = StaticTokenProvider::new("secret");
        assert!(!format!("{provider:?}").contains("secret"));
    }
}
