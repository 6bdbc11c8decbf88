//! Collaborator seams consumed by the session engine

mod token;

pub use token::{StaticTokenProvider, TokenError, TokenProvider};
