//! # chat-gateway
//!
//! Gateway session engine: a WebSocket client that identifies against the chat
//! gateway, decodes its (optionally compressed) event stream, keeps the session
//! alive with heartbeats, resumes or reconnects when the socket drops, and
//! negotiates the voice transport.
//!
//! ```no_run
//! use chat_common::ClientConfig;
//! use chat_core::{EventCategory, InMemoryEntityCache, StaticTokenProvider};
//! use chat_gateway::GatewaySession;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), chat_gateway::GatewayError> {
//! let session = GatewaySession::new(
//!     ClientConfig::default(),
//!     Arc::new(StaticTokenProvider::new("token")),
//!     Arc::new(InMemoryEntityCache::new()),
//! )?;
//! session.subscribe(
//!     EventCategory::Message,
//!     Arc::new(|event: &chat_core::ClientEvent| println!("{}", event.event_type())),
//! );
//! session.connect_blocking().await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod handlers;
pub mod heartbeat;
pub mod listeners;
pub mod protocol;
pub mod reconnect;
pub mod rest;
pub mod session;
pub mod voice;

pub use error::{GatewayError, GatewayResult};
pub use handlers::{DispatchContext, DispatchHandler, DispatchRegistry, SessionControl};
pub use listeners::{Listener, ListenerBus, ListenerId};
pub use reconnect::{Disconnect, ReconnectController, ReconnectDecision};
pub use rest::RequestExecutor;
pub use session::{GatewaySession, Outbound, SessionState};
pub use voice::{VoiceConnector, VoiceHandshake, WsVoiceConnector};
