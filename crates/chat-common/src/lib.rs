//! # chat-common
//!
//! Shared utilities for the gateway client: configuration, the classified REST
//! error type, and telemetry.

pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    ClientConfig, ConfigError, Environment, GatewaySettings, HeartbeatSettings, RestSettings,
};
pub use error::{RestError, RestResult};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
