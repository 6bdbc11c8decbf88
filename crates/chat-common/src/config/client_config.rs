//! Gateway client configuration
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use std::env;

/// Main client configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub env: Environment,
    /// Auth token, only required by the standalone binary
    #[serde(default)]
    pub token: Option<String>,
    pub gateway: GatewaySettings,
    pub heartbeat: HeartbeatSettings,
    pub rest: RestSettings,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Gateway connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    /// Gateway URL; discovered through the REST API when absent
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    #[serde(default = "default_true")]
    pub compress: bool,
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u32,
}

/// Heartbeat scheduler settings
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatSettings {
    /// Interval used until the server supplies one
    #[serde(default = "default_heartbeat_interval_ms")]
    pub default_interval_ms: u64,
    /// Granularity at which the loop observes shutdown
    #[serde(default = "default_heartbeat_slice_ms")]
    pub slice_ms: u64,
    #[serde(default = "default_heartbeat_safety_margin_ms")]
    pub safety_margin_ms: u64,
    /// Chance of re-sending the status on each pulse, in `[0, 1]`
    #[serde(default = "default_status_refresh_probability")]
    pub status_refresh_probability: f64,
}

/// REST request executor settings
#[derive(Debug, Clone, Deserialize)]
pub struct RestSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_rest_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_rest_timeout_secs")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_large_threshold() -> u32 {
    250
}

fn default_heartbeat_interval_ms() -> u64 {
    41_250
}

fn default_heartbeat_slice_ms() -> u64 {
    10
}

fn default_heartbeat_safety_margin_ms() -> u64 {
    10
}

fn default_status_refresh_probability() -> f64 {
    0.1
}

fn default_api_base_url() -> String {
    "https://discordapp.com/api".to_string()
}

fn default_rest_max_concurrent() -> usize {
    16
}

fn default_rest_timeout_secs() -> u64 {
    30
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: None,
            auto_reconnect: true,
            compress: true,
            large_threshold: default_large_threshold(),
        }
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            default_interval_ms: default_heartbeat_interval_ms(),
            slice_ms: default_heartbeat_slice_ms(),
            safety_margin_ms: default_heartbeat_safety_margin_ms(),
            status_refresh_probability: default_status_refresh_probability(),
        }
    }
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            max_concurrent: default_rest_max_concurrent(),
            timeout_secs: default_rest_timeout_secs(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a value is present but out of range
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            env: env::var("APP_ENV")
                .ok()
                .and_then(|s| match s.to_lowercase().as_str() {
                    "production" => Some(Environment::Production),
                    "development" => Some(Environment::Development),
                    _ => None,
                })
                .unwrap_or_default(),
            token: env::var("CLIENT_TOKEN").ok().filter(|s| !s.is_empty()),
            gateway: GatewaySettings {
                url: env::var("GATEWAY_URL").ok().filter(|s| !s.is_empty()),
                auto_reconnect: env::var("AUTO_RECONNECT")
                    .ok()
                    .and_then(|s| parse_bool(&s))
                    .unwrap_or_else(default_true),
                compress: env::var("GATEWAY_COMPRESS")
                    .ok()
                    .and_then(|s| parse_bool(&s))
                    .unwrap_or_else(default_true),
                large_threshold: env::var("LARGE_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_large_threshold),
            },
            heartbeat: HeartbeatSettings {
                default_interval_ms: env::var("HEARTBEAT_DEFAULT_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_heartbeat_interval_ms),
                slice_ms: env::var("HEARTBEAT_SLICE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_heartbeat_slice_ms),
                safety_margin_ms: env::var("HEARTBEAT_SAFETY_MARGIN_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_heartbeat_safety_margin_ms),
                status_refresh_probability: env::var("STATUS_REFRESH_PROBABILITY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_status_refresh_probability),
            },
            rest: RestSettings {
                api_base_url: env::var("API_BASE_URL").unwrap_or_else(|_| default_api_base_url()),
                max_concurrent: env::var("REST_MAX_CONCURRENT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_rest_max_concurrent),
                timeout_secs: env::var("REST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_rest_timeout_secs),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that cannot be expressed by the field types
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` naming the offending variable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = self.heartbeat.status_refresh_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::InvalidValue(
                "STATUS_REFRESH_PROBABILITY",
                p.to_string(),
            ));
        }
        if self.heartbeat.slice_ms == 0 {
            return Err(ConfigError::InvalidValue("HEARTBEAT_SLICE_MS", "0".to_string()));
        }
        if self.rest.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue("REST_MAX_CONCURRENT", "0".to_string()));
        }
        Ok(())
    }

    /// Get the token, failing when none was configured
    ///
    /// # Errors
    /// Returns `ConfigError::MissingVar` if `CLIENT_TOKEN` was not set
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token
            .as_deref()
            .ok_or(ConfigError::MissingVar("CLIENT_TOKEN"))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
