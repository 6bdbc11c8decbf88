//! Gateway client entry point
//!
//! Run with:
//! ```bash
//! CLIENT_TOKEN=... cargo run -p chat-gateway
//! ```
//!
//! Configuration is loaded from environment variables. Every client event is
//! logged; Ctrl-C closes the session.

use chat_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use chat_core::{ClientEvent, EventCategory, InMemoryEntityCache, StaticTokenProvider};
use chat_gateway::{GatewaySession, Listener};
use std::sync::Arc;
use tracing::{error, info};

struct EventLogger;

impl Listener for EventLogger {
    fn on_event(&self, event: &ClientEvent) {
        info!(
            event_type = event.event_type(),
            category = ?event.category(),
            "Client event"
        );
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "event-logger"
    }
}

#[tokio::main]
async fn main() {
    // Load configuration before tracing so the format follows APP_ENV
    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = try_init_tracing_with_config(&TracingConfig::for_environment(config.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Gateway client failed");
        std::process::exit(1);
    }
}

async fn run(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting gateway client...");

    let token = config.require_token()?.to_string();
    info!(
        env = ?config.env,
        gateway_url = ?config.gateway.url,
        auto_reconnect = config.gateway.auto_reconnect,
        "Configuration loaded"
    );

    let session = GatewaySession::new(
        config,
        Arc::new(StaticTokenProvider::new(token)),
        Arc::new(InMemoryEntityCache::new()),
    )?;

    let logger: Arc<dyn Listener> = Arc::new(EventLogger);
    for category in EventCategory::ALL {
        session.subscribe(category, Arc::clone(&logger));
    }

    session.connect_blocking().await?;
    info!(session_id = ?session.session_id(), "Connected");

    let mut state = session.state_watch();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received");
        }
        _ = async {
            while state.changed().await.is_ok() {
                if !state.borrow().is_active() {
                    break;
                }
            }
        } => {
            info!("Session ended");
        }
    }

    session.close_blocking().await;
    session.flush_listeners().await;
    info!("Gateway client stopped");
    Ok(())
}
