//! Test helpers for integration tests
//!
//! [`MockGateway`] accepts WebSocket connections from the client under test and
//! hands each one to the test as a [`MockConnection`] it can script.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chat_common::ClientConfig;
use chat_core::{ClientEvent, EventCategory, InMemoryEntityCache, StaticTokenProvider};
use chat_gateway::{GatewaySession, SessionState, VoiceConnector};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// Upper bound for any single wait in a test
pub const TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Mock gateway
// ============================================================================

/// WebSocket server standing in for the chat gateway
pub struct MockGateway {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<MockConnection>,
    _handle: JoinHandle<()>,
}

impl MockGateway {
    /// Bind to an ephemeral port and start accepting
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, connections) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                match accept_async(stream).await {
                    Ok(ws) => {
                        if tx.send(MockConnection { ws }).is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("mock gateway handshake failed: {e}"),
                }
            }
        });

        Ok(Self {
            addr,
            connections,
            _handle: handle,
        })
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the client to open its next connection
    pub async fn next_connection(&mut self) -> Result<MockConnection> {
        tokio::time::timeout(TIMEOUT, self.connections.recv())
            .await
            .map_err(|_| anyhow!("no connection within {TIMEOUT:?}"))?
            .ok_or_else(|| anyhow!("mock gateway stopped"))
    }

    /// Check that no further connection arrives within `wait`
    pub async fn expect_no_connection(&mut self, wait: Duration) -> Result<()> {
        match tokio::time::timeout(wait, self.connections.recv()).await {
            Ok(Some(_)) => bail!("unexpected connection"),
            _ => Ok(()),
        }
    }
}

/// One accepted client connection
pub struct MockConnection {
    ws: WebSocketStream<TcpStream>,
}

impl MockConnection {
    /// Next text frame from the client, parsed as JSON
    pub async fn recv_json(&mut self) -> Result<Value> {
        loop {
            let message = tokio::time::timeout(TIMEOUT, self.ws.next())
                .await
                .map_err(|_| anyhow!("no frame within {TIMEOUT:?}"))?;

            match message {
                Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
                Some(Ok(Message::Close(frame))) => bail!("client closed: {frame:?}"),
                Some(Ok(_)) => {}
                Some(Err(e)) => bail!("socket error: {e}"),
                None => bail!("socket ended"),
            }
        }
    }

    /// Next frame with op code `op`, skipping others (heartbeats, status)
    pub async fn recv_op(&mut self, op: u64) -> Result<Value> {
        loop {
            let frame = self.recv_json().await?;
            if frame["op"] == op {
                return Ok(frame);
            }
        }
    }

    /// Wait for the client's close frame; returns its code
    pub async fn recv_close(&mut self) -> Result<Option<u16>> {
        loop {
            let message = tokio::time::timeout(TIMEOUT, self.ws.next())
                .await
                .map_err(|_| anyhow!("no close within {TIMEOUT:?}"))?;

            match message {
                Some(Ok(Message::Close(frame))) => return Ok(frame.map(|f| u16::from(f.code))),
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return Ok(None),
            }
        }
    }

    pub async fn send_json(&mut self, value: &Value) -> Result<()> {
        self.ws.send(Message::Text(value.to_string().into())).await?;
        Ok(())
    }

    /// Send an op 0 dispatch
    pub async fn send_dispatch(&mut self, event_type: &str, seq: u64, data: Value) -> Result<()> {
        self.send_json(&json!({"op": 0, "t": event_type, "s": seq, "d": data}))
            .await
    }

    /// Send `value` as a zlib-compressed binary frame
    pub async fn send_compressed(&mut self, value: &Value) -> Result<()> {
        let bytes = zlib(value.to_string().as_bytes())?;
        self.send_binary(bytes).await
    }

    pub async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.ws.send(Message::Binary(bytes.into())).await?;
        Ok(())
    }

    /// Close the connection from the server side
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.ws
            .close(Some(CloseFrame {
                code: code.into(),
                reason: reason.to_string().into(),
            }))
            .await?;
        Ok(())
    }

    /// Receive identify and answer with `READY`
    pub async fn handshake(&mut self, session_id: &str, interval_ms: u64) -> Result<Value> {
        let identify = self.recv_op(2).await?;
        self.send_dispatch("READY", 1, ready_payload(session_id, interval_ms))
            .await?;
        Ok(identify)
    }
}

pub fn zlib(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

pub fn ready_payload(session_id: &str, interval_ms: u64) -> Value {
    json!({
        "heartbeat_interval": interval_ms,
        "session_id": session_id,
        "user": {"id": "me", "username": "tester"},
        "guilds": [{"id": "g1", "name": "Guild", "channels": [{"id": "c1"}]}],
        "private_channels": []
    })
}

// ============================================================================
// Mock REST
// ============================================================================

/// HTTP server answering every request with the same status and JSON body
pub async fn serve_http(status: u16, body: Value) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let body = body.to_string();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    Ok(addr)
}

// ============================================================================
// Session helpers
// ============================================================================

/// Client config pointed at `url`
pub fn test_config(url: &str, auto_reconnect: bool) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.gateway.url = Some(url.to_string());
    config.gateway.auto_reconnect = auto_reconnect;
    config.heartbeat.status_refresh_probability = 0.0;
    config
}

pub fn test_session(config: ClientConfig) -> Result<(GatewaySession, Arc<InMemoryEntityCache>)> {
    let cache = Arc::new(InMemoryEntityCache::new());
    let session = GatewaySession::new(config, Arc::new(StaticTokenProvider::new("T")), cache.clone())?;
    Ok((session, cache))
}

pub fn test_session_with_voice(
    config: ClientConfig,
    connector: Arc<dyn VoiceConnector>,
) -> Result<GatewaySession> {
    Ok(GatewaySession::with_voice_connector(
        config,
        Arc::new(StaticTokenProvider::new("T")),
        Arc::new(InMemoryEntityCache::new()),
        connector,
    )?)
}

/// Wait until the session reaches `state`
pub async fn wait_for_state(session: &GatewaySession, state: SessionState) -> Result<()> {
    let mut watch = session.state_watch();
    tokio::time::timeout(TIMEOUT, watch.wait_for(|s| *s == state))
        .await
        .map_err(|_| anyhow!("state {state} not reached, still {}", session.state()))??;
    Ok(())
}

/// Records every client event the session posts
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<ClientEvent>>>,
}

impl EventRecorder {
    pub fn attach(session: &GatewaySession) -> Self {
        let recorder = Self::default();
        for category in EventCategory::ALL {
            let sink = Arc::clone(&recorder.events);
            session.subscribe(
                category,
                Arc::new(move |event: &ClientEvent| sink.lock().push(event.clone())),
            );
        }
        recorder
    }

    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(ClientEvent::event_type).collect()
    }

    /// Poll until an event of `event_type` has been recorded
    pub async fn wait_for(&self, session: &GatewaySession, event_type: &str) -> Result<ClientEvent> {
        let deadline = tokio::time::Instant::now() + TIMEOUT;
        loop {
            session.flush_listeners().await;
            if let Some(event) = self
                .events
                .lock()
                .iter()
                .find(|e| e.event_type() == event_type)
            {
                return Ok(event.clone());
            }
            if tokio::time::Instant::now() > deadline {
                bail!("no {event_type} event, saw {:?}", self.event_types());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
