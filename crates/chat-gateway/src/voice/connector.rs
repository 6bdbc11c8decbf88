//! Secondary voice transport

use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{VoiceIdentifyMessage, VoiceIdentifyPayload};
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Everything needed to open the voice transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConnectRequest {
    pub endpoint: String,
    pub token: String,
    pub session_id: String,
    pub user_id: String,
    /// Server (guild) the voice channel belongs to
    pub server_id: String,
    pub channel_id: String,
}

/// Opens the voice transport
///
/// `open` is called while the handshake lock is held, so implementations must
/// not block; spawn the actual I/O and return a handle.
pub trait VoiceConnector: Send + Sync {
    fn open(&self, request: VoiceConnectRequest) -> GatewayResult<VoiceConnection>;
}

/// Handle to an opened voice transport; closes it when dropped
#[derive(Debug)]
pub struct VoiceConnection {
    url: String,
    task: Option<JoinHandle<()>>,
}

impl VoiceConnection {
    pub fn new(url: impl Into<String>, task: Option<JoinHandle<()>>) -> Self {
        Self {
            url: url.into(),
            task,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(url = %self.url, "Voice transport closed");
        }
    }
}

impl Drop for VoiceConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Build the voice transport URL from a server-supplied endpoint
pub fn voice_url(endpoint: &str) -> String {
    let host = endpoint.strip_suffix(":80").unwrap_or(endpoint);
    format!("wss://{host}")
}

/// Default connector: a `tokio-tungstenite` client task
#[derive(Debug, Default, Clone, Copy)]
pub struct WsVoiceConnector;

impl VoiceConnector for WsVoiceConnector {
    fn open(&self, request: VoiceConnectRequest) -> GatewayResult<VoiceConnection> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| GatewayError::Voice(e.to_string()))?;

        let url = voice_url(&request.endpoint);
        let task = runtime.spawn(run_transport(url.clone(), request));
        Ok(VoiceConnection::new(url, Some(task)))
    }
}

async fn run_transport(url: String, request: VoiceConnectRequest) {
    let identify = VoiceIdentifyMessage::new(VoiceIdentifyPayload {
        server_id: request.server_id,
        user_id: request.user_id,
        session_id: request.session_id,
        token: request.token,
    });

    let json = match identify.to_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode voice identify");
            return;
        }
    };

    let (ws, _response) = match connect_async(url.as_str()).await {
        Ok(connected) => connected,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Voice transport connect failed");
            return;
        }
    };

    let (mut sink, mut stream) = ws.split();
    if let Err(e) = sink.send(Message::Text(json.into())).await {
        tracing::warn!(url = %url, error = %e, "Failed to send voice identify");
        return;
    }

    tracing::info!(url = %url, channel_id = %request.channel_id, "Voice transport open");

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Close(frame)) => {
                tracing::info!(url = %url, frame = ?frame, "Voice transport closed by server");
                break;
            }
            Ok(Message::Text(text)) => {
                tracing::trace!(url = %url, payload = %text, "Voice control message");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Voice transport error");
                break;
            }
        }
    }
}
