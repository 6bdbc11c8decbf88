//! One physical connection: writer task, identify and the read loop

use super::gateway::SessionInner;
use super::{Outbound, SessionState};
use crate::codec::{self, Frame};
use crate::error::GatewayResult;
use crate::handlers::{DispatchContext, SessionControl, READY_RECONNECT};
use crate::protocol::{
    CloseCode, Envelope, GatewayMessage, HelloPayload, IdentifyPayload, OpCode, ReadyPayload,
    ReconnectPayload, ResumePayload,
};
use crate::reconnect::Disconnect;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::connect_async;

/// How long the writer may take to flush a close frame
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How a connection introduces itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ConnectMode {
    /// Identify from scratch
    Fresh,
    /// Follow a resume hint; `READY` on this connection is the resume variant
    Resume,
}

/// Per-connection hooks handed to dispatch handlers
struct ConnectionLink {
    inner: Arc<SessionInner>,
    outbound: mpsc::UnboundedSender<Outbound>,
    hello_interval: Mutex<Option<u64>>,
    ready_fired: AtomicBool,
}

impl SessionControl for ConnectionLink {
    fn on_ready(&self, ready: &ReadyPayload, replay: bool) -> bool {
        let already = self.ready_fired.swap(true, Ordering::SeqCst);
        if replay && already {
            return false;
        }
        if !replay {
            self.inner.reconnect.clear_hint();
        }
        self.inner
            .apply_ready(ready, *self.hello_interval.lock(), &self.outbound);
        true
    }
}

/// Run one connection until it closes
///
/// `Err` means the connection could not be established at all.
pub(super) async fn run(
    inner: &Arc<SessionInner>,
    url: &str,
    mode: ConnectMode,
) -> GatewayResult<Disconnect> {
    let token = inner.tokens.token()?;
    let mut shutdown = inner.shutdown_tx.subscribe();
    if *shutdown.borrow_and_update() {
        return Ok(local_close("closed before connecting"));
    }

    let ws = tokio::select! {
        result = connect_async(url) => result?.0,
        _ = shutdown.changed() => return Ok(local_close("closed while connecting")),
    };

    let (sink, stream) = ws.split();
    let (outbound, receiver) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(sink, receiver));
    inner.set_outbound(Some(outbound.clone()));
    inner.set_state(SessionState::Identifying);

    let introduction = match (mode, inner.session_id()) {
        (ConnectMode::Resume, Some(session_id)) => {
            tracing::info!(session_id = %session_id, seq = ?inner.sequence(), "Sending resume");
            GatewayMessage::resume(ResumePayload {
                token,
                session_id,
                seq: inner.sequence(),
            })
            .to_json()?
        }
        _ => {
            tracing::info!("Sending identify");
            GatewayMessage::identify(IdentifyPayload::new(
                token,
                inner.config.gateway.large_threshold,
                inner.config.gateway.compress,
            ))
            .to_json()?
        }
    };
    // A failed send shows up as a closed stream in the read loop
    let _ = outbound.send(Outbound::Text(introduction));
    inner.set_state(SessionState::AwaitingReady);

    let link = Arc::new(ConnectionLink {
        inner: Arc::clone(inner),
        outbound: outbound.clone(),
        hello_interval: Mutex::new(None),
        ready_fired: AtomicBool::new(false),
    });
    let ctx = DispatchContext {
        cache: Arc::clone(&inner.cache),
        bus: inner.bus.clone(),
        rest: inner.rest.clone(),
        voice: Arc::clone(&inner.voice),
        session: link.clone(),
    };

    let disconnect = read_loop(inner, &ctx, &link, stream, &outbound, shutdown, mode).await;

    // Release every sender so the writer drains and exits
    inner.stop_heartbeat().await;
    inner.set_outbound(None);
    drop(ctx);
    drop(link);
    drop(outbound);
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await {
        Ok(_) => {}
        Err(_) => tracing::debug!("Writer did not drain in time"),
    }

    Ok(disconnect)
}

async fn read_loop<S>(
    inner: &SessionInner,
    ctx: &DispatchContext,
    link: &ConnectionLink,
    mut stream: S,
    outbound: &mpsc::UnboundedSender<Outbound>,
    mut shutdown: watch::Receiver<bool>,
    mode: ConnectMode,
) -> Disconnect
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let message = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_ok() && !*shutdown.borrow() {
                    continue;
                }
                inner.set_state(SessionState::Closing);
                send_close(outbound, "client closing");
                return local_close("closed by client");
            }
            message = stream.next() => message,
        };

        let frame = match message {
            Some(Ok(Message::Text(text))) => Frame::Text(text.to_string()),
            Some(Ok(Message::Binary(bytes))) => Frame::Binary(bytes.to_vec()),
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame.map_or((None, String::new()), |f| {
                    (Some(u16::from(f.code)), f.reason.to_string())
                });
                tracing::info!(
                    code = ?code,
                    description = code.map_or("no close frame", CloseCode::describe),
                    reason = %reason,
                    "Gateway closed the connection"
                );
                return Disconnect::Closed {
                    code,
                    reason,
                    remote: true,
                };
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Gateway socket error");
                return Disconnect::Closed {
                    code: None,
                    reason: e.to_string(),
                    remote: true,
                };
            }
            None => {
                return Disconnect::Closed {
                    code: None,
                    reason: "stream ended".to_string(),
                    remote: true,
                };
            }
        };

        match codec::decode(&frame) {
            Ok(envelope) => handle_envelope(inner, ctx, link, envelope, mode),
            Err(e) if e.is_corrupt_stream() => {
                tracing::warn!(error = %e, "Corrupt compressed frame, dropping connection");
                inner.set_state(SessionState::Closing);
                send_close(outbound, "corrupt stream");
                return Disconnect::CorruptStream(e.to_string());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed frame");
            }
        }
    }
}

fn handle_envelope(
    inner: &SessionInner,
    ctx: &DispatchContext,
    link: &ConnectionLink,
    envelope: Envelope,
    mode: ConnectMode,
) {
    match envelope.opcode() {
        Some(OpCode::Dispatch) => {
            if let Some(seq) = envelope.s {
                inner.set_sequence(seq);
            }
            let Some(event_type) = envelope.t.as_deref() else {
                tracing::debug!("Dispatch without event type");
                return;
            };
            let key = if mode == ConnectMode::Resume && event_type == "READY" {
                READY_RECONNECT
            } else {
                event_type
            };
            tracing::trace!(event_type = key, seq = ?envelope.s, "Dispatch");
            inner.registry.dispatch(ctx, key, &envelope.d);
        }
        Some(OpCode::Reconnect) => {
            match serde_json::from_value::<ReconnectPayload>(envelope.d) {
                Ok(ReconnectPayload { url: Some(url) }) => {
                    tracing::info!(url = %url, "Gateway sent a resume hint");
                    inner.reconnect.remember_hint(url);
                }
                _ => tracing::debug!("Reconnect request without url"),
            }
        }
        Some(OpCode::InvalidSession) => {
            tracing::warn!(session_id = ?inner.session_id(), "Gateway invalidated the session");
            inner.forget_session();
        }
        Some(OpCode::Hello) => {
            let hello: HelloPayload = serde_json::from_value(envelope.d).unwrap_or_default();
            tracing::debug!(interval_ms = ?hello.heartbeat_interval, "Hello received");
            *link.hello_interval.lock() = hello.heartbeat_interval;
        }
        Some(OpCode::HeartbeatAck) => tracing::trace!("Heartbeat acknowledged"),
        Some(op) => tracing::debug!(op = %op, "Unexpected op code from gateway"),
        None => tracing::debug!(op = envelope.op, "Unknown op code from gateway"),
    }
}

async fn write_loop<S>(mut sink: S, mut receiver: mpsc::UnboundedReceiver<Outbound>)
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(frame) = receiver.recv().await {
        let (message, last) = match frame {
            Outbound::Text(json) => (Message::Text(json.into()), false),
            Outbound::Close { code, reason } => (
                Message::Close(Some(CloseFrame {
                    code: code.into(),
                    reason: reason.into(),
                })),
                true,
            ),
        };

        if let Err(e) = sink.send(message).await {
            tracing::debug!(error = %e, "Gateway write failed");
            break;
        }
        if last {
            break;
        }
    }

    let _ = sink.close().await;
}

fn send_close(outbound: &mpsc::UnboundedSender<Outbound>, reason: &str) {
    let _ = outbound.send(Outbound::Close {
        code: CloseCode::Normal.as_u16(),
        reason: reason.to_string(),
    });
}

fn local_close(reason: &str) -> Disconnect {
    Disconnect::Closed {
        code: Some(CloseCode::Normal.as_u16()),
        reason: reason.to_string(),
        remote: false,
    }
}
