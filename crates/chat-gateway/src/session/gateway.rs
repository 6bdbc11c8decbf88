//! Session handle, shared state and the supervisor loop

use super::connection::{self, ConnectMode};
use super::{Outbound, SessionState};
use crate::error::{GatewayError, GatewayResult};
use crate::handlers::DispatchRegistry;
use crate::heartbeat::{HeartbeatHandle, HeartbeatScheduler, HeartbeatTiming};
use crate::listeners::{Listener, ListenerBus, ListenerId};
use crate::protocol::{GatewayMessage, ReadyPayload, StatusUpdatePayload};
use crate::reconnect::{ReconnectController, ReconnectDecision};
use crate::rest::RequestExecutor;
use crate::voice::{VoiceConnector, VoiceHandshake, WsVoiceConnector};
use chat_common::ClientConfig;
use chat_core::{
    ClientEvent, DisconnectedEvent, EntityCache, EventCategory, ReconnectFailedEvent,
    StatusSnapshot, TokenProvider, VoiceChannel,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

type ReadyCallback = Box<dyn FnOnce(GatewayResult<()>) + Send>;

/// State shared by the session handle, the supervisor and the connection tasks
pub(super) struct SessionInner {
    pub(super) config: ClientConfig,
    pub(super) tokens: Arc<dyn TokenProvider>,
    pub(super) cache: Arc<dyn EntityCache>,
    pub(super) registry: DispatchRegistry,
    pub(super) bus: ListenerBus,
    pub(super) rest: RequestExecutor,
    pub(super) voice: Arc<VoiceHandshake>,
    pub(super) reconnect: ReconnectController,
    status: Arc<RwLock<StatusSnapshot>>,
    state_tx: watch::Sender<SessionState>,
    pub(super) shutdown_tx: watch::Sender<bool>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    session_id: RwLock<Option<String>>,
    sequence: Mutex<Option<u64>>,
    heartbeat: Mutex<Option<HeartbeatHandle>>,
    on_ready: Mutex<Option<ReadyCallback>>,
}

impl SessionInner {
    pub(super) fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub(super) fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Session state changed");
        }
    }

    pub(super) fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub(super) fn set_outbound(&self, sender: Option<mpsc::UnboundedSender<Outbound>>) {
        *self.outbound.lock() = sender;
    }

    fn outbound(&self) -> Option<mpsc::UnboundedSender<Outbound>> {
        self.outbound.lock().clone()
    }

    pub(super) fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    pub(super) fn forget_session(&self) {
        self.session_id.write().take();
        self.sequence.lock().take();
    }

    pub(super) fn sequence(&self) -> Option<u64> {
        *self.sequence.lock()
    }

    pub(super) fn set_sequence(&self, seq: u64) {
        *self.sequence.lock() = Some(seq);
    }

    /// Resolve the readiness signal; returns `false` if it was already resolved
    fn resolve_ready(&self, result: GatewayResult<()>) -> bool {
        let Some(callback) = self.on_ready.lock().take() else {
            return false;
        };
        callback(result);
        true
    }

    /// Ready transition: store the session, start the heartbeat, push status
    pub(super) fn apply_ready(
        &self,
        ready: &ReadyPayload,
        hello_interval: Option<u64>,
        outbound: &mpsc::UnboundedSender<Outbound>,
    ) {
        if let Some(session_id) = &ready.session_id {
            *self.session_id.write() = Some(session_id.clone());
        }
        if let Some(user_id) = ready.user_id() {
            self.voice.set_user_id(user_id);
        }

        self.set_state(SessionState::Ready);

        let interval_ms = ready
            .heartbeat_interval
            .or(hello_interval)
            .unwrap_or(self.config.heartbeat.default_interval_ms);
        let heartbeat = HeartbeatScheduler::new(
            HeartbeatTiming::from_settings(&self.config.heartbeat, interval_ms),
            outbound.clone(),
            Arc::clone(&self.status),
            self.state_tx.subscribe(),
            self.shutdown_tx.subscribe(),
        )
        .spawn();
        if let Some(previous) = self.heartbeat.lock().replace(heartbeat) {
            previous.abort();
        }

        if let Err(e) = self.push_status(outbound) {
            tracing::warn!(error = %e, "Failed to push status after ready");
        }

        tracing::info!(
            session_id = ?ready.session_id,
            interval_ms,
            "Session ready"
        );
        self.resolve_ready(Ok(()));
    }

    fn push_status(&self, outbound: &mpsc::UnboundedSender<Outbound>) -> GatewayResult<()> {
        let payload = StatusUpdatePayload::from(&*self.status.read());
        let json = GatewayMessage::status_update(payload).to_json()?;
        outbound
            .send(Outbound::Text(json))
            .map_err(|_| GatewayError::NotConnected)
    }

    pub(super) async fn stop_heartbeat(&self) {
        let handle = self.heartbeat.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat
            .lock()
            .as_ref()
            .filter(|h| h.is_running())
            .map(HeartbeatHandle::interval)
    }

    async fn resolve_url(&self) -> GatewayResult<String> {
        if let Some(url) = &self.config.gateway.url {
            return Ok(url.clone());
        }
        let url = self.rest.fetch_gateway_url().await?;
        tracing::debug!(url = %url, "Resolved gateway url");
        Ok(url)
    }
}

/// Client session against the gateway
///
/// Cloning is cheap; clones share one session.
#[derive(Clone)]
pub struct GatewaySession {
    inner: Arc<SessionInner>,
    supervisor: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySession")
            .field("state", &self.inner.state())
            .field("session_id", &self.inner.session_id())
            .finish_non_exhaustive()
    }
}

impl GatewaySession {
    /// Create a session using the default voice transport
    pub fn new(
        config: ClientConfig,
        tokens: Arc<dyn TokenProvider>,
        cache: Arc<dyn EntityCache>,
    ) -> GatewayResult<Self> {
        Self::with_voice_connector(config, tokens, cache, Arc::new(WsVoiceConnector))
    }

    pub fn with_voice_connector(
        config: ClientConfig,
        tokens: Arc<dyn TokenProvider>,
        cache: Arc<dyn EntityCache>,
        connector: Arc<dyn VoiceConnector>,
    ) -> GatewayResult<Self> {
        let registry = DispatchRegistry::standard()?;
        let bus = ListenerBus::start()
            .map_err(|e| GatewayError::Transport(format!("failed to start listener bus: {e}")))?;
        let rest = RequestExecutor::new(&config.rest, Arc::clone(&tokens))?;
        let voice = Arc::new(VoiceHandshake::new(connector, bus.clone()));
        let reconnect = ReconnectController::new(config.gateway.auto_reconnect);
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);

        let inner = SessionInner {
            config,
            tokens,
            cache,
            registry,
            bus,
            rest,
            voice,
            reconnect,
            status: Arc::new(RwLock::new(StatusSnapshot::default())),
            state_tx,
            shutdown_tx,
            outbound: Mutex::new(None),
            session_id: RwLock::new(None),
            sequence: Mutex::new(None),
            heartbeat: Mutex::new(None),
            on_ready: Mutex::new(None),
        };

        Ok(Self {
            inner: Arc::new(inner),
            supervisor: Arc::new(Mutex::new(None)),
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start connecting without waiting
    ///
    /// `on_ready` is called once: with `Ok` after `READY`, or with the error
    /// that ended the first connection before it became ready. It runs on a
    /// session task and must not block.
    pub fn connect<F>(&self, on_ready: F) -> GatewayResult<()>
    where
        F: FnOnce(GatewayResult<()>) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let mut supervisor = self.supervisor.lock();
        if supervisor.as_ref().is_some_and(|task| !task.is_finished()) {
            return Err(GatewayError::AlreadyConnected);
        }

        self.inner.shutdown_tx.send_replace(false);
        *self.inner.on_ready.lock() = Some(Box::new(on_ready));
        self.inner.set_state(SessionState::Connecting);

        *supervisor = Some(runtime.spawn(supervise(Arc::clone(&self.inner))));
        Ok(())
    }

    /// Connect and wait until the session is ready or the attempt failed
    pub async fn connect_blocking(&self) -> GatewayResult<()> {
        let (tx, rx) = oneshot::channel();
        self.connect(move |result| {
            let _ = tx.send(result);
        })?;
        rx.await.map_err(|_| GatewayError::Shutdown)?
    }

    /// Ask the session to close; returns immediately
    pub fn close(&self) {
        tracing::info!(state = %self.inner.state(), "Closing session");
        self.inner.shutdown_tx.send_replace(true);
        self.inner.voice.close();
    }

    /// Close and wait until the heartbeat, writer and read loop have stopped
    pub async fn close_blocking(&self) {
        self.close();
        let supervisor = self.supervisor.lock().take();
        if let Some(task) = supervisor {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Session supervisor ended abnormally");
            }
        }
        self.inner.stop_heartbeat().await;
        self.inner.set_state(SessionState::Disconnected);
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Reset the voice handshake for `channel` and request its server info
    pub fn begin_voice_handshake(&self, channel: VoiceChannel) -> GatewayResult<()> {
        let outbound = self.inner.outbound().ok_or(GatewayError::NotConnected)?;
        let payload = self.inner.voice.begin(channel);
        let json = GatewayMessage::voice_state_update(payload).to_json()?;
        outbound
            .send(Outbound::Text(json))
            .map_err(|_| GatewayError::NotConnected)
    }

    /// Store a new status and push it right away if connected
    pub fn update_status(&self, game: Option<String>, idle: bool) -> GatewayResult<()> {
        *self.inner.status.write() = StatusSnapshot::new(game, idle);
        match self.inner.outbound() {
            Some(outbound) => self.inner.push_status(&outbound),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn subscribe(&self, category: EventCategory, listener: Arc<dyn Listener>) -> ListenerId {
        self.inner.bus.subscribe(category, listener)
    }

    pub fn unsubscribe(&self, category: EventCategory, id: ListenerId) -> bool {
        self.inner.bus.unsubscribe(category, id)
    }

    /// Wait until every event posted so far has reached its listeners
    pub async fn flush_listeners(&self) {
        self.inner.bus.flush().await;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn rest(&self) -> &RequestExecutor {
        &self.inner.rest
    }

    pub fn cache(&self) -> &Arc<dyn EntityCache> {
        &self.inner.cache
    }

    pub fn voice(&self) -> &VoiceHandshake {
        &self.inner.voice
    }

    /// Interval of the running heartbeat, if any
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.inner.heartbeat_interval()
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.inner.status.read().clone()
    }
}

/// Connection loop: connect, run, decide, repeat
async fn supervise(inner: Arc<SessionInner>) {
    let gateway_url = tokio::select! {
        url = inner.resolve_url() => url,
        _ = wait_for_shutdown(inner.shutdown_tx.subscribe()) => Err(GatewayError::Shutdown),
    };
    let gateway_url = match gateway_url {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(error = %e, "Failed to resolve gateway url");
            inner.set_state(SessionState::Disconnected);
            inner.resolve_ready(Err(e));
            return;
        }
    };

    let mut url = gateway_url.clone();
    let mut mode = ConnectMode::Fresh;

    loop {
        inner.set_state(SessionState::Connecting);
        tracing::info!(url = %url, ?mode, "Connecting to gateway");

        let result = connection::run(&inner, &url, mode).await;
        inner.stop_heartbeat().await;
        inner.set_outbound(None);

        let disconnect = match result {
            Ok(disconnect) => disconnect,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Gateway connection failed");
                inner.set_state(SessionState::Disconnected);
                let error = e.to_string();
                if !inner.resolve_ready(Err(e)) {
                    inner.bus.post(ClientEvent::ReconnectFailed(ReconnectFailedEvent {
                        url: url.clone(),
                        error,
                        timestamp: Utc::now(),
                    }));
                }
                break;
            }
        };

        tracing::info!(
            code = ?disconnect.code(),
            remote = disconnect.is_remote(),
            "Gateway connection ended"
        );
        inner.resolve_ready(Err(GatewayError::ClosedBeforeReady));
        inner.bus.post(ClientEvent::Disconnected(disconnected_event(&disconnect)));

        if inner.is_shutting_down() {
            break;
        }

        match inner.reconnect.decide(&disconnect) {
            ReconnectDecision::Resume { url: hint } => {
                tracing::info!(url = %hint, "Resuming at hinted url");
                url = hint;
                mode = ConnectMode::Resume;
            }
            ReconnectDecision::Fresh => {
                tracing::info!("Reconnecting with a fresh identify");
                url = gateway_url.clone();
                mode = ConnectMode::Fresh;
            }
            ReconnectDecision::Terminal => break,
        }
    }

    inner.set_state(SessionState::Disconnected);
    inner.resolve_ready(Err(GatewayError::Shutdown));
    tracing::debug!("Session supervisor stopped");
}

fn disconnected_event(disconnect: &crate::reconnect::Disconnect) -> DisconnectedEvent {
    use crate::reconnect::Disconnect;

    let (code, reason, remote) = match disconnect {
        Disconnect::Closed {
            code,
            reason,
            remote,
        } => (*code, reason.clone(), *remote),
        Disconnect::CorruptStream(reason) => (None, reason.clone(), false),
    };
    DisconnectedEvent {
        code,
        reason,
        remote,
        timestamp: Utc::now(),
    }
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
