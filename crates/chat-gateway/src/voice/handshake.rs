//! Handshake state and its two entry points

use super::{VoiceConnectRequest, VoiceConnection, VoiceConnector};
use crate::listeners::ListenerBus;
use crate::protocol::VoiceStatePayload;
use chat_core::{ClientEvent, VoiceChannel, VoiceConnectedEvent};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Credentials collected for one voice-connect attempt
#[derive(Debug, Default)]
pub struct VoiceHandshakeState {
    pub channel: Option<VoiceChannel>,
    pub token: Option<String>,
    pub endpoint: Option<String>,
    pub session_id: Option<String>,
    /// Once set, no further connect attempts are made for this handshake
    pub connection: Option<VoiceConnection>,
}

impl VoiceHandshakeState {
    fn for_channel(channel: VoiceChannel) -> Self {
        Self {
            channel: Some(channel),
            ..Self::default()
        }
    }

    fn request(&self, user_id: Option<String>) -> Option<VoiceConnectRequest> {
        let channel = self.channel.as_ref()?;
        let (token, endpoint, session_id) = (
            self.token.as_ref()?,
            self.endpoint.as_ref()?,
            self.session_id.as_ref()?,
        );

        Some(VoiceConnectRequest {
            endpoint: endpoint.clone(),
            token: token.clone(),
            session_id: session_id.clone(),
            user_id: user_id?,
            server_id: channel.guild_id.clone(),
            channel_id: channel.id.clone(),
        })
    }
}

/// Coordinates the two halves of the voice handshake
///
/// Both entry points store their half and attempt the open inside the same
/// critical section, so back-to-back or concurrent arrivals open at most once.
pub struct VoiceHandshake {
    state: Mutex<VoiceHandshakeState>,
    user_id: RwLock<Option<String>>,
    connector: Arc<dyn VoiceConnector>,
    bus: ListenerBus,
}

impl std::fmt::Debug for VoiceHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceHandshake")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl VoiceHandshake {
    pub fn new(connector: Arc<dyn VoiceConnector>, bus: ListenerBus) -> Self {
        Self {
            state: Mutex::new(VoiceHandshakeState::default()),
            user_id: RwLock::new(None),
            connector,
            bus,
        }
    }

    /// Record the connected user's id (from `READY`)
    pub fn set_user_id(&self, user_id: impl Into<String>) {
        *self.user_id.write() = Some(user_id.into());
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }

    /// Whether voice state updates for `user_id` concern this client
    pub fn is_own_user(&self, user_id: &str) -> bool {
        self.user_id.read().as_deref() == Some(user_id)
    }

    /// Reset for a new channel and return the voice-connect request payload
    ///
    /// Any transport opened by the previous handshake is closed.
    pub fn begin(&self, channel: VoiceChannel) -> VoiceStatePayload {
        let payload = VoiceStatePayload::from(&channel);
        let mut state = self.state.lock();

        tracing::info!(
            channel_id = %channel.id,
            guild_id = %channel.guild_id,
            had_connection = state.connection.is_some(),
            "Beginning voice handshake"
        );

        *state = VoiceHandshakeState::for_channel(channel);
        payload
    }

    /// Whether a handshake targeting `channel_id` is in progress
    pub fn is_target_channel(&self, channel_id: &str) -> bool {
        self.state
            .lock()
            .channel
            .as_ref()
            .is_some_and(|c| c.id == channel_id)
    }

    /// Store the voice server token and endpoint; returns `true` if this call
    /// opened the transport
    ///
    /// Ignored unless a handshake was begun.
    pub fn provide_server_info(&self, token: &str, endpoint: &str) -> bool {
        let mut state = self.state.lock();
        if state.channel.is_none() {
            tracing::debug!("Voice server info without a handshake, ignoring");
            return false;
        }
        state.token = Some(token.to_string());
        state.endpoint = Some(endpoint.to_string());
        self.try_open(&mut state)
    }

    /// Store the voice session id; returns `true` if this call opened the transport
    pub fn provide_session_id(&self, session_id: &str) -> bool {
        let mut state = self.state.lock();
        if state.channel.is_none() {
            tracing::debug!("Voice session id without a handshake, ignoring");
            return false;
        }
        state.session_id = Some(session_id.to_string());
        self.try_open(&mut state)
    }

    /// Close the transport and forget the handshake
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.connection.is_some() || state.channel.is_some() {
            tracing::debug!("Closing voice handshake");
        }
        *state = VoiceHandshakeState::default();
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connection.is_some()
    }

    // Caller holds the state lock
    fn try_open(&self, state: &mut VoiceHandshakeState) -> bool {
        if state.channel.is_none() || state.connection.is_some() {
            return false;
        }
        let Some(request) = state.request(self.user_id()) else {
            return false;
        };

        let guild_id = request.server_id.clone();
        let channel_id = request.channel_id.clone();
        let endpoint = request.endpoint.clone();

        match self.connector.open(request) {
            Ok(connection) => {
                tracing::info!(
                    guild_id = %guild_id,
                    channel_id = %channel_id,
                    url = %connection.url(),
                    "Voice transport opening"
                );
                state.connection = Some(connection);
                self.bus.post(ClientEvent::VoiceConnected(VoiceConnectedEvent {
                    guild_id,
                    channel_id,
                    endpoint,
                    timestamp: Utc::now(),
                }));
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, endpoint = %endpoint, "Failed to open voice transport");
                false
            }
        }
    }
}
