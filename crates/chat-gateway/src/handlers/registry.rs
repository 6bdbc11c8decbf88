//! Event-type to handler table

use super::{
    channel::{ChannelCreateHandler, ChannelDeleteHandler, ChannelUpdateHandler},
    guild::{
        BanAddHandler, BanRemoveHandler, GuildCreateHandler, GuildDeleteHandler,
        GuildUpdateHandler, MemberAddHandler, MemberRemoveHandler, MemberUpdateHandler,
        RoleCreateHandler, RoleDeleteHandler, RoleUpdateHandler,
    },
    message::{
        MessageCreateHandler, MessageDeleteHandler, MessageUpdateHandler, ReactionAddHandler,
        TypingStartHandler,
    },
    presence::PresenceUpdateHandler,
    ready::{ReadyHandler, ResumedReadyHandler},
    voice::{VoiceServerUpdateHandler, VoiceStateUpdateHandler},
    DispatchContext, DispatchHandler,
};
use crate::error::{GatewayError, GatewayResult};
use chat_core::{ClientEvent, HandlerFailedEvent};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Dispatch key of the `READY` received on a connection that follows a resume hint
pub const READY_RECONNECT: &str = "READY_RECONNECT";

/// Immutable event-type to handler table, built once per session
pub struct DispatchRegistry {
    handlers: HashMap<&'static str, Arc<dyn DispatchHandler>>,
}

impl std::fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("DispatchRegistry")
            .field("event_types", &keys)
            .finish()
    }
}

impl DispatchRegistry {
    pub fn builder() -> DispatchRegistryBuilder {
        DispatchRegistryBuilder::default()
    }

    /// The full handler table used by a gateway session
    pub fn standard() -> GatewayResult<Self> {
        let resumed = ResumedReadyHandler;

        Ok(Self::builder()
            .register("READY", ReadyHandler)?
            .register(READY_RECONNECT, resumed)?
            .register("RESUMED", resumed)?
            .register("CHANNEL_CREATE", ChannelCreateHandler)?
            .register("CHANNEL_UPDATE", ChannelUpdateHandler)?
            .register("CHANNEL_DELETE", ChannelDeleteHandler)?
            .register("MESSAGE_CREATE", MessageCreateHandler)?
            .register("MESSAGE_UPDATE", MessageUpdateHandler)?
            .register("MESSAGE_DELETE", MessageDeleteHandler)?
            .register("MESSAGE_REACTION_ADD", ReactionAddHandler)?
            .register("TYPING_START", TypingStartHandler)?
            .register("GUILD_CREATE", GuildCreateHandler)?
            .register("GUILD_UPDATE", GuildUpdateHandler)?
            .register("GUILD_DELETE", GuildDeleteHandler)?
            .register("GUILD_MEMBER_ADD", MemberAddHandler)?
            .register("GUILD_MEMBER_UPDATE", MemberUpdateHandler)?
            .register("GUILD_MEMBER_REMOVE", MemberRemoveHandler)?
            .register("GUILD_BAN_ADD", BanAddHandler)?
            .register("GUILD_BAN_REMOVE", BanRemoveHandler)?
            .register("GUILD_ROLE_CREATE", RoleCreateHandler)?
            .register("GUILD_ROLE_UPDATE", RoleUpdateHandler)?
            .register("GUILD_ROLE_DELETE", RoleDeleteHandler)?
            .register("PRESENCE_UPDATE", PresenceUpdateHandler)?
            .register("VOICE_SERVER_UPDATE", VoiceServerUpdateHandler)?
            .register("VOICE_STATE_UPDATE", VoiceStateUpdateHandler)?
            .build())
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler for `event_type`; returns `false` if none is registered
    ///
    /// Unknown event types are dropped. A failing handler is reported to
    /// listeners as [`ClientEvent::HandlerFailed`] and never propagates.
    pub fn dispatch(&self, ctx: &DispatchContext, event_type: &str, data: &Value) -> bool {
        let Some(handler) = self.handlers.get(event_type) else {
            tracing::trace!(event_type, "No handler registered, dropping event");
            return false;
        };

        if let Err(e) = handler.handle(ctx, data) {
            tracing::warn!(event_type, error = %e, "Dispatch handler failed");
            ctx.bus
                .post(ClientEvent::HandlerFailed(HandlerFailedEvent {
                    event_type: event_type.to_string(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                }));
        }
        true
    }
}

/// Builder that rejects duplicate event types
#[derive(Default)]
pub struct DispatchRegistryBuilder {
    handlers: HashMap<&'static str, Arc<dyn DispatchHandler>>,
}

impl DispatchRegistryBuilder {
    pub fn register(
        mut self,
        event_type: &'static str,
        handler: impl DispatchHandler + 'static,
    ) -> GatewayResult<Self> {
        if self.handlers.contains_key(event_type) {
            return Err(GatewayError::DuplicateHandler(event_type.to_string()));
        }
        self.handlers.insert(event_type, Arc::new(handler));
        Ok(self)
    }

    pub fn build(self) -> DispatchRegistry {
        DispatchRegistry {
            handlers: self.handlers,
        }
    }
}
