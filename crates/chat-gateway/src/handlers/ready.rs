//! `READY` and its resume variants

use super::guild::cache_guild;
use super::{DispatchContext, DispatchHandler, HandlerResult};
use crate::protocol::ReadyPayload;
use chat_core::{ClientEvent, EntityCache, EntityKind, ReadyEvent};
use chrono::Utc;
use serde_json::Value;

/// First `READY` of a connection: reconcile the cache, then go Ready
#[derive(Debug, Clone, Copy)]
pub struct ReadyHandler;

/// `READY` after a resume hint, or `RESUMED`
///
/// Replays the cache reconciliation. The Ready transition only runs if it has
/// not already run on this connection.
#[derive(Debug, Clone, Copy)]
pub struct ResumedReadyHandler;

impl DispatchHandler for ReadyHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let ready: ReadyPayload = serde_json::from_value(data.clone())?;
        let servers = reconcile(ctx.cache.as_ref(), &ready);

        ctx.session.on_ready(&ready, false);
        ctx.bus.post(ClientEvent::Ready(ready_event(&ready, servers)));
        Ok(())
    }
}

impl DispatchHandler for ResumedReadyHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let ready: ReadyPayload = if data.is_null() {
            ReadyPayload::default()
        } else {
            serde_json::from_value(data.clone())?
        };
        let servers = reconcile(ctx.cache.as_ref(), &ready);

        if ctx.session.on_ready(&ready, true) {
            ctx.bus.post(ClientEvent::Resumed(ready_event(&ready, servers)));
        } else {
            tracing::debug!("Ready already handled on this connection, cache replayed only");
        }
        Ok(())
    }
}

fn ready_event(ready: &ReadyPayload, server_count: usize) -> ReadyEvent {
    ReadyEvent {
        session_id: ready.session_id.clone(),
        user_id: ready.user_id().map(String::from),
        server_count,
        timestamp: Utc::now(),
    }
}

/// Load the connected user, servers and private channels; returns the server count
fn reconcile(cache: &dyn EntityCache, ready: &ReadyPayload) -> usize {
    if let (Some(user), Some(id)) = (&ready.user, ready.user_id()) {
        cache.put(EntityKind::User, id, user.clone());
    }

    let servers = ready
        .guilds
        .iter()
        .filter_map(|guild| cache_guild(cache, guild))
        .count();

    for channel in &ready.private_channels {
        let Some(id) = channel.get("id").and_then(Value::as_str) else {
            tracing::debug!("Skipping private channel without id");
            continue;
        };
        if let Some(recipient) = channel.get("recipient") {
            if let Some(user_id) = recipient.get("id").and_then(Value::as_str) {
                cache.put(EntityKind::User, user_id, recipient.clone());
            }
        }
        cache.put(EntityKind::PrivateChannel, id, channel.clone());
    }

    servers
}
