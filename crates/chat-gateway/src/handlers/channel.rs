//! Channel events

use super::{merge, opt_string, str_field, DispatchContext, DispatchHandler, HandlerResult};
use chat_core::{ChannelEvent, ClientEvent, EntityCache, EntityKind};
use chrono::Utc;
use serde_json::Value;

#[derive(Debug, Clone, Copy)]
pub struct ChannelCreateHandler;

#[derive(Debug, Clone, Copy)]
pub struct ChannelUpdateHandler;

#[derive(Debug, Clone, Copy)]
pub struct ChannelDeleteHandler;

fn is_private(data: &Value) -> bool {
    data.get("is_private")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| data.get("recipient").is_some())
}

fn kind_of(data: &Value) -> EntityKind {
    if is_private(data) {
        EntityKind::PrivateChannel
    } else {
        EntityKind::Channel
    }
}

fn channel_event(channel_id: &str, data: Value) -> ChannelEvent {
    ChannelEvent {
        channel_id: channel_id.to_string(),
        guild_id: opt_string(&data, "guild_id"),
        private: is_private(&data),
        data,
        timestamp: Utc::now(),
    }
}

impl DispatchHandler for ChannelCreateHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let channel_id = str_field(data, "id")?;

        if let Some(recipient) = data.get("recipient") {
            if let Some(user_id) = recipient.get("id").and_then(Value::as_str) {
                ctx.cache.put(EntityKind::User, user_id, recipient.clone());
            }
        }
        ctx.cache.put(kind_of(data), channel_id, data.clone());

        ctx.bus
            .post(ClientEvent::ChannelCreated(channel_event(channel_id, data.clone())));
        Ok(())
    }
}

impl DispatchHandler for ChannelUpdateHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let channel_id = str_field(data, "id")?;
        let kind = kind_of(data);

        let mut merged = ctx.cache.get(kind, channel_id).unwrap_or(Value::Null);
        merge(&mut merged, data);
        ctx.cache.put(kind, channel_id, merged.clone());

        ctx.bus
            .post(ClientEvent::ChannelUpdated(channel_event(channel_id, merged)));
        Ok(())
    }
}

impl DispatchHandler for ChannelDeleteHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let channel_id = str_field(data, "id")?;

        let removed = ctx
            .cache
            .remove(EntityKind::Channel, channel_id)
            .or_else(|| ctx.cache.remove(EntityKind::PrivateChannel, channel_id));

        ctx.bus.post(ClientEvent::ChannelDeleted(channel_event(
            channel_id,
            removed.unwrap_or_else(|| data.clone()),
        )));
        Ok(())
    }
}
