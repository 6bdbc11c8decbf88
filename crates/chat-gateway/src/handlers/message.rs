//! Message and typing events

use super::{merge, nested_id, opt_string, str_field, DispatchContext, DispatchHandler, HandlerResult};
use chat_core::{
    ClientEvent, EntityCache, EntityKind, MessageCreatedEvent, MessageDeletedEvent,
    MessageReceiver, MessageUpdatedEvent, TypingStartedEvent,
};
use chrono::Utc;
use serde_json::Value;

#[derive(Debug, Clone, Copy)]
pub struct MessageCreateHandler;

/// Notifies only for cached messages
#[derive(Debug, Clone, Copy)]
pub struct MessageUpdateHandler;

/// Notifies only for cached messages
#[derive(Debug, Clone, Copy)]
pub struct MessageDeleteHandler;

/// Reactions are accepted but not modelled
#[derive(Debug, Clone, Copy)]
pub struct ReactionAddHandler;

/// Resolves unknown users through the REST executor before notifying
#[derive(Debug, Clone, Copy)]
pub struct TypingStartHandler;

impl DispatchHandler for MessageCreateHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let message_id = str_field(data, "id")?;
        let channel_id = str_field(data, "channel_id")?;
        let author_id = nested_id(data, "author").ok();

        if let Some(author_id) = author_id {
            if !ctx.cache.contains(EntityKind::User, author_id) {
                ctx.cache.put(EntityKind::User, author_id, data["author"].clone());
            }
        }
        ctx.cache.put(EntityKind::Message, message_id, data.clone());

        let receiver = MessageReceiver::resolve(ctx.cache.as_ref(), channel_id);
        ctx.bus.post(ClientEvent::MessageCreated(MessageCreatedEvent {
            message_id: message_id.to_string(),
            channel_id: channel_id.to_string(),
            author_id: author_id.map(String::from),
            content: opt_string(data, "content").unwrap_or_default(),
            receiver,
            timestamp: Utc::now(),
        }));
        Ok(())
    }
}

impl DispatchHandler for MessageUpdateHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let message_id = str_field(data, "id")?;
        let Some(mut message) = ctx.cache.get(EntityKind::Message, message_id) else {
            tracing::trace!(message_id, "Update for uncached message ignored");
            return Ok(());
        };

        let old_content = opt_string(&message, "content");
        merge(&mut message, data);
        let new_content = opt_string(&message, "content");
        let channel_id = opt_string(&message, "channel_id").unwrap_or_default();
        ctx.cache.put(EntityKind::Message, message_id, message);

        ctx.bus.post(ClientEvent::MessageUpdated(MessageUpdatedEvent {
            message_id: message_id.to_string(),
            channel_id,
            old_content,
            new_content,
            timestamp: Utc::now(),
        }));
        Ok(())
    }
}

impl DispatchHandler for MessageDeleteHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let message_id = str_field(data, "id")?;
        let Some(removed) = ctx.cache.remove(EntityKind::Message, message_id) else {
            tracing::trace!(message_id, "Delete for uncached message ignored");
            return Ok(());
        };

        let channel_id = opt_string(data, "channel_id")
            .or_else(|| opt_string(&removed, "channel_id"))
            .unwrap_or_default();

        ctx.bus.post(ClientEvent::MessageDeleted(MessageDeletedEvent {
            message_id: message_id.to_string(),
            channel_id,
            timestamp: Utc::now(),
        }));
        Ok(())
    }
}

impl DispatchHandler for ReactionAddHandler {
    fn handle(&self, _ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        tracing::trace!(message_id = ?data.get("message_id"), "Reaction added");
        Ok(())
    }
}

impl DispatchHandler for TypingStartHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let channel_id = str_field(data, "channel_id")?.to_string();
        let user_id = str_field(data, "user_id")?.to_string();

        if ctx.cache.contains(EntityKind::User, &user_id) {
            ctx.bus
                .post(ClientEvent::TypingStarted(typing_event(channel_id, user_id)));
            return Ok(());
        }

        let rest = ctx.rest.clone();
        let cache = ctx.cache.clone();
        let bus = ctx.bus.clone();
        ctx.rest.spawn(async move {
            match rest.get_user(&user_id).await {
                Ok(user) => {
                    cache.put(EntityKind::User, &user_id, user);
                    bus.post(ClientEvent::TypingStarted(typing_event(channel_id, user_id)));
                }
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "User lookup for typing event failed");
                }
            }
        });
        Ok(())
    }
}

fn typing_event(channel_id: String, user_id: String) -> TypingStartedEvent {
    TypingStartedEvent {
        channel_id,
        user_id,
        timestamp: Utc::now(),
    }
}
