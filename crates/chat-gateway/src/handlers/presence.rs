//! Presence updates

use super::{merge, nested_id, opt_string, DispatchContext, DispatchHandler, HandlerResult};
use chat_core::{ClientEvent, EntityCache, EntityKind, PresenceEvent};
use chrono::Utc;
use serde_json::Value;

#[derive(Debug, Clone, Copy)]
pub struct PresenceUpdateHandler;

impl DispatchHandler for PresenceUpdateHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let user_id = nested_id(data, "user")?;

        // Presence payloads may carry a partial user; refresh what is cached
        if let Some(mut user) = ctx.cache.get(EntityKind::User, user_id) {
            merge(&mut user, &data["user"]);
            ctx.cache.put(EntityKind::User, user_id, user);
        }

        let game = data
            .get("game")
            .and_then(|g| g.get("name"))
            .and_then(Value::as_str)
            .map(String::from);

        ctx.bus.post(ClientEvent::PresenceUpdated(PresenceEvent {
            guild_id: opt_string(data, "guild_id"),
            user_id: user_id.to_string(),
            status: opt_string(data, "status"),
            game,
            timestamp: Utc::now(),
        }));
        Ok(())
    }
}
