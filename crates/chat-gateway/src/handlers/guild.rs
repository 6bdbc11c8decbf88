//! Server, member, ban and role events

use super::{merge, nested_id, str_field, with_field, DispatchContext, DispatchHandler, HandlerResult};
use chat_core::{
    member_key, BanEvent, ClientEvent, EntityCache, EntityKind, GuildEvent, MemberEvent,
    RoleEvent,
};
use chrono::Utc;
use serde_json::Value;

/// Cache a server with its channels, members and roles; returns `None` without an id
pub(super) fn cache_guild(cache: &dyn EntityCache, guild: &Value) -> Option<String> {
    let Some(guild_id) = guild.get("id").and_then(Value::as_str) else {
        tracing::debug!("Skipping server without id");
        return None;
    };

    for channel in list(guild, "channels") {
        if let Some(id) = channel.get("id").and_then(Value::as_str) {
            cache.put(EntityKind::Channel, id, with_field(channel, "guild_id", guild_id));
        }
    }
    for member in list(guild, "members") {
        if let Ok(user_id) = nested_id(member, "user") {
            cache.put(EntityKind::User, user_id, member["user"].clone());
            cache.put(EntityKind::Member, &member_key(guild_id, user_id), member.clone());
        }
    }
    for role in list(guild, "roles") {
        if let Some(id) = role.get("id").and_then(Value::as_str) {
            cache.put(EntityKind::Role, id, with_field(role, "guild_id", guild_id));
        }
    }

    cache.put(EntityKind::Server, guild_id, guild.clone());
    Some(guild_id.to_string())
}

fn list<'a>(value: &'a Value, field: &str) -> &'a [Value] {
    value
        .get(field)
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

fn upsert(cache: &dyn EntityCache, kind: EntityKind, id: &str, update: &Value) -> Value {
    let mut merged = cache.get(kind, id).unwrap_or(Value::Null);
    merge(&mut merged, update);
    cache.put(kind, id, merged.clone());
    merged
}

// =============================================================================
// Servers
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct GuildCreateHandler;

#[derive(Debug, Clone, Copy)]
pub struct GuildUpdateHandler;

#[derive(Debug, Clone, Copy)]
pub struct GuildDeleteHandler;

impl DispatchHandler for GuildCreateHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let guild_id = str_field(data, "id")?;
        cache_guild(ctx.cache.as_ref(), data);

        tracing::debug!(guild_id, "Server joined");
        ctx.bus.post(ClientEvent::ServerJoined(GuildEvent {
            guild_id: guild_id.to_string(),
            data: data.clone(),
            timestamp: Utc::now(),
        }));
        Ok(())
    }
}

impl DispatchHandler for GuildUpdateHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let guild_id = str_field(data, "id")?;
        let merged = upsert(ctx.cache.as_ref(), EntityKind::Server, guild_id, data);

        ctx.bus.post(ClientEvent::ServerUpdated(GuildEvent {
            guild_id: guild_id.to_string(),
            data: merged,
            timestamp: Utc::now(),
        }));
        Ok(())
    }
}

impl DispatchHandler for GuildDeleteHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let guild_id = str_field(data, "id")?;
        let removed = ctx.cache.remove(EntityKind::Server, guild_id);

        tracing::debug!(guild_id, "Server left");
        ctx.bus.post(ClientEvent::ServerLeft(GuildEvent {
            guild_id: guild_id.to_string(),
            data: removed.unwrap_or_else(|| data.clone()),
            timestamp: Utc::now(),
        }));
        Ok(())
    }
}

// =============================================================================
// Members
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct MemberAddHandler;

#[derive(Debug, Clone, Copy)]
pub struct MemberUpdateHandler;

#[derive(Debug, Clone, Copy)]
pub struct MemberRemoveHandler;

impl DispatchHandler for MemberAddHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let guild_id = str_field(data, "guild_id")?;
        let user_id = nested_id(data, "user")?;

        ctx.cache.put(EntityKind::User, user_id, data["user"].clone());
        ctx.cache
            .put(EntityKind::Member, &member_key(guild_id, user_id), data.clone());

        ctx.bus.post(ClientEvent::MemberJoined(MemberEvent {
            guild_id: guild_id.to_string(),
            user_id: user_id.to_string(),
            data: data.clone(),
            timestamp: Utc::now(),
        }));
        Ok(())
    }
}

impl DispatchHandler for MemberUpdateHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let guild_id = str_field(data, "guild_id")?;
        let user_id = nested_id(data, "user")?;
        let merged = upsert(
            ctx.cache.as_ref(),
            EntityKind::Member,
            &member_key(guild_id, user_id),
            data,
        );

        ctx.bus.post(ClientEvent::MemberUpdated(MemberEvent {
            guild_id: guild_id.to_string(),
            user_id: user_id.to_string(),
            data: merged,
            timestamp: Utc::now(),
        }));
        Ok(())
    }
}

impl DispatchHandler for MemberRemoveHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let guild_id = str_field(data, "guild_id")?;
        let user_id = nested_id(data, "user")?;
        let removed = ctx
            .cache
            .remove(EntityKind::Member, &member_key(guild_id, user_id));

        ctx.bus.post(ClientEvent::MemberLeft(MemberEvent {
            guild_id: guild_id.to_string(),
            user_id: user_id.to_string(),
            data: removed.unwrap_or_else(|| data.clone()),
            timestamp: Utc::now(),
        }));
        Ok(())
    }
}

// =============================================================================
// Bans
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct BanAddHandler;

#[derive(Debug, Clone, Copy)]
pub struct BanRemoveHandler;

fn ban_event(data: &Value) -> HandlerResult<BanEvent> {
    Ok(BanEvent {
        guild_id: str_field(data, "guild_id")?.to_string(),
        user_id: nested_id(data, "user")?.to_string(),
        timestamp: Utc::now(),
    })
}

impl DispatchHandler for BanAddHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let event = ban_event(data)?;
        ctx.cache.put(
            EntityKind::Ban,
            &member_key(&event.guild_id, &event.user_id),
            data["user"].clone(),
        );
        ctx.bus.post(ClientEvent::UserBanned(event));
        Ok(())
    }
}

impl DispatchHandler for BanRemoveHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let event = ban_event(data)?;
        ctx.cache
            .remove(EntityKind::Ban, &member_key(&event.guild_id, &event.user_id));
        ctx.bus.post(ClientEvent::UserUnbanned(event));
        Ok(())
    }
}

// =============================================================================
// Roles
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct RoleCreateHandler;

#[derive(Debug, Clone, Copy)]
pub struct RoleUpdateHandler;

#[derive(Debug, Clone, Copy)]
pub struct RoleDeleteHandler;

fn cache_role(ctx: &DispatchContext, data: &Value) -> HandlerResult<RoleEvent> {
    let guild_id = str_field(data, "guild_id")?;
    let role_id = nested_id(data, "role")?;
    let role = with_field(&data["role"], "guild_id", guild_id);
    ctx.cache.put(EntityKind::Role, role_id, role.clone());

    Ok(RoleEvent {
        guild_id: guild_id.to_string(),
        role_id: role_id.to_string(),
        data: role,
        timestamp: Utc::now(),
    })
}

impl DispatchHandler for RoleCreateHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let event = cache_role(ctx, data)?;
        ctx.bus.post(ClientEvent::RoleCreated(event));
        Ok(())
    }
}

impl DispatchHandler for RoleUpdateHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let event = cache_role(ctx, data)?;
        ctx.bus.post(ClientEvent::RoleUpdated(event));
        Ok(())
    }
}

impl DispatchHandler for RoleDeleteHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let guild_id = str_field(data, "guild_id")?;
        let role_id = str_field(data, "role_id")?;
        let removed = ctx.cache.remove(EntityKind::Role, role_id);

        ctx.bus.post(ClientEvent::RoleDeleted(RoleEvent {
            guild_id: guild_id.to_string(),
            role_id: role_id.to_string(),
            data: removed.unwrap_or(Value::Null),
            timestamp: Utc::now(),
        }));
        Ok(())
    }
}
