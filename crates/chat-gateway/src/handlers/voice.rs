//! The two halves of the voice handshake

use super::{str_field, DispatchContext, DispatchHandler, HandlerResult};
use serde_json::Value;

/// Supplies the voice token and endpoint
#[derive(Debug, Clone, Copy)]
pub struct VoiceServerUpdateHandler;

/// Supplies the voice session id, for this client's own user only
///
/// Updates naming a channel other than the handshake's target are ignored.
#[derive(Debug, Clone, Copy)]
pub struct VoiceStateUpdateHandler;

impl DispatchHandler for VoiceServerUpdateHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let token = str_field(data, "token")?;
        let endpoint = str_field(data, "endpoint")?;

        tracing::debug!(endpoint, "Voice server info received");
        ctx.voice.provide_server_info(token, endpoint);
        Ok(())
    }
}

impl DispatchHandler for VoiceStateUpdateHandler {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()> {
        let user_id = str_field(data, "user_id")?;
        if !ctx.voice.is_own_user(user_id) {
            return Ok(());
        }

        if let Some(channel_id) = data.get("channel_id").and_then(Value::as_str) {
            if !ctx.voice.is_target_channel(channel_id) {
                tracing::debug!(channel_id, "Voice state for another channel, ignoring");
                return Ok(());
            }
        }

        let session_id = str_field(data, "session_id")?;
        tracing::debug!(session_id, "Voice session id received");
        ctx.voice.provide_session_id(session_id);
        Ok(())
    }
}
