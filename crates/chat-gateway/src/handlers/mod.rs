//! Dispatch handlers
//!
//! Op 0 envelopes are routed by event type to a [`DispatchHandler`]. Handlers
//! run on the socket read task: they update the entity cache with single-key
//! operations and post [`chat_core::ClientEvent`]s to the listener bus, never
//! calling listener code themselves.

mod channel;
mod error;
mod guild;
mod message;
mod presence;
mod ready;
mod registry;
mod voice;

pub use error::{HandlerError, HandlerResult};
pub use registry::{DispatchRegistry, DispatchRegistryBuilder, READY_RECONNECT};

use crate::listeners::ListenerBus;
use crate::protocol::ReadyPayload;
use crate::rest::RequestExecutor;
use crate::voice::VoiceHandshake;
use chat_core::EntityCache;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Handles one gateway event type
pub trait DispatchHandler: Send + Sync {
    fn handle(&self, ctx: &DispatchContext, data: &Value) -> HandlerResult<()>;
}

/// Session hooks a handler may trigger
pub trait SessionControl: Send + Sync {
    /// Apply the Ready transition for the current connection
    ///
    /// With `replay` set the side effects only run if they have not already run
    /// on this physical connection. Returns `true` if they ran.
    fn on_ready(&self, ready: &ReadyPayload, replay: bool) -> bool;
}

/// Everything a handler may touch
#[derive(Clone)]
pub struct DispatchContext {
    pub cache: Arc<dyn EntityCache>,
    pub bus: ListenerBus,
    pub rest: RequestExecutor,
    pub voice: Arc<VoiceHandshake>,
    pub session: Arc<dyn SessionControl>,
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("bus", &self.bus)
            .field("rest", &self.rest)
            .field("voice", &self.voice)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Payload helpers
// =============================================================================

fn str_field<'a>(data: &'a Value, field: &'static str) -> HandlerResult<&'a str> {
    data.get(field)
        .and_then(Value::as_str)
        .ok_or(HandlerError::MissingField(field))
}

fn opt_string(data: &Value, field: &str) -> Option<String> {
    data.get(field).and_then(Value::as_str).map(String::from)
}

/// `data[parent].id`
fn nested_id<'a>(data: &'a Value, parent: &'static str) -> HandlerResult<&'a str> {
    data.get(parent)
        .and_then(|p| p.get("id"))
        .and_then(Value::as_str)
        .ok_or(HandlerError::MissingField(parent))
}

/// Shallow-merge the fields of `update` into `target`
fn merge(target: &mut Value, update: &Value) {
    match (target, update) {
        (Value::Object(target), Value::Object(update)) => {
            for (key, value) in update {
                target.insert(key.clone(), value.clone());
            }
        }
        (target, update) => *target = update.clone(),
    }
}

/// Copy of `value` with `field` set, for entities cached without their parent id
fn with_field(value: &Value, field: &str, field_value: &str) -> Value {
    let mut object = value.as_object().cloned().unwrap_or_else(Map::new);
    object.insert(field.to_string(), Value::String(field_value.to_string()));
    Value::Object(object)
}
