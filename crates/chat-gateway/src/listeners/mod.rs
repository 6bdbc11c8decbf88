//! Listener notification bus
//!
//! Fans client events out to subscribers on a dedicated worker thread so that
//! subscriber code never runs on the socket read loop or the heartbeat.

mod bus;
mod listener;

pub use bus::ListenerBus;
pub use listener::{Listener, ListenerId};
