//! Client events

mod client_event;

pub use client_event::*;
