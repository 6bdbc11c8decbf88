//! Integration test utilities for the gateway client
//!
//! Provides an in-process mock gateway, a canned-response HTTP server for the
//! REST side, and a listener that records client events.

pub mod helpers;

pub use helpers::*;
