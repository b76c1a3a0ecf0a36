//! HTTP and WebSocket request handlers
//!
//! This module organizes the call bridge handlers into logical groups:
//! - `call` - Answer and event webhooks, call-control document
//! - `bridge` - Call audio WebSocket bridged to a speech session

pub mod bridge;
pub mod call;

// Re-export commonly used handlers for convenient access
pub use bridge::bridge_handler;
pub use call::{answer, event, ncco};
