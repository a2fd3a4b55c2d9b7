//! HTTP and WebSocket handlers.

pub mod health;
pub mod principal;
pub mod websocket;
