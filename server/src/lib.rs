//! # Helpdesk Relay Server
//!
//! Wiring for the two relay processes:
//!
//! - **`notifications`**: consumes the ticket and chat queues, sends email and
//!   forwards ticket events to the relay
//! - **`gateway`**: authenticates WebSocket clients and fans relay messages out to
//!   their rooms
//!
//! Both read their settings from the environment (see [`config::Config`]) and shut
//! down gracefully on Ctrl-C or SIGTERM.

pub mod config;
pub mod gateway;
pub mod lifecycle;
pub mod notifications;
pub mod telemetry;

pub use config::{Config, ConfigError};
