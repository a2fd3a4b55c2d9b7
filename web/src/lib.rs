//! Connection gateway for the helpdesk event relay.
//!
//! Clients keep a WebSocket open to receive live notifications. Each connection
//! is authenticated once, at the handshake, by the identity gate and placed in its
//! personal room `user:<id>`. A single process-wide task subscribes to the relay
//! channel and re-emits every targeted message into the matching room.
//!
//! # Architecture
//!
//! ```text
//!  RelayBus ──► RelayFanout ──► RoomRegistry ──► per-connection queue ──► WebSocket
//!                                   ▲
//!   GET /ws ── IdentityGate ── join user:<id>, ticket rooms
//! ```
//!
//! # Example
//!
//! ```ignore
//! let gate = IdentityGate::new(IdentityConfig::new().with_jwt_secret(secret));
//! let state = GatewayState::new(gate);
//! let fanout = RelayFanout::new(bus, "notifications").spawn(state.rooms.clone(), shutdown_rx);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router(state)).await?;
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod fanout;
pub mod handlers;
pub mod protocol;
pub mod rooms;
pub mod router;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::Authenticated;
pub use fanout::RelayFanout;
pub use protocol::{ClientFrame, ServerFrame};
pub use rooms::{ConnectionId, RoomRegistry};
pub use router::router;
pub use state::{AdmissionPolicy, GatewayState};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
