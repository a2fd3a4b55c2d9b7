//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::state::GatewayState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

/// Simple health check endpoint (for basic liveness).
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness body.
#[derive(Debug, Serialize)]
pub struct Readiness {
    /// Always `ok` when the router answers
    pub status: &'static str,
    /// Open WebSocket connections
    pub connections: usize,
    /// Non-empty rooms
    pub rooms: usize,
}

/// Readiness with gateway counters.
///
/// # Endpoint
///
/// ```text
/// GET /health/ready
/// ```
///
/// # Response
///
/// ```json
/// { "status": "ok", "connections": 3, "rooms": 4 }
/// ```
#[allow(clippy::unused_async)]
pub async fn readiness(State(state): State<GatewayState>) -> Json<Readiness> {
    Json(Readiness {
        status: "ok",
        connections: state.rooms.connection_count(),
        rooms: state.rooms.room_count(),
    })
}
