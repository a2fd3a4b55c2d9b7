//! Gateway router.

use crate::handlers::{health, principal, websocket};
use crate::state::GatewayState;
use axum::{Router, routing::get};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Routes of the connection gateway:
///
/// - `GET /ws` WebSocket gateway
/// - `GET /api/principal` resolved caller identity
/// - `GET /health`, `GET /health/ready`
#[must_use]
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/ws", get(websocket::handle))
        .route("/api/principal", get(principal::current_principal))
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
