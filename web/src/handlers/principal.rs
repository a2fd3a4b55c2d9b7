//! Identity gate HTTP surface.

use crate::extractors::Authenticated;
use axum::Json;
use helpdesk_relay_core::principal::Principal;

/// `GET /api/principal`: the caller's resolved identity, or 401/403.
#[allow(clippy::unused_async)]
pub async fn current_principal(Authenticated(principal): Authenticated) -> Json<Principal> {
    Json(principal)
}
