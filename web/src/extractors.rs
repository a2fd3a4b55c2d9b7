//! Custom Axum extractors.

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use helpdesk_relay_auth::{CallerCredentials, IdentityGate};
use helpdesk_relay_core::principal::Principal;

/// The caller's resolved identity.
///
/// Reads `Authorization: Bearer` and `X-Service-Name`, resolves them through the
/// [`IdentityGate`] in the router state and rejects with 401/403.
///
/// # Example
///
/// ```ignore
/// async fn handler(Authenticated(principal): Authenticated) -> String {
///     principal.label()
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    IdentityGate: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = IdentityGate::from_ref(state);
        let credentials = CallerCredentials::from_headers(&parts.headers);
        let principal = gate.resolve(&credentials)?;
        Ok(Self(principal))
    }
}
