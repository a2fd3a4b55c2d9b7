//! The identity gate.

use crate::config::IdentityConfig;
use crate::credentials::CallerCredentials;
use crate::error::{IdentityRejection, InvalidReason};
use crate::token;
use constant_time_eq::constant_time_eq;
use helpdesk_relay_core::principal::{Principal, ServicePrincipal};
use std::sync::Arc;

/// Resolves caller credentials into a [`Principal`].
///
/// Two terminal outcomes, no intermediate state:
///
/// 1. No bearer credential: [`IdentityRejection::MissingCredential`].
/// 2. A service name is announced: the bearer must equal the shared service
///    secret (constant-time comparison), giving a [`ServicePrincipal`]; otherwise
///    [`IdentityRejection::ServiceSecretMismatch`]. There is no fallback to token
///    verification for a call that claims to be a service.
/// 3. Otherwise the bearer is verified as an HS256 session token and its claims
///    give a user principal, or [`IdentityRejection::InvalidCredential`].
///
/// Cheap to clone; share one gate between the HTTP and WebSocket surfaces.
#[derive(Debug, Clone)]
pub struct IdentityGate {
    config: Arc<IdentityConfig>,
}

impl IdentityGate {
    /// Gate over `config`.
    #[must_use]
    pub fn new(config: IdentityConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// Resolve `credentials` at the current time.
    ///
    /// # Errors
    ///
    /// Returns the [`IdentityRejection`] describing why the caller was refused.
    pub fn resolve(&self, credentials: &CallerCredentials) -> Result<Principal, IdentityRejection> {
        self.resolve_at(credentials, chrono::Utc::now().timestamp())
    }

    /// Resolve `credentials` as of unix time `now`.
    ///
    /// # Errors
    ///
    /// Returns the [`IdentityRejection`] describing why the caller was refused.
    pub fn resolve_at(
        &self,
        credentials: &CallerCredentials,
        now: i64,
    ) -> Result<Principal, IdentityRejection> {
        let outcome = self.classify(credentials, now);

        match &outcome {
            Ok(principal) => {
                tracing::debug!(principal = %principal.label(), "Caller identified");
            }
            Err(rejection) => {
                tracing::debug!(
                    reason = rejection.code(),
                    detail = %rejection,
                    service_name = credentials.service_name().unwrap_or("-"),
                    "Caller rejected"
                );
            }
        }
        outcome
    }

    fn classify(&self, credentials: &CallerCredentials, now: i64) -> Result<Principal, IdentityRejection> {
        let Some(bearer) = credentials.bearer() else {
            return Err(IdentityRejection::MissingCredential);
        };

        if let Some(service_name) = credentials.service_name() {
            let matches = self
                .config
                .service_token
                .as_deref()
                .is_some_and(|secret| constant_time_eq(bearer.as_bytes(), secret.as_bytes()));
            return if matches {
                Ok(Principal::Service(ServicePrincipal {
                    service_name: service_name.to_string(),
                }))
            } else {
                Err(IdentityRejection::ServiceSecretMismatch)
            };
        }

        let secret = self
            .config
            .jwt_secret
            .as_deref()
            .ok_or(InvalidReason::MissingKey)?;
        let claims = token::verify(bearer, secret.as_bytes(), self.config.leeway, now)?;
        Ok(Principal::User(token::user_from_claims(&claims)?))
    }
}
