//! Identity gate configuration.
//!
//! Values are supplied by the application; this crate never reads the environment.

use std::fmt;
use std::time::Duration;

/// Secrets and tolerances used to resolve callers.
///
/// Both secrets are optional: without a service token no call resolves to a
/// service, without a JWT secret no call resolves to a user.
#[derive(Clone, Default)]
pub struct IdentityConfig {
    /// Shared secret presented by trusted internal services.
    pub service_token: Option<String>,

    /// HMAC key for HS256 session tokens.
    pub jwt_secret: Option<String>,

    /// Clock skew tolerated on `exp` and `nbf`.
    ///
    /// Default: zero
    pub leeway: Duration,
}

impl IdentityConfig {
    /// Configuration with no secrets and no leeway.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            service_token: None,
            jwt_secret: None,
            leeway: Duration::ZERO,
        }
    }

    /// Set the shared service secret. A blank value leaves it unset.
    #[must_use]
    pub fn with_service_token(mut self, token: impl Into<String>) -> Self {
        self.service_token = non_blank(token.into());
        self
    }

    /// Set the session token key. A blank value leaves it unset.
    #[must_use]
    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = non_blank(secret.into());
        self
    }

    /// Set the tolerated clock skew.
    #[must_use]
    pub const fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("service_token", &self.service_token.as_ref().map(|_| "<redacted>"))
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("leeway", &self.leeway)
            .finish()
    }
}
