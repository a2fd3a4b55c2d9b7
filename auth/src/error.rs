//! Rejection outcomes of the identity gate.

use thiserror::Error;

/// Why a credential was rejected.
///
/// The three variants stay distinguishable all the way to the boundary: a caller
/// (or a test) can always tell "nothing was sent" from "what was sent is wrong".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityRejection {
    /// No bearer credential on the request or connection.
    #[error("No credential provided")]
    MissingCredential,

    /// A credential was present but could not be verified as a session token.
    #[error("Invalid credential: {0}")]
    InvalidCredential(#[from] InvalidReason),

    /// A service name was announced but the shared secret did not match.
    #[error("Service secret mismatch")]
    ServiceSecretMismatch,
}

impl IdentityRejection {
    /// Stable machine-readable code, used in logs, metrics and response bodies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidCredential(_) => "invalid_credential",
            Self::ServiceSecretMismatch => "service_secret_mismatch",
        }
    }

    /// Whether the caller identified itself but is not allowed (403) rather than
    /// unauthenticated (401).
    #[must_use]
    pub const fn is_forbidden(&self) -> bool {
        matches!(self, Self::ServiceSecretMismatch)
    }
}

/// Detail of an [`IdentityRejection::InvalidCredential`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    // ═══════════════════════════════════════════════════════════
    // Configuration
    // ═══════════════════════════════════════════════════════════
    /// No verification key is configured, so no session token can be accepted.
    #[error("token verification key not configured")]
    MissingKey,

    // ═══════════════════════════════════════════════════════════
    // Token structure
    // ═══════════════════════════════════════════════════════════
    /// Not three base64url segments, or a segment is not valid JSON.
    #[error("malformed token")]
    Malformed,

    /// Header names an algorithm other than HS256.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Signature does not match the key.
    #[error("bad signature")]
    BadSignature,

    // ═══════════════════════════════════════════════════════════
    // Claims
    // ═══════════════════════════════════════════════════════════
    /// `exp` is in the past (leeway included).
    #[error("token expired")]
    Expired,

    /// `nbf` is in the future (leeway included).
    #[error("token not yet valid")]
    NotYetValid,

    /// A required claim is absent or has the wrong type.
    #[error("missing claim: {0}")]
    MissingClaim(&'static str),
}
