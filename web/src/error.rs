//! Error type for web handlers.
//!
//! Bridges identity rejections and internal failures to HTTP responses with a
//! `{ "code", "message" }` JSON body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use helpdesk_relay_auth::IdentityRejection;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(headers: HeaderMap, State(gate): State<IdentityGate>) -> Result<Json<Principal>, AppError> {
///     let principal = gate.resolve(&CallerCredentials::from_headers(&headers))?;
///     Ok(Json(principal))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "BAD_REQUEST".to_string(),
        )
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message.into(), code.into())
    }

    /// Create a 403 Forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message.into(), code.into())
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code of this error.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

/// 401 for a missing or invalid credential, 403 for a service secret mismatch.
impl From<IdentityRejection> for AppError {
    fn from(rejection: IdentityRejection) -> Self {
        let code = rejection.code().to_uppercase();
        match rejection {
            IdentityRejection::MissingCredential => Self::unauthorized("Token no proporcionado", code),
            IdentityRejection::InvalidCredential(_) => Self::unauthorized("Token inválido", code),
            IdentityRejection::ServiceSecretMismatch => Self::forbidden("Servicio no autorizado", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_relay_auth::InvalidReason;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_identity_rejections_map_to_401_and_403() {
        let missing = AppError::from(IdentityRejection::MissingCredential);
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(missing.code(), "MISSING_CREDENTIAL");

        let invalid = AppError::from(IdentityRejection::InvalidCredential(InvalidReason::Expired));
        assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(invalid.code(), "INVALID_CREDENTIAL");

        let mismatch = AppError::from(IdentityRejection::ServiceSecretMismatch);
        assert_eq!(mismatch.status(), StatusCode::FORBIDDEN);
        assert_eq!(mismatch.code(), "SERVICE_SECRET_MISMATCH");
    }

    #[test]
    fn test_internal_hides_source() {
        let err = AppError::from(anyhow::anyhow!("relay down"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.to_string().contains("relay down"));
    }
}
