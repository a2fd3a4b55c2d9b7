//! Credentials as presented by a caller, before any verification.

use http::HeaderMap;
use http::header::AUTHORIZATION;
use std::fmt;

/// Header a trusted service uses to announce itself.
pub const SERVICE_NAME_HEADER: &str = "x-service-name";

/// Raw credentials extracted from a request or a connection handshake.
///
/// Blank values are treated as absent. `Debug` never prints the bearer value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CallerCredentials {
    bearer: Option<String>,
    service_name: Option<String>,
}

impl CallerCredentials {
    /// No credentials.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bearer: None,
            service_name: None,
        }
    }

    /// Read `Authorization: Bearer <token>` and `X-Service-Name`.
    ///
    /// The `Bearer` scheme is matched case-insensitively; any other scheme is
    /// ignored.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_bearer);
        let service_name = headers
            .get(SERVICE_NAME_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(trimmed);

        Self {
            bearer,
            service_name,
        }
    }

    /// Set the bearer credential.
    #[must_use]
    pub fn with_bearer(mut self, token: impl AsRef<str>) -> Self {
        self.bearer = trimmed(token.as_ref());
        self
    }

    /// Set the announced service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl AsRef<str>) -> Self {
        self.service_name = trimmed(name.as_ref());
        self
    }

    /// Use a token passed out of band (e.g. a `?token=` query parameter) when no
    /// `Authorization` header was sent. Browsers cannot set headers on a WebSocket
    /// handshake.
    #[must_use]
    pub fn or_token(mut self, token: Option<&str>) -> Self {
        if self.bearer.is_none() {
            self.bearer = token.and_then(trimmed);
        }
        self
    }

    /// The bearer credential, if any.
    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    /// The announced service name, if any.
    #[must_use]
    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }
}

fn parse_bearer(value: &str) -> Option<String> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    trimmed(token)
}

fn trimmed(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl fmt::Debug for CallerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerCredentials")
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("service_name", &self.service_name)
            .finish()
    }
}
