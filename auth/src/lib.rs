//! # Helpdesk Relay Identity Gate
//!
//! Classifies every inbound call or connection as either a trusted inter-service
//! call or an end-user session, and produces a uniform
//! [`Principal`](helpdesk_relay_core::principal::Principal) for downstream
//! authorization.
//!
//! ```text
//! CallerCredentials ──► IdentityGate::resolve ──┬──► Principal::Service   (secret + X-Service-Name)
//!                                               ├──► Principal::User      (HS256 session token)
//!                                               └──► IdentityRejection    (missing / invalid / mismatch)
//! ```
//!
//! Resolution is a pure function of the credentials and the configuration. The
//! only work it does is the signature check; it never logs a raw credential.
//!
//! ## Example
//!
//! ```rust
//! use helpdesk_relay_auth::{CallerCredentials, IdentityConfig, IdentityGate};
//! use helpdesk_relay_core::principal::Principal;
//!
//! let gate = IdentityGate::new(IdentityConfig::new().with_service_token("s3cret"));
//! let credentials = CallerCredentials::new()
//!     .with_bearer("s3cret")
//!     .with_service_name("chat-svc");
//!
//! let principal = gate.resolve(&credentials).unwrap();
//! assert!(matches!(principal, Principal::Service(_)));
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod token;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::IdentityConfig;
pub use credentials::{CallerCredentials, SERVICE_NAME_HEADER};
pub use error::{IdentityRejection, InvalidReason};
pub use gate::IdentityGate;
