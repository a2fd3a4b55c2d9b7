//! Identity gate behavior as seen by callers.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use helpdesk_relay_auth::test_utils::sign_token;
use helpdesk_relay_auth::{CallerCredentials, IdentityConfig, IdentityGate, IdentityRejection, InvalidReason};
use helpdesk_relay_core::principal::{Principal, ServicePrincipal};
use http::{HeaderMap, HeaderValue};
use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;

const SERVICE_TOKEN: &str = "svc-secret";
const JWT_SECRET: &str = "jwt-secret";

fn gate() -> IdentityGate {
    IdentityGate::new(
        IdentityConfig::new()
            .with_service_token(SERVICE_TOKEN)
            .with_jwt_secret(JWT_SECRET),
    )
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ═══════════════════════════════════════════════════════════════════════
// Service principals
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_shared_secret_with_service_name_is_a_service() {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", HeaderValue::from_static("Bearer svc-secret"));
    headers.insert("x-service-name", HeaderValue::from_static("chat-svc"));

    let principal = gate().resolve(&CallerCredentials::from_headers(&headers)).unwrap();

    assert_eq!(
        principal,
        Principal::Service(ServicePrincipal {
            service_name: "chat-svc".to_string(),
        })
    );
    assert_eq!(principal.personal_room(), None);
}

// ═══════════════════════════════════════════════════════════════════════
// User principals
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_signed_token_is_a_user() {
    let token = sign_token(&json!({ "id": "u1", "rol": "usuario" }), JWT_SECRET);
    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );

    let principal = gate().resolve(&CallerCredentials::from_headers(&headers)).unwrap();

    let Principal::User(user) = principal else {
        panic!("expected a user principal, got {principal:?}");
    };
    assert_eq!(user.user_id, "u1");
    assert_eq!(user.role, "usuario");
    assert_eq!(user.company_id, None);
    assert_eq!(user.room(), "user:u1");
}

#[test]
fn test_token_from_query_is_accepted() {
    let token = sign_token(
        &json!({ "uid": "u42", "rol": "agente", "exp": now() + 3600 }),
        JWT_SECRET,
    );
    let credentials = CallerCredentials::from_headers(&HeaderMap::new()).or_token(Some(&token));

    let principal = gate().resolve(&credentials).unwrap();
    assert_eq!(principal.personal_room().as_deref(), Some("user:u42"));
}

// ═══════════════════════════════════════════════════════════════════════
// Rejections
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_no_credential_is_missing() {
    assert_eq!(
        gate().resolve(&CallerCredentials::from_headers(&HeaderMap::new())),
        Err(IdentityRejection::MissingCredential)
    );
}

#[test]
fn test_service_name_alone_is_missing() {
    let credentials = CallerCredentials::new().with_service_name("chat-svc");
    assert_eq!(
        gate().resolve(&credentials),
        Err(IdentityRejection::MissingCredential)
    );
}

#[test]
fn test_expired_token_is_invalid_not_missing() {
    let token = sign_token(
        &json!({ "id": "u1", "rol": "usuario", "exp": now() - 60 }),
        JWT_SECRET,
    );

    let rejection = gate()
        .resolve(&CallerCredentials::new().with_bearer(token))
        .unwrap_err();

    assert_eq!(
        rejection,
        IdentityRejection::InvalidCredential(InvalidReason::Expired)
    );
    assert_ne!(rejection.code(), IdentityRejection::MissingCredential.code());
}

#[test]
fn test_leeway_tolerates_small_clock_skew() {
    let gate = IdentityGate::new(
        IdentityConfig::new()
            .with_jwt_secret(JWT_SECRET)
            .with_leeway(Duration::from_secs(30)),
    );
    let token = sign_token(
        &json!({ "id": "u1", "rol": "usuario", "exp": 1_000 }),
        JWT_SECRET,
    );
    let credentials = CallerCredentials::new().with_bearer(token);

    assert!(gate.resolve_at(&credentials, 1_020).is_ok());
    assert_eq!(
        gate.resolve_at(&credentials, 1_031),
        Err(IdentityRejection::InvalidCredential(InvalidReason::Expired))
    );
}

#[test]
fn test_token_signed_with_another_key_is_invalid() {
    let token = sign_token(&json!({ "id": "u1", "rol": "usuario" }), "someone-else");
    assert_eq!(
        gate().resolve(&CallerCredentials::new().with_bearer(token)),
        Err(IdentityRejection::InvalidCredential(InvalidReason::BadSignature))
    );
}

#[test]
fn test_token_without_role_is_invalid() {
    let token = sign_token(&json!({ "id": "u1" }), JWT_SECRET);
    assert_eq!(
        gate().resolve(&CallerCredentials::new().with_bearer(token)),
        Err(IdentityRejection::InvalidCredential(InvalidReason::MissingClaim("rol")))
    );
}

#[test]
fn test_resolution_is_repeatable() {
    let token = sign_token(&json!({ "id": "u1", "rol": "usuario" }), JWT_SECRET);
    let credentials = CallerCredentials::new().with_bearer(token);
    let gate = gate();

    assert_eq!(gate.resolve_at(&credentials, 10), gate.resolve_at(&credentials, 10));
}

// ═══════════════════════════════════════════════════════════════════════
// Properties
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn prop_no_service_name_never_yields_a_service(bearer in ".{0,64}") {
        let credentials = CallerCredentials::new().with_bearer(&bearer);
        let outcome = gate().resolve(&credentials);
        prop_assert!(!matches!(outcome, Ok(Principal::Service(_))));
    }

    #[test]
    fn prop_the_secret_itself_never_yields_a_service_without_a_name(padding in " {0,4}") {
        let credentials = CallerCredentials::new().with_bearer(format!("{padding}{SERVICE_TOKEN}{padding}"));
        let outcome = gate().resolve(&credentials);
        prop_assert!(!matches!(outcome, Ok(Principal::Service(_))));
    }

    #[test]
    fn prop_wrong_secret_with_service_name_is_mismatch(
        bearer in "[a-zA-Z0-9._-]{1,48}",
        name in "[a-z-]{1,16}",
    ) {
        prop_assume!(bearer != SERVICE_TOKEN);
        let credentials = CallerCredentials::new().with_bearer(&bearer).with_service_name(&name);
        prop_assert_eq!(gate().resolve(&credentials), Err(IdentityRejection::ServiceSecretMismatch));
    }
}
