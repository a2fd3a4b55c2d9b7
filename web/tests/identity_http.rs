//! Identity gate over HTTP: `GET /api/principal`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use helpdesk_relay_auth::test_utils::sign_token;
use helpdesk_relay_auth::{IdentityConfig, IdentityGate};
use helpdesk_relay_web::{GatewayState, router};
use serde_json::{Value, json};

fn server() -> TestServer {
    let gate = IdentityGate::new(
        IdentityConfig::new()
            .with_service_token("svc-secret")
            .with_jwt_secret("jwt-secret"),
    );
    TestServer::new(router(GatewayState::new(gate))).unwrap()
}

fn header(name: &'static str, value: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(name),
        HeaderValue::from_str(value).unwrap(),
    )
}

#[tokio::test]
async fn test_service_call_resolves_to_service() {
    let (auth_name, auth_value) = header("authorization", "Bearer svc-secret");
    let (svc_name, svc_value) = header("x-service-name", "chat-svc");

    let response = server()
        .get("/api/principal")
        .add_header(auth_name, auth_value)
        .add_header(svc_name, svc_value)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["kind"], "service");
    assert_eq!(body["serviceName"], "chat-svc");
}

#[tokio::test]
async fn test_user_token_resolves_to_user() {
    let token = sign_token(&json!({ "id": "u1", "rol": "usuario", "empresaId": "e1" }), "jwt-secret");
    let (name, value) = header("authorization", &format!("Bearer {token}"));

    let response = server().get("/api/principal").add_header(name, value).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["kind"], "user");
    assert_eq!(body["userId"], "u1");
    assert_eq!(body["role"], "usuario");
    assert_eq!(body["companyId"], "e1");
}

#[tokio::test]
async fn test_missing_credential_is_401() {
    let response = server().get("/api/principal").await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "MISSING_CREDENTIAL");
}

#[tokio::test]
async fn test_expired_token_is_401_invalid() {
    let token = sign_token(&json!({ "id": "u1", "rol": "usuario", "exp": 1 }), "jwt-secret");
    let (name, value) = header("authorization", &format!("Bearer {token}"));

    let response = server().get("/api/principal").add_header(name, value).await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_CREDENTIAL");
}

#[tokio::test]
async fn test_service_secret_mismatch_is_403() {
    let (auth_name, auth_value) = header("authorization", "Bearer wrong");
    let (svc_name, svc_value) = header("x-service-name", "chat-svc");

    let response = server()
        .get("/api/principal")
        .add_header(auth_name, auth_value)
        .add_header(svc_name, svc_value)
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["code"], "SERVICE_SECRET_MISMATCH");
}

#[tokio::test]
async fn test_health_needs_no_credential() {
    let server = server();
    assert_eq!(server.get("/health").await.status_code(), StatusCode::OK);

    let ready: Value = server.get("/health/ready").await.json();
    assert_eq!(ready["status"], "ok");
    assert_eq!(ready["connections"], 0);
}
