//! Connection gateway service: authenticated WebSockets fed by the relay.

use crate::config::{Config, DEFAULT_REDIS_URL, IdentitySettings, ServerConfig};
use crate::lifecycle::{await_task, shutdown_signal};
use anyhow::Context;
use helpdesk_relay_auth::{IdentityConfig, IdentityGate};
use helpdesk_relay_redis::RedisRelayBus;
use helpdesk_relay_web::{AdmissionPolicy, GatewayState, RelayFanout, router};
use std::sync::Arc;
use tracing::{info, warn};

/// Run the gateway until a shutdown signal.
///
/// # Errors
///
/// Returns an error if the relay cannot be reached at startup or the listener
/// cannot be bound.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let gate = identity_gate(&config.identity);
    let state = GatewayState::new(gate).with_admission(admission_policy(&config.server));

    let redis_url = config.relay.redis_url.as_deref().unwrap_or(DEFAULT_REDIS_URL);
    let bus = RedisRelayBus::new(redis_url)
        .await
        .context("Failed to connect to the relay")?;
    let fanout = RelayFanout::new(Arc::new(bus), config.relay.channel.clone())
        .spawn(Arc::clone(&state.rooms), state.shutdown_signal());

    let listener = tokio::net::TcpListener::bind(config.server.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address()))?;
    info!(
        address = %config.server.bind_address(),
        channel = %config.relay.channel,
        admission = ?state.admission,
        "Connection gateway listening"
    );

    let on_signal = {
        let state = state.clone();
        async move {
            shutdown_signal().await;
            info!(connections = state.rooms.connection_count(), "Closing open connections");
            state.close_connections();
        }
    };

    axum::serve(listener, router(state))
        .with_graceful_shutdown(on_signal)
        .await?;

    await_task("relay-fanout", fanout, config.server.shutdown_timeout).await;
    info!("Graceful shutdown complete");
    Ok(())
}

/// Identity Gate from the configured secrets.
#[must_use]
pub fn identity_gate(settings: &IdentitySettings) -> IdentityGate {
    let mut identity = IdentityConfig::new().with_leeway(settings.leeway);
    match &settings.service_token {
        Some(token) => identity = identity.with_service_token(token.expose()),
        None => warn!("SERVICE_TOKEN unset, service callers will be rejected"),
    }
    match &settings.jwt_secret {
        Some(secret) => identity = identity.with_jwt_secret(secret.expose()),
        None => warn!("JWT_SECRET unset, user sessions will be rejected"),
    }
    IdentityGate::new(identity)
}

/// Admission policy for rejected handshakes.
#[must_use]
pub const fn admission_policy(server: &ServerConfig) -> AdmissionPolicy {
    if server.ws_reject_unauthenticated {
        AdmissionPolicy::Reject
    } else {
        AdmissionPolicy::AdmitWithoutRoom
    }
}
