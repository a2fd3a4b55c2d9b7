//! Notification service: queue consumer, email dispatch and relay forwarding.
//!
//! Run with: `cargo run -p helpdesk-relay-server --bin notifications`

use helpdesk_relay_server::{Config, notifications, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_tracing();
    let config = Config::from_env()?;
    telemetry::init_metrics(config.server.metrics_addr)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting notifications service");
    notifications::run(config).await
}
