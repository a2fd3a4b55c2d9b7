//! Connection gateway: authenticated WebSockets with room fan-out.
//!
//! Run with: `cargo run -p helpdesk-relay-server --bin gateway`

use helpdesk_relay_server::{Config, gateway, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_tracing();
    let config = Config::from_env()?;
    telemetry::init_metrics(config.server.metrics_addr)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting gateway service");
    gateway::run(config).await
}
