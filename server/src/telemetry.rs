//! Logging and metrics setup shared by the binaries.

use helpdesk_relay_runtime::metrics::MetricsServer;
use std::net::SocketAddr;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,helpdesk_relay=debug";

/// Install the global tracing subscriber.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Start the Prometheus exporter when an address is configured.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn init_metrics(addr: Option<SocketAddr>) -> anyhow::Result<()> {
    match addr {
        Some(addr) => Ok(MetricsServer::new(addr).start()?),
        None => {
            tracing::debug!("METRICS_ADDR unset, metrics exporter disabled");
            Ok(())
        }
    }
}
