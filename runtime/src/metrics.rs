//! Prometheus metrics for the relay.
//!
//! # Exported Metrics
//!
//! - `relay_consumer_messages_total{queue,outcome}` - settled deliveries
//! - `relay_gateway_connections` - open gateway connections
//! - `relay_gateway_emitted_total{event}` - frames emitted to rooms
//! - `relay_notify_emails_total{status}` - dispatcher sends
//!
//! Without an installed recorder every call is a no-op, so libraries and tests can
//! record freely.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, gauge};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install the exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Handled and acknowledged
    Acked,
    /// Handler failed; nacked without requeue
    Nacked,
    /// Undecodable; nacked without requeue
    Poison,
}

impl Outcome {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Acked => "acked",
            Self::Nacked => "nacked",
            Self::Poison => "poison",
        }
    }
}

/// Record one settled delivery.
pub fn record_settlement(queue: &str, outcome: Outcome) {
    counter!(
        "relay_consumer_messages_total",
        "queue" => queue.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Prometheus exporter serving `/metrics` on its own listener.
pub struct MetricsServer {
    addr: SocketAddr,
}

impl MetricsServer {
    /// Create a new metrics server.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Register descriptions and install the exporter. Must run inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if a recorder is already installed or the
    /// listener cannot be set up.
    pub fn start(&self) -> Result<(), MetricsError> {
        PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .install()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();
        tracing::info!(addr = %self.addr, "Metrics available at http://{}/metrics", self.addr);
        Ok(())
    }
}

fn register_metrics() {
    describe_counter!(
        "relay_consumer_messages_total",
        "Deliveries settled by the event consumer, by queue and outcome"
    );
    describe_gauge!(
        "relay_gateway_connections",
        "Open connections on the connection gateway"
    );
    describe_counter!(
        "relay_gateway_emitted_total",
        "Frames emitted to gateway rooms, by event name"
    );
    describe_counter!(
        "relay_notify_emails_total",
        "Emails handed to the mail transport, by status"
    );
}
