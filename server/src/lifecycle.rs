//! Process lifecycle and graceful shutdown.
//!
//! When a shutdown signal is received (Ctrl+C or SIGTERM):
//! 1. The HTTP server stops accepting new connections
//! 2. Shutdown is broadcast to background tasks
//! 3. Each task gets the configured timeout to finish its current work

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// If a signal handler cannot be installed, that source is treated as never
/// firing and a warning is logged.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

/// Wait for a background task, at most `timeout`.
///
/// Returns `true` if the task finished cleanly.
pub async fn await_task(name: &str, handle: JoinHandle<()>, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => {
            info!(task = name, "Task stopped gracefully");
            true
        }
        Ok(Err(e)) => {
            warn!(task = name, error = %e, "Task failed");
            false
        }
        Err(_) => {
            warn!(task = name, "Task shutdown timed out");
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_finished_task_is_clean() {
        let handle = tokio::spawn(async {});
        assert!(await_task("noop", handle, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_stuck_task_times_out() {
        let handle = tokio::spawn(std::future::pending::<()>());
        assert!(!await_task("stuck", handle, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_aborted_task_is_reported() {
        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        assert!(!await_task("aborted", handle, Duration::from_secs(1)).await);
    }
}
