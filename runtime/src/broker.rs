//! Owned broker connection context.
//!
//! The context owns the connection lifecycle of the durable queue: a background
//! task runs the connector under a [`RetryPolicy`] and publishes progress on a
//! `watch` channel. Consumers and publishers wait on that signal instead of
//! polling a shared flag.
//!
//! ```text
//!   Connecting{1} ──fail──▶ Connecting{2} ──fail──▶ ... ──▶ Failed{n}   (ceiling reached)
//!        │                       │
//!        └──────ok──────┬────────┘
//!                       ▼
//!                     Ready
//! ```
//!
//! Every clone of a [`BrokerContext`] observes the same state. The queue handle
//! is shared by all consumers of the process; handlers never see it.

use crate::retry::RetryPolicy;
use helpdesk_relay_core::queue::{DurableQueue, QueueError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Connection state of the broker.
#[derive(Clone)]
pub enum BrokerState {
    /// Connection attempt in progress (1-based).
    Connecting {
        /// Current attempt number
        attempt: usize,
    },
    /// Connected; the queue handle is usable.
    Ready(Arc<dyn DurableQueue>),
    /// The connector gave up.
    Failed {
        /// Attempts made before giving up
        attempts: usize,
        /// Error of the last attempt
        reason: String,
    },
}

impl fmt::Debug for BrokerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting { attempt } => {
                f.debug_struct("Connecting").field("attempt", attempt).finish()
            }
            Self::Ready(_) => f.write_str("Ready"),
            Self::Failed { attempts, reason } => f
                .debug_struct("Failed")
                .field("attempts", attempts)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Errors surfaced while waiting for the broker.
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    /// The bounded wait elapsed while still connecting
    #[error("broker not ready after {0:?}")]
    NotReady(Duration),

    /// The connector exhausted its retries
    #[error("broker unavailable after {attempts} attempts: {reason}")]
    Unavailable {
        /// Attempts made before giving up
        attempts: usize,
        /// Error of the last attempt
        reason: String,
    },

    /// The connect task stopped without reaching a terminal state
    #[error("broker connection task stopped")]
    Closed,
}

/// Shared handle on the broker connection.
#[derive(Clone)]
pub struct BrokerContext {
    state: watch::Receiver<BrokerState>,
}

impl BrokerContext {
    /// Start connecting in the background.
    ///
    /// `connector` is called once per attempt. Must be called from within a Tokio
    /// runtime.
    pub fn connect<F, Fut>(policy: RetryPolicy, connector: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Arc<dyn DurableQueue>, QueueError>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(BrokerState::Connecting { attempt: 1 });
        tokio::spawn(connect_loop(policy, connector, tx));
        Self { state: rx }
    }

    /// Context for a queue that is already connected.
    #[must_use]
    pub fn ready(queue: Arc<dyn DurableQueue>) -> Self {
        let (_tx, rx) = watch::channel(BrokerState::Ready(queue));
        Self { state: rx }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> BrokerState {
        self.state.borrow().clone()
    }

    /// Whether the queue handle is usable now.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), BrokerState::Ready(_))
    }

    /// Wait for the connection, at most `timeout`.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::NotReady`] if still connecting when the wait elapses
    /// - [`BrokerError::Unavailable`] if the connector gave up
    /// - [`BrokerError::Closed`] if the connect task vanished
    pub async fn wait_ready(&self, timeout: Duration) -> Result<Arc<dyn DurableQueue>, BrokerError> {
        let mut rx = self.state.clone();
        let wait = async move {
            let state = rx
                .wait_for(|state| !matches!(state, BrokerState::Connecting { .. }))
                .await
                .map_err(|_| BrokerError::Closed)?;
            match &*state {
                BrokerState::Ready(queue) => Ok(Arc::clone(queue)),
                BrokerState::Failed { attempts, reason } => Err(BrokerError::Unavailable {
                    attempts: *attempts,
                    reason: reason.clone(),
                }),
                BrokerState::Connecting { .. } => Err(BrokerError::Closed),
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .unwrap_or(Err(BrokerError::NotReady(timeout)))
    }
}

impl fmt::Debug for BrokerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerContext")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

async fn connect_loop<F, Fut>(policy: RetryPolicy, mut connector: F, tx: watch::Sender<BrokerState>)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Arc<dyn DurableQueue>, QueueError>>,
{
    let mut attempt = 1;

    loop {
        tx.send_replace(BrokerState::Connecting { attempt });

        match connector().await {
            Ok(queue) => {
                info!(attempt, "Broker connection ready");
                tx.send_replace(BrokerState::Ready(queue));
                return;
            }
            Err(e) => {
                let retries_done = attempt - 1;
                if !policy.allows_retry(retries_done) {
                    error!(attempts = attempt, error = %e, "Broker unreachable, giving up");
                    tx.send_replace(BrokerState::Failed {
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                    return;
                }

                let delay = policy.delay_for_attempt(retries_done);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "Broker unreachable, retrying"
                );
                tokio::time::sleep(delay).await;

                if tx.is_closed() {
                    info!("Broker context dropped, stopping connection attempts");
                    return;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use helpdesk_relay_core::queue::DeliveryStream;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopQueue;

    impl DurableQueue for NoopQueue {
        fn declare(
            &self,
            _queue: &str,
        ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }

        fn publish(
            &self,
            _queue: &str,
            _body: &[u8],
        ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }

        fn consume(
            &self,
            _queue: &str,
        ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, QueueError>> + Send + '_>> {
            Box::pin(async { Ok(Box::pin(futures::stream::empty()) as DeliveryStream) })
        }
    }

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(max_retries)
            .initial_delay(Duration::from_millis(5))
            .max_delay(Duration::from_millis(5))
            .build()
    }

    #[tokio::test]
    async fn test_ready_context_resolves_immediately() {
        let context = BrokerContext::ready(Arc::new(NoopQueue));
        assert!(context.is_ready());
        assert!(context.wait_ready(Duration::from_millis(10)).await.is_ok());
    }

    #[tokio::test]
    async fn test_connects_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let context = BrokerContext::connect(fast_policy(5), move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(QueueError::ConnectionFailed("refused".to_string()))
                } else {
                    Ok(Arc::new(NoopQueue) as Arc<dyn DurableQueue>)
                }
            }
        });

        context.wait_ready(Duration::from_secs(1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_giving_up_is_a_terminal_error() {
        let context = BrokerContext::connect(fast_policy(2), || async {
            Err::<Arc<dyn DurableQueue>, _>(QueueError::ConnectionFailed("refused".to_string()))
        });

        let err = context.wait_ready(Duration::from_secs(1)).await.err().unwrap();
        assert!(matches!(err, BrokerError::Unavailable { attempts: 3, .. }));
        assert!(matches!(context.state(), BrokerState::Failed { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_bounded_wait_while_connecting() {
        let context = BrokerContext::connect(RetryPolicy::fixed(Duration::from_millis(5)), || async {
            Err::<Arc<dyn DurableQueue>, _>(QueueError::ConnectionFailed("refused".to_string()))
        });

        let err = context
            .wait_ready(Duration::from_millis(50))
            .await
            .err().unwrap();
        assert!(matches!(err, BrokerError::NotReady(_)));
        assert!(matches!(context.state(), BrokerState::Connecting { .. }));
    }
}
