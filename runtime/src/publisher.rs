//! Event publisher for producer services.
//!
//! Serializes a [`DomainEvent`] and publishes it to a named durable queue, waiting
//! for the broker and retrying transient failures.

use crate::broker::{BrokerContext, BrokerError};
use crate::retry::{RetryError, RetryPolicy, retry_with_backoff};
use helpdesk_relay_core::event::DomainEvent;
use helpdesk_relay_core::queue::QueueError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from publishing an event.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The event could not be serialized
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker was not available in time
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Every publish attempt failed
    #[error("publish failed: {0}")]
    Exhausted(#[from] RetryError<QueueError>),
}

/// Publishes domain events to durable queues.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    broker: BrokerContext,
    retry: RetryPolicy,
    ready_timeout: Duration,
}

impl EventPublisher {
    /// Publisher with 5 attempts 2 seconds apart and a 10 second readiness wait.
    #[must_use]
    pub fn new(broker: BrokerContext) -> Self {
        Self {
            broker,
            retry: RetryPolicy::builder()
                .max_retries(4)
                .initial_delay(Duration::from_secs(2))
                .multiplier(1.0)
                .build(),
            ready_timeout: Duration::from_secs(10),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Override the readiness wait.
    #[must_use]
    pub const fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Declare `queue` and publish `event` to it.
    ///
    /// # Errors
    ///
    /// Returns a [`PublishError`] if the event cannot be serialized, the broker is
    /// not ready, or every attempt fails.
    pub async fn publish(&self, queue: &str, event: &DomainEvent) -> Result<(), PublishError> {
        let body = Arc::new(event.to_vec()?);
        let broker = self.broker.wait_ready(self.ready_timeout).await?;

        retry_with_backoff(self.retry.clone(), || {
            let broker = Arc::clone(&broker);
            let body = Arc::clone(&body);
            let queue = queue.to_string();
            async move {
                broker.declare(&queue).await?;
                broker.publish(&queue, &body).await
            }
        })
        .await?;

        debug!(queue, kind = %event.kind, bytes = body.len(), "Event published");
        Ok(())
    }
}
