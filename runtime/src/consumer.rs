//! Durable queue consumer with per-message ack / nack.
//!
//! `EventConsumer` drains one or more named queues, each with its own handler:
//!
//! ```text
//! start():
//!     wait for broker (bounded) ──timeout/give-up──▶ ConsumerError::NeverStarted
//!     declare every queue (idempotent)
//!     spawn one worker per queue
//!
//! worker loop {
//!     consume(queue)
//!     for each delivery (sequential within the queue):
//!         decode ──fail──▶ nack(requeue = false)          poison
//!         handle ──fail──▶ nack(requeue = false)          dead-letter
//!                ──ok────▶ ack
//!     stream lost ──▶ wait reconnect_delay, consume again
//! }
//! ```
//!
//! # Guarantees
//!
//! - Each delivery is settled exactly once: acked on success, nacked without
//!   requeue on failure. A failure never produces an ack.
//! - Deliveries of one queue are settled in order before the next one is handled,
//!   so an acknowledgement never covers an unprocessed message.
//! - Queues run on independent tasks; a slow handler on one queue does not delay
//!   another.
//! - Handlers run on their own task, so a panicking handler only fails its message.

use crate::broker::{BrokerContext, BrokerError};
use crate::handler::EventHandler;
use crate::metrics::{self, Outcome};
use futures::StreamExt;
use helpdesk_relay_core::event::{DomainEvent, EventKind};
use helpdesk_relay_core::queue::{Delivery, DeliveryStream, DurableQueue, QueueError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default bounded wait for the broker at startup.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay before consuming a queue again after its stream was lost.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Default number of payload bytes included in failure logs.
pub const DEFAULT_PAYLOAD_LOG_LIMIT: usize = 256;

/// Errors from the consumer lifecycle.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Builder was missing a required part
    #[error("invalid consumer configuration: {0}")]
    Configuration(String),

    /// The broker never became ready; no queue is being consumed
    #[error("consumer never started: {0}")]
    NeverStarted(#[from] BrokerError),

    /// A queue could not be declared
    #[error("failed to declare queue: {0}")]
    Declare(#[from] QueueError),

    /// Workers did not stop within the shutdown timeout
    #[error("shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Handler registration for one queue.
#[derive(Clone)]
struct QueueRoute {
    handler: Arc<dyn EventHandler>,
    fallback_kind: Option<EventKind>,
}

/// Consumer of a set of named queues.
pub struct EventConsumer {
    broker: BrokerContext,
    routes: BTreeMap<String, QueueRoute>,
    ready_timeout: Duration,
    reconnect_delay: Duration,
    payload_log_limit: usize,
}

impl EventConsumer {
    /// Create a new consumer builder.
    #[must_use]
    pub fn builder() -> EventConsumerBuilder {
        EventConsumerBuilder::default()
    }

    /// Names of the consumed queues.
    #[must_use]
    pub fn queues(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    /// Wait for the broker, declare every queue and start one worker per queue.
    ///
    /// # Errors
    ///
    /// - [`ConsumerError::NeverStarted`] if the broker is not ready in time or the
    ///   connector gave up
    /// - [`ConsumerError::Declare`] if a queue cannot be declared
    pub async fn start(self) -> Result<ConsumerHandle, ConsumerError> {
        info!(
            queues = ?self.queues(),
            timeout_ms = self.ready_timeout.as_millis(),
            "Waiting for broker before consuming"
        );

        let queue = self
            .broker
            .wait_ready(self.ready_timeout)
            .await
            .inspect_err(|e| error!(error = %e, "Event consumer never started"))?;

        for name in self.routes.keys() {
            queue.declare(name).await?;
            debug!(queue = %name, "Queue declared");
        }

        let (shutdown, _) = broadcast::channel(1);
        let tasks = self
            .routes
            .into_iter()
            .map(|(name, route)| {
                let worker = QueueWorker {
                    name,
                    route,
                    queue: Arc::clone(&queue),
                    shutdown: shutdown.subscribe(),
                    reconnect_delay: self.reconnect_delay,
                    payload_log_limit: self.payload_log_limit,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Ok(ConsumerHandle { shutdown, tasks })
    }
}

/// Builder for [`EventConsumer`].
#[derive(Default)]
pub struct EventConsumerBuilder {
    broker: Option<BrokerContext>,
    routes: BTreeMap<String, QueueRoute>,
    ready_timeout: Option<Duration>,
    reconnect_delay: Option<Duration>,
    payload_log_limit: Option<usize>,
}

impl EventConsumerBuilder {
    /// Set the broker context (required).
    #[must_use]
    pub fn broker(mut self, broker: BrokerContext) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Consume `queue` with `handler`. Bodies must carry a `kind` tag.
    #[must_use]
    pub fn route(mut self, queue: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.routes.insert(
            queue.into(),
            QueueRoute {
                handler,
                fallback_kind: None,
            },
        );
        self
    }

    /// Consume `queue` with `handler`; untagged bodies are decoded as `kind`.
    #[must_use]
    pub fn route_with_fallback(
        mut self,
        queue: impl Into<String>,
        kind: EventKind,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        self.routes.insert(
            queue.into(),
            QueueRoute {
                handler,
                fallback_kind: Some(kind),
            },
        );
        self
    }

    /// Bounded wait for the broker at startup.
    #[must_use]
    pub const fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }

    /// Delay before consuming a queue again after its stream was lost.
    #[must_use]
    pub const fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    /// Number of payload bytes included in failure logs. `0` omits payloads.
    #[must_use]
    pub const fn payload_log_limit(mut self, limit: usize) -> Self {
        self.payload_log_limit = Some(limit);
        self
    }

    /// Build the [`EventConsumer`].
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::Configuration`] without a broker or without routes.
    pub fn build(self) -> Result<EventConsumer, ConsumerError> {
        let broker = self
            .broker
            .ok_or_else(|| ConsumerError::Configuration("broker context is required".into()))?;
        if self.routes.is_empty() {
            return Err(ConsumerError::Configuration(
                "at least one queue route is required".into(),
            ));
        }

        Ok(EventConsumer {
            broker,
            routes: self.routes,
            ready_timeout: self.ready_timeout.unwrap_or(DEFAULT_READY_TIMEOUT),
            reconnect_delay: self.reconnect_delay.unwrap_or(DEFAULT_RECONNECT_DELAY),
            payload_log_limit: self.payload_log_limit.unwrap_or(DEFAULT_PAYLOAD_LOG_LIMIT),
        })
    }
}

/// Running consumer.
#[must_use = "dropping the handle stops every queue worker"]
pub struct ConsumerHandle {
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl ConsumerHandle {
    /// Number of queue workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.tasks.len()
    }

    /// Whether any worker is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Signal every worker to stop and wait for them.
    ///
    /// A delivery being handled is settled before its worker stops.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::ShutdownTimeout`] if workers are still running after
    /// `timeout`.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), ConsumerError> {
        let _ = self.shutdown.send(());
        tokio::time::timeout(timeout, futures::future::join_all(self.tasks))
            .await
            .map(|_| ())
            .map_err(|_| ConsumerError::ShutdownTimeout(timeout))
    }
}

enum StreamEnd {
    Shutdown,
    Lost,
}

struct QueueWorker {
    name: String,
    route: QueueRoute,
    queue: Arc<dyn DurableQueue>,
    shutdown: broadcast::Receiver<()>,
    reconnect_delay: Duration,
    payload_log_limit: usize,
}

impl QueueWorker {
    async fn run(mut self) {
        info!(queue = %self.name, "Queue worker started");

        loop {
            let consumed = tokio::select! {
                _ = self.shutdown.recv() => break,
                result = self.queue.consume(&self.name) => result,
            };

            match consumed {
                Ok(stream) => match self.process_stream(stream).await {
                    StreamEnd::Shutdown => break,
                    StreamEnd::Lost => warn!(
                        queue = %self.name,
                        retry_delay_ms = self.reconnect_delay.as_millis(),
                        "Delivery stream lost, consuming again"
                    ),
                },
                Err(e) => error!(
                    queue = %self.name,
                    error = %e,
                    retry_delay_ms = self.reconnect_delay.as_millis(),
                    "Failed to consume queue, retrying"
                ),
            }

            tokio::select! {
                _ = self.shutdown.recv() => break,
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!(queue = %self.name, "Queue worker stopped");
    }

    async fn process_stream(&mut self, mut stream: DeliveryStream) -> StreamEnd {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => return StreamEnd::Shutdown,
                next = stream.next() => match next {
                    Some(Ok(delivery)) => {
                        if !self.process(delivery).await {
                            return StreamEnd::Lost;
                        }
                    }
                    Some(Err(e)) => {
                        error!(queue = %self.name, error = %e, "Delivery stream error");
                        return StreamEnd::Lost;
                    }
                    None => return StreamEnd::Lost,
                },
            }
        }
    }

    /// Handle and settle one delivery. `false` if it could not be settled.
    async fn process(&self, delivery: Delivery) -> bool {
        let info = delivery.info().clone();

        let event = match DomainEvent::decode(delivery.body(), self.route.fallback_kind) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    queue = %info.queue,
                    delivery_tag = info.delivery_tag,
                    error = %e,
                    payload = %truncate_payload(delivery.body(), self.payload_log_limit),
                    "Poison message, dead-lettering"
                );
                return self.settle(delivery, Outcome::Poison).await;
            }
        };

        let kind = event.kind;
        let handler = Arc::clone(&self.route.handler);
        let task_info = info.clone();
        let result =
            tokio::spawn(async move { handler.handle(&event, &task_info).await }).await;

        let outcome = match result {
            Ok(Ok(())) => {
                debug!(queue = %info.queue, kind = %kind, delivery_tag = info.delivery_tag, "Event handled");
                Outcome::Acked
            }
            Ok(Err(e)) => {
                error!(
                    queue = %info.queue,
                    kind = %kind,
                    delivery_tag = info.delivery_tag,
                    redelivered = info.redelivered,
                    error = %e,
                    payload = %truncate_payload(delivery.body(), self.payload_log_limit),
                    "Handler failed, dead-lettering"
                );
                Outcome::Nacked
            }
            Err(e) => {
                error!(
                    queue = %info.queue,
                    kind = %kind,
                    delivery_tag = info.delivery_tag,
                    error = %e,
                    "Handler task failed, dead-lettering"
                );
                Outcome::Nacked
            }
        };

        self.settle(delivery, outcome).await
    }

    /// An unsettled delivery must not be overtaken: a later ack could cover it
    /// (Kafka commits are positional). On failure the stream is given up and the
    /// queue consumed again from the broker's last settled position.
    async fn settle(&self, delivery: Delivery, outcome: Outcome) -> bool {
        let tag = delivery.info().delivery_tag;
        let result = match outcome {
            Outcome::Acked => delivery.ack().await,
            Outcome::Nacked | Outcome::Poison => delivery.nack(false).await,
        };

        match result {
            Ok(()) => {
                metrics::record_settlement(&self.name, outcome);
                true
            }
            Err(e) => {
                error!(
                    queue = %self.name,
                    delivery_tag = tag,
                    outcome = outcome.as_str(),
                    error = %e,
                    "Failed to settle delivery, consuming the queue again"
                );
                false
            }
        }
    }
}

/// Render at most `limit` bytes of a payload for logs, on a char boundary.
#[must_use]
pub fn truncate_payload(body: &[u8], limit: usize) -> String {
    if limit == 0 {
        return format!("<{} bytes omitted>", body.len());
    }

    let text = String::from_utf8_lossy(body);
    if text.len() <= limit {
        return text.into_owned();
    }

    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes total)", &text[..end], body.len())
}
