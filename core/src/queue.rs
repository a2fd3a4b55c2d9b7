//! Durable queue abstraction with per-message acknowledgement.
//!
//! The broker itself is external. This module defines the seam the Event Consumer
//! and Event Publisher talk to:
//!
//! ```text
//! Producer ──publish──▶ [ queue ] ──consume──▶ Delivery ──▶ handler
//!                                                 │
//!                                     ┌───────────┴───────────┐
//!                                     ▼                       ▼
//!                                ack (remove)      nack (dead-letter or requeue)
//! ```
//!
//! # Settlement
//!
//! [`Delivery::ack`] and [`Delivery::nack`] take the delivery by value, so a message
//! is settled at most once by construction. A delivery dropped without settlement
//! stays unacknowledged on the broker and is redelivered to the next consumer.
//!
//! # Implementations
//!
//! - `RedpandaQueue` in `helpdesk-relay-redpanda` (Kafka-compatible brokers)
//! - `InMemoryQueue` in `helpdesk-relay-testing`

use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during queue operations.
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to declare a queue
    #[error("Declare failed for queue '{queue}': {reason}")]
    DeclareFailed {
        /// The queue that failed
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to publish a message
    #[error("Publish failed for queue '{queue}': {reason}")]
    PublishFailed {
        /// The queue that failed
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to start consuming a queue
    #[error("Consume failed for queue '{queue}': {reason}")]
    ConsumeFailed {
        /// The queue that failed
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to ack or nack a delivery
    #[error("Settlement failed for queue '{queue}': {reason}")]
    SettlementFailed {
        /// The queue of the delivery
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Delivery metadata attached by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryInfo {
    /// Queue the message was consumed from.
    pub queue: String,
    /// Broker-assigned tag, unique within the queue's consumer session.
    pub delivery_tag: u64,
    /// Whether the broker reports this message as delivered before.
    pub redelivered: bool,
}

/// Broker-side settlement of a single delivery.
///
/// Implemented by each queue adapter. Methods consume the boxed acknowledger so
/// it cannot be reused.
pub trait Acknowledger: Send {
    /// Remove the message permanently from the queue.
    fn ack(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send>>;

    /// Reject the message. With `requeue == false` the message goes to the
    /// queue's dead-letter destination.
    fn nack(
        self: Box<Self>,
        requeue: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send>>;
}

/// A message handed to a consumer, owned until it is settled.
pub struct Delivery {
    info: DeliveryInfo,
    body: Vec<u8>,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    /// Create a delivery from its metadata, body, and broker acknowledger.
    #[must_use]
    pub fn new(info: DeliveryInfo, body: Vec<u8>, acker: impl Acknowledger + 'static) -> Self {
        Self {
            info,
            body,
            acker: Box::new(acker),
        }
    }

    /// Delivery metadata.
    #[must_use]
    pub const fn info(&self) -> &DeliveryInfo {
        &self.info
    }

    /// Raw message body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Acknowledge the message.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SettlementFailed`] if the broker rejects the ack.
    pub async fn ack(self) -> Result<(), QueueError> {
        self.acker.ack().await
    }

    /// Negatively acknowledge the message.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SettlementFailed`] if the broker rejects the nack.
    pub async fn nack(self, requeue: bool) -> Result<(), QueueError> {
        self.acker.nack(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("info", &self.info)
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

/// Stream of deliveries from one queue.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, QueueError>> + Send>>;

/// Trait for durable queue implementations.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the queue can be shared as
/// `Arc<dyn DurableQueue>` between the consumer tasks of every queue in a process.
/// Handlers never receive the queue itself, only their [`Delivery`].
pub trait DurableQueue: Send + Sync {
    /// Declare a durable queue. Safe to call when the queue already exists.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::DeclareFailed`] if the broker refuses the declaration.
    fn declare(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>>;

    /// Publish a message body to a queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::PublishFailed`] if the message is not accepted.
    fn publish(
        &self,
        queue: &str,
        body: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>>;

    /// Start consuming a queue with manual acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ConsumeFailed`] if the consumer cannot be created.
    fn consume(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, QueueError>> + Send + '_>>;
}
