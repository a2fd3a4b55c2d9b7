//! # Helpdesk Relay Runtime
//!
//! Runtime pieces that move events through the relay.
//!
//! ## Core Components
//!
//! - **Broker context**: owned connection lifecycle with a readiness signal
//! - **Event Consumer**: per-queue workers with ack / nack and dead-lettering
//! - **Event Publisher**: producer-side publishing with retry
//! - **Relay subscriber**: resilient pub/sub subscription with malformed-payload dropping
//!
//! ## Example
//!
//! ```ignore
//! use helpdesk_relay_runtime::{BrokerContext, EventConsumer, RetryPolicy};
//!
//! let broker = BrokerContext::connect(RetryPolicy::fixed(Duration::from_secs(2)), connect);
//!
//! let consumer = EventConsumer::builder()
//!     .broker(broker)
//!     .route("ticket-events", ticket_handler)
//!     .route("chat-events", chat_handler)
//!     .build()?
//!     .start()
//!     .await?;
//! ```

/// Owned broker connection and readiness signal
pub mod broker;

/// Durable queue consumer
pub mod consumer;

/// Handler trait for consumed events
pub mod handler;

/// Prometheus metrics for observability
pub mod metrics;

/// Producer-side event publishing
pub mod publisher;

/// Relay subscription loop
pub mod relay;

/// Retry logic with capped backoff
pub mod retry;

pub use broker::{BrokerContext, BrokerError, BrokerState};
pub use consumer::{ConsumerError, ConsumerHandle, EventConsumer, EventConsumerBuilder};
pub use handler::{EventHandler, HandlerError, handler_fn};
pub use publisher::{EventPublisher, PublishError};
pub use relay::RelaySubscriber;
pub use retry::{RetryError, RetryPolicy};
