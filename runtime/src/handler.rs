//! Event handler trait for queue consumers.
//!
//! A handler only decides success or failure; settlement (ack / nack) is done by
//! the [`EventConsumer`](crate::consumer::EventConsumer) from that outcome.

use async_trait::async_trait;
use helpdesk_relay_core::event::DomainEvent;
use helpdesk_relay_core::queue::DeliveryInfo;
use std::future::Future;

/// Error returned by a handler. Any error dead-letters the message.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Handles decoded events of one queue.
///
/// # Example
///
/// ```rust,ignore
/// struct AuditHandler;
///
/// #[async_trait]
/// impl EventHandler for AuditHandler {
///     async fn handle(&self, event: &DomainEvent, delivery: &DeliveryInfo) -> Result<(), HandlerError> {
///         tracing::info!(kind = %event.kind, queue = %delivery.queue, "audited");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Process one event.
    ///
    /// # Errors
    ///
    /// Any error marks the message as failed; it is nacked without requeue.
    async fn handle(&self, event: &DomainEvent, delivery: &DeliveryInfo) -> Result<(), HandlerError>;
}

/// Handler built from an async closure. See [`handler_fn`].
pub struct FnHandler<F>(F);

/// Wrap an async closure as an [`EventHandler`].
pub const fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(DomainEvent, DeliveryInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(DomainEvent, DeliveryInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, event: &DomainEvent, delivery: &DeliveryInfo) -> Result<(), HandlerError> {
        (self.0)(event.clone(), delivery.clone()).await
    }
}
