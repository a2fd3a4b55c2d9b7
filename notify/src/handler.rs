//! Queue handler wiring the dispatcher (and optionally the relay) to the consumer.

use crate::dispatcher::{NotificationDispatcher, recipient_id};
use crate::templates;
use async_trait::async_trait;
use helpdesk_relay_core::event::DomainEvent;
use helpdesk_relay_core::queue::DeliveryInfo;
use helpdesk_relay_core::relay::{RelayBus, RelayMessage};
use helpdesk_relay_runtime::{EventHandler, HandlerError};
use std::sync::Arc;

/// Relay message type of live notifications.
pub const NOTIFICATION_EVENT: &str = "notification.new";

/// Event handler for the ticket and chat queues.
///
/// For ticket events naming a user, a `notification.new` relay message is published
/// to that user's room first. That publish is best-effort: a failure is logged and
/// never affects the outcome. The email dispatch result alone decides ack or nack.
pub struct NotificationHandler {
    dispatcher: NotificationDispatcher,
    relay: Option<(Arc<dyn RelayBus>, String)>,
}

impl NotificationHandler {
    /// Handler that only dispatches email.
    #[must_use]
    pub const fn new(dispatcher: NotificationDispatcher) -> Self {
        Self {
            dispatcher,
            relay: None,
        }
    }

    /// Also forward ticket events to live connections over `channel`.
    #[must_use]
    pub fn with_relay(mut self, bus: Arc<dyn RelayBus>, channel: impl Into<String>) -> Self {
        self.relay = Some((bus, channel.into()));
        self
    }

    async fn forward_to_relay(&self, event: &DomainEvent) {
        let Some((bus, channel)) = &self.relay else {
            return;
        };
        if !event.kind.is_ticket_event() {
            return;
        }
        let Some(user_id) = recipient_id(event) else {
            return;
        };

        let mut message = RelayMessage::new(NOTIFICATION_EVENT)
            .for_user(user_id.clone())
            .with_payload(event.payload.clone());
        if let Ok(rendered) = templates::render(event) {
            message = message.with_message(rendered.summary);
        }
        message
            .extra
            .insert("kind".to_string(), event.kind.as_str().into());

        match bus.publish(channel, &message).await {
            Ok(()) => tracing::debug!(kind = %event.kind, user_id = %user_id, "Relayed live notification"),
            Err(e) => tracing::warn!(
                kind = %event.kind,
                user_id = %user_id,
                error = %e,
                "Failed to relay live notification"
            ),
        }
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    async fn handle(&self, event: &DomainEvent, delivery: &DeliveryInfo) -> Result<(), HandlerError> {
        self.forward_to_relay(event).await;

        self.dispatcher.dispatch(event).await.map_err(|e| {
            tracing::warn!(
                queue = %delivery.queue,
                delivery_tag = delivery.delivery_tag,
                kind = %event.kind,
                error = %e,
                "Notification dispatch failed"
            );
            HandlerError::from(e)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use helpdesk_relay_core::event::EventKind;
    use helpdesk_relay_core::mail::MailError;
    use helpdesk_relay_testing::{InMemoryRelayBus, RecordingMailTransport, StaticDirectory};
    use serde_json::json;

    fn info() -> DeliveryInfo {
        DeliveryInfo {
            queue: "ticket-events".to_string(),
            delivery_tag: 1,
            redelivered: false,
        }
    }

    fn ticket_created() -> DomainEvent {
        DomainEvent::from_value(
            EventKind::TicketCreated,
            json!({ "ticket": { "id": 9, "titulo": "Impresora", "usuarioCreador": "u42" } }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ticket_event_is_relayed_and_mailed() {
        let mail = RecordingMailTransport::new();
        let bus = InMemoryRelayBus::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(mail.clone()))
            .with_directory(Arc::new(StaticDirectory::new().with("u42", "u42@helpdesk.test")));
        let handler = NotificationHandler::new(dispatcher).with_relay(Arc::new(bus.clone()), "notifications");

        handler.handle(&ticket_created(), &info()).await.unwrap();

        let published = bus.published();
        assert_eq!(published.len(), 1);
        let (channel, message) = &published[0];
        assert_eq!(channel, "notifications");
        assert_eq!(message.kind.as_deref(), Some(NOTIFICATION_EVENT));
        assert_eq!(message.target_user_id.as_deref(), Some("u42"));
        assert_eq!(
            message.message.as_deref(),
            Some("Se ha creado el ticket \"Impresora\" exitosamente.")
        );
        assert_eq!(mail.sent()[0].to, "u42@helpdesk.test");
    }

    #[tokio::test]
    async fn test_chat_events_are_not_relayed() {
        let mail = RecordingMailTransport::new();
        let bus = InMemoryRelayBus::new();
        let handler = NotificationHandler::new(NotificationDispatcher::new(Arc::new(mail.clone())))
            .with_relay(Arc::new(bus.clone()), "notifications");

        let event = DomainEvent::from_value(
            EventKind::ChatMessage,
            json!({ "email": "a@b.com", "mensaje": "hola", "userId": "u42" }),
        )
        .unwrap();
        handler.handle(&event, &info()).await.unwrap();

        assert!(bus.published().is_empty());
        assert_eq!(mail.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_failure_fails_the_handler_even_when_relayed() {
        let mail = RecordingMailTransport::failing(MailError::Unavailable("down".to_string()));
        let bus = InMemoryRelayBus::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(mail.clone()))
            .with_directory(Arc::new(StaticDirectory::new().with("u42", "u42@helpdesk.test")));
        let handler = NotificationHandler::new(dispatcher).with_relay(Arc::new(bus.clone()), "notifications");

        let result = handler.handle(&ticket_created(), &info()).await;

        assert!(result.is_err());
        assert_eq!(bus.published().len(), 1);
    }
}
