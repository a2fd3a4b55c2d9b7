//! Notification Dispatcher.
//!
//! `dispatch(event)` renders the template for the event's kind, validates required
//! fields, resolves the recipient address and hands one email to the transport.
//! Failures go back to the caller unchanged; the dispatcher never retries, so the
//! Event Consumer's nack policy decides what happens to the message.

use crate::templates::{self, MissingField};
use helpdesk_relay_core::directory::{DirectoryError, RecipientDirectory};
use helpdesk_relay_core::event::{DomainEvent, EventKind};
use helpdesk_relay_core::mail::{MailError, MailTransport, OutboundEmail};
use helpdesk_relay_runtime::metrics::counter;
use std::sync::Arc;
use thiserror::Error;

/// Payload fields holding a destination address, in priority order.
const EMAIL_FIELDS: &[&[&str]] = &[&["email"], &["correo"], &["ticket", "email"]];

/// Payload fields holding the id of the user to notify, in priority order.
const RECIPIENT_ID_FIELDS: &[&[&str]] = &[
    &["usuarioId"],
    &["userId"],
    &["usuarioCreador"],
    &["ticket", "usuarioCreador"],
];

/// Errors returned by [`NotificationDispatcher::dispatch`].
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A field the notification needs is absent. Permanent for this event.
    #[error("{kind} event is missing required field '{field}'")]
    MissingField {
        /// Event kind
        kind: EventKind,
        /// Missing field name
        field: &'static str,
    },

    /// Recipient lookup failed
    #[error("Recipient lookup failed: {0}")]
    Directory(#[from] DirectoryError),

    /// The transport did not accept the email
    #[error("Mail transport failed: {0}")]
    Transport(#[from] MailError),
}

/// Renders events and sends them through a mail transport.
///
/// Holds only shared handles, so one dispatcher serves concurrent events.
#[derive(Clone)]
pub struct NotificationDispatcher {
    transport: Arc<dyn MailTransport>,
    directory: Option<Arc<dyn RecipientDirectory>>,
}

impl NotificationDispatcher {
    /// Dispatcher sending through `transport`, with addresses taken from payloads only.
    #[must_use]
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self {
            transport,
            directory: None,
        }
    }

    /// Resolve recipient ids through `directory` when the payload carries no address.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn RecipientDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Send the notification for `event`.
    ///
    /// The transport is invoked at most once, and only after every required field
    /// was found.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::MissingField`] if the template or the recipient cannot be
    ///   resolved from the payload
    /// - [`DispatchError::Directory`] if the recipient lookup fails
    /// - [`DispatchError::Transport`] if the send fails
    pub async fn dispatch(&self, event: &DomainEvent) -> Result<(), DispatchError> {
        let rendered = templates::render(event).map_err(|MissingField(field)| {
            DispatchError::MissingField {
                kind: event.kind,
                field,
            }
        })?;

        let to = self.resolve_recipient(event).await.inspect_err(|_| {
            counter!("relay_notify_emails_total", "status" => "rejected").increment(1);
        })?;

        let email = OutboundEmail {
            to,
            subject: rendered.subject,
            html: rendered.html,
        };

        match self.transport.send(&email).await {
            Ok(()) => {
                counter!("relay_notify_emails_total", "status" => "sent").increment(1);
                tracing::info!(kind = %event.kind, subject = %email.subject, "Notification sent");
                Ok(())
            }
            Err(e) => {
                counter!("relay_notify_emails_total", "status" => "failed").increment(1);
                Err(e.into())
            }
        }
    }

    async fn resolve_recipient(&self, event: &DomainEvent) -> Result<String, DispatchError> {
        if let Some(address) = event.first_text(EMAIL_FIELDS) {
            return Ok(address);
        }

        let missing = DispatchError::MissingField {
            kind: event.kind,
            field: "email",
        };

        let (Some(directory), Some(user_id)) = (&self.directory, recipient_id(event)) else {
            return Err(missing);
        };

        match directory.email_for(&user_id).await? {
            Some(address) => {
                tracing::debug!(kind = %event.kind, user_id = %user_id, "Recipient resolved");
                Ok(address)
            }
            None => {
                tracing::warn!(kind = %event.kind, user_id = %user_id, "Recipient has no address");
                Err(missing)
            }
        }
    }
}

/// Id of the user an event is about, if the payload names one.
#[must_use]
pub fn recipient_id(event: &DomainEvent) -> Option<String> {
    event.first_text(RECIPIENT_ID_FIELDS)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use helpdesk_relay_testing::{RecordingMailTransport, StaticDirectory};
    use serde_json::json;

    fn event(kind: EventKind, payload: serde_json::Value) -> DomainEvent {
        DomainEvent::from_value(kind, payload).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_sends_exactly_once_to_payload_address() {
        let mail = RecordingMailTransport::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(mail.clone()));

        dispatcher
            .dispatch(&event(
                EventKind::ChatMessage,
                json!({ "email": "a@b.com", "mensaje": "hola", "sender": "Ana" }),
            ))
            .await
            .unwrap();

        let sent = mail.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@b.com");
        assert!(!sent[0].subject.is_empty());
        assert!(sent[0].html.contains("hola"));
    }

    #[tokio::test]
    async fn test_correo_field_is_accepted() {
        let mail = RecordingMailTransport::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(mail.clone()));

        dispatcher
            .dispatch(&event(EventKind::ChatMessage, json!({ "correo": "c@d.com" })))
            .await
            .unwrap();

        assert_eq!(mail.sent()[0].to, "c@d.com");
    }

    #[tokio::test]
    async fn test_missing_address_fails_without_sending() {
        let mail = RecordingMailTransport::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(mail.clone()));

        let result = dispatcher
            .dispatch(&event(EventKind::ChatMessage, json!({ "mensaje": "hola" })))
            .await;

        assert!(matches!(
            result,
            Err(DispatchError::MissingField { field: "email", .. })
        ));
        assert_eq!(mail.attempts(), 0);
    }

    #[tokio::test]
    async fn test_missing_ticket_id_fails_before_lookup() {
        let mail = RecordingMailTransport::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(mail.clone()))
            .with_directory(Arc::new(StaticDirectory::unavailable()));

        let result = dispatcher
            .dispatch(&event(EventKind::TicketCreated, json!({ "usuarioCreador": "u1" })))
            .await;

        assert!(matches!(
            result,
            Err(DispatchError::MissingField { field: "ticketId", .. })
        ));
        assert_eq!(mail.attempts(), 0);
    }

    #[tokio::test]
    async fn test_recipient_id_is_resolved_through_directory() {
        let mail = RecordingMailTransport::new();
        let directory = StaticDirectory::new().with("u1", "u1@helpdesk.test");
        let dispatcher =
            NotificationDispatcher::new(Arc::new(mail.clone())).with_directory(Arc::new(directory));

        dispatcher
            .dispatch(&event(
                EventKind::TicketCreated,
                json!({ "ticket": { "id": 5, "titulo": "VPN", "usuarioCreador": "u1" } }),
            ))
            .await
            .unwrap();

        let sent = mail.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "u1@helpdesk.test");
        assert_eq!(sent[0].subject, "Nuevo ticket creado - #5");
    }

    #[tokio::test]
    async fn test_unknown_recipient_is_missing_field() {
        let mail = RecordingMailTransport::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(mail.clone()))
            .with_directory(Arc::new(StaticDirectory::new()));

        let result = dispatcher
            .dispatch(&event(EventKind::TicketAssigned, json!({ "ticketId": 5, "userId": "ghost" })))
            .await;

        assert!(matches!(result, Err(DispatchError::MissingField { .. })));
        assert_eq!(mail.attempts(), 0);
    }

    #[tokio::test]
    async fn test_directory_failure_is_surfaced() {
        let mail = RecordingMailTransport::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(mail.clone()))
            .with_directory(Arc::new(StaticDirectory::unavailable()));

        let result = dispatcher
            .dispatch(&event(EventKind::TicketAssigned, json!({ "ticketId": 5, "userId": "u1" })))
            .await;

        assert!(matches!(result, Err(DispatchError::Directory(_))));
        assert_eq!(mail.attempts(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_is_surfaced_without_retry() {
        let mail = RecordingMailTransport::failing(MailError::SendFailed("421".to_string()));
        let dispatcher = NotificationDispatcher::new(Arc::new(mail.clone()));

        let result = dispatcher
            .dispatch(&event(EventKind::ChatMessage, json!({ "email": "a@b.com" })))
            .await;

        assert!(matches!(result, Err(DispatchError::Transport(MailError::SendFailed(_)))));
        assert_eq!(mail.attempts(), 1);
        assert!(mail.sent().is_empty());
    }

    #[test]
    fn test_recipient_id_priority() {
        let event = event(
            EventKind::TicketCreated,
            json!({ "userId": "u2", "usuarioId": "u1", "ticket": { "usuarioCreador": "u3" } }),
        );
        assert_eq!(recipient_id(&event).as_deref(), Some("u1"));
    }
}
