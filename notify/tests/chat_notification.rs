//! End-to-end: chat queue → consumer → dispatcher → mail transport.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use helpdesk_relay_core::event::EventKind;
use helpdesk_relay_core::mail::MailError;
use helpdesk_relay_core::queue::DurableQueue;
use helpdesk_relay_notify::{NotificationDispatcher, NotificationHandler};
use helpdesk_relay_runtime::{BrokerContext, EventConsumer};
use helpdesk_relay_testing::{InMemoryQueue, RecordingMailTransport, Settlement};
use std::sync::Arc;
use std::time::Duration;

const CHAT: &str = "chat-events";
const WAIT: Duration = Duration::from_secs(2);

async fn start(queue: &InMemoryQueue, mail: &RecordingMailTransport) -> helpdesk_relay_runtime::ConsumerHandle {
    let handler = NotificationHandler::new(NotificationDispatcher::new(Arc::new(mail.clone())));
    EventConsumer::builder()
        .broker(BrokerContext::ready(Arc::new(queue.clone())))
        .route_with_fallback(CHAT, EventKind::ChatMessage, Arc::new(handler))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_chat_message_is_mailed_and_acked() {
    let queue = InMemoryQueue::new();
    let mail = RecordingMailTransport::new();
    let consumer = start(&queue, &mail).await;

    queue
        .publish(
            CHAT,
            br#"{"kind":"chat-message","payload":{"email":"a@b.com","mensaje":"hola","sender":"Ana"}}"#,
        )
        .await
        .unwrap();

    let settlements = queue.wait_for_settlements(CHAT, 1, WAIT).await;
    assert!(matches!(settlements.as_slice(), [Settlement::Ack { .. }]));

    let sent = mail.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "a@b.com");
    assert!(!sent[0].subject.is_empty());
    assert!(sent[0].html.contains("hola"));
    assert!(sent[0].html.contains("Ana"));

    consumer.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_flat_legacy_chat_body_is_accepted() {
    let queue = InMemoryQueue::new();
    let mail = RecordingMailTransport::new();
    let consumer = start(&queue, &mail).await;

    queue
        .publish(CHAT, br#"{"email":"a@b.com","mensaje":"hola","sender":"Ana"}"#)
        .await
        .unwrap();

    let settlements = queue.wait_for_settlements(CHAT, 1, WAIT).await;
    assert!(matches!(settlements.as_slice(), [Settlement::Ack { .. }]));
    assert_eq!(mail.sent().len(), 1);

    consumer.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_missing_address_is_dead_lettered_without_sending() {
    let queue = InMemoryQueue::new();
    let mail = RecordingMailTransport::new();
    let consumer = start(&queue, &mail).await;

    queue
        .publish(CHAT, br#"{"kind":"chat-message","payload":{"mensaje":"hola"}}"#)
        .await
        .unwrap();

    let settlements = queue.wait_for_settlements(CHAT, 1, WAIT).await;
    assert!(matches!(
        settlements.as_slice(),
        [Settlement::Nack { requeue: false, .. }]
    ));
    assert_eq!(mail.attempts(), 0);

    consumer.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_transport_outage_nacks_then_recovers() {
    let queue = InMemoryQueue::new();
    let mail = RecordingMailTransport::failing(MailError::Unavailable("smtp down".to_string()));
    let consumer = start(&queue, &mail).await;

    let body = br#"{"kind":"chat-message","payload":{"email":"a@b.com","mensaje":"hola"}}"#;
    queue.publish(CHAT, body).await.unwrap();
    queue.wait_for_settlements(CHAT, 1, WAIT).await;
    assert_eq!(queue.dead_letters(CHAT), vec![body.to_vec()]);

    mail.fail_with(None);
    queue.publish(CHAT, body).await.unwrap();
    let settlements = queue.wait_for_settlements(CHAT, 2, WAIT).await;
    assert!(matches!(settlements[1], Settlement::Ack { .. }));
    assert_eq!(mail.sent().len(), 1);

    consumer.shutdown(WAIT).await.unwrap();
}
