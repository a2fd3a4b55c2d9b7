//! Integration tests for the durable queue consumer
//!
//! Runs `EventConsumer` against the in-memory queue and checks settlement:
//! ack on success, exactly one nack without requeue on failure, poison
//! handling, queue independence and the startup readiness contract.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use helpdesk_relay_core::event::{DomainEvent, EventKind};
use helpdesk_relay_core::queue::DurableQueue;
use helpdesk_relay_runtime::broker::BrokerError;
use helpdesk_relay_runtime::{
    BrokerContext, ConsumerError, EventConsumer, EventHandler, HandlerError, RetryPolicy,
    handler_fn,
};
use helpdesk_relay_testing::{InMemoryQueue, Settlement};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

const CHAT: &str = "chat-events";
const TICKETS: &str = "ticket-events";
const WAIT: Duration = Duration::from_secs(2);

// ============================================================================
// Test Fixtures
// ============================================================================

fn chat_event(text: &str) -> Vec<u8> {
    DomainEvent::from_value(
        EventKind::ChatMessage,
        json!({ "email": "a@b.com", "mensaje": text, "sender": "Ana" }),
    )
    .unwrap()
    .to_vec()
    .unwrap()
}

fn recording_handler() -> (Arc<dyn EventHandler>, Arc<Mutex<Vec<DomainEvent>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler = handler_fn(move |event, _delivery| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(event);
            Ok::<(), HandlerError>(())
        }
    });
    (Arc::new(handler), seen)
}

fn failing_handler() -> Arc<dyn EventHandler> {
    Arc::new(handler_fn(|_event, _delivery| async {
        Err::<(), HandlerError>("smtp down".into())
    }))
}

fn ready(queue: &InMemoryQueue) -> BrokerContext {
    BrokerContext::ready(Arc::new(queue.clone()))
}

// ============================================================================
// Settlement
// ============================================================================

#[tokio::test]
async fn test_successful_handler_acks() {
    let queue = InMemoryQueue::new();
    let (handler, seen) = recording_handler();

    let consumer = EventConsumer::builder()
        .broker(ready(&queue))
        .route(CHAT, handler)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    assert!(queue.is_declared(CHAT));
    queue.publish(CHAT, &chat_event("hola")).await.unwrap();

    let settlements = queue.wait_for_settlements(CHAT, 1, WAIT).await;
    assert!(matches!(settlements.as_slice(), [Settlement::Ack { .. }]));
    assert_eq!(seen.lock().unwrap()[0].text("mensaje").as_deref(), Some("hola"));

    consumer.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_failed_handler_nacks_exactly_once_without_requeue() {
    let queue = InMemoryQueue::new();

    let consumer = EventConsumer::builder()
        .broker(ready(&queue))
        .route(CHAT, failing_handler())
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    queue.publish(CHAT, &chat_event("hola")).await.unwrap();
    queue.wait_for_settlements(CHAT, 1, WAIT).await;
    // Give a wrongly retrying consumer the chance to settle twice.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let settlements = queue.settlements(CHAT);
    assert_eq!(settlements.len(), 1);
    assert!(matches!(
        settlements[0],
        Settlement::Nack { requeue: false, .. }
    ));
    assert!(queue.acked(CHAT).is_empty());
    assert_eq!(queue.dead_letters(CHAT), vec![chat_event("hola")]);

    consumer.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_poison_message_is_dead_lettered_and_consumption_continues() {
    let queue = InMemoryQueue::new();
    let (handler, seen) = recording_handler();

    let consumer = EventConsumer::builder()
        .broker(ready(&queue))
        .route(CHAT, handler)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    queue.publish(CHAT, b"{not json").await.unwrap();
    queue.publish(CHAT, br#"{"kind":"order-placed"}"#).await.unwrap();
    queue.publish(CHAT, &chat_event("after")).await.unwrap();

    let settlements = queue.wait_for_settlements(CHAT, 3, WAIT).await;
    assert!(matches!(
        settlements.as_slice(),
        [
            Settlement::Nack { requeue: false, .. },
            Settlement::Nack { requeue: false, .. },
            Settlement::Ack { .. }
        ]
    ));
    assert_eq!(seen.lock().unwrap().len(), 1);

    consumer.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_panicking_handler_only_fails_its_message() {
    let queue = InMemoryQueue::new();
    let handler = Arc::new(handler_fn(|event: DomainEvent, _delivery| async move {
        if event.text("mensaje").as_deref() == Some("boom") {
            panic!("handler bug");
        }
        Ok::<(), HandlerError>(())
    }));

    let consumer = EventConsumer::builder()
        .broker(ready(&queue))
        .route(CHAT, handler)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    queue.publish(CHAT, &chat_event("boom")).await.unwrap();
    queue.publish(CHAT, &chat_event("fine")).await.unwrap();

    let settlements = queue.wait_for_settlements(CHAT, 2, WAIT).await;
    assert!(matches!(
        settlements.as_slice(),
        [Settlement::Nack { requeue: false, .. }, Settlement::Ack { .. }]
    ));
    assert!(consumer.is_running());

    consumer.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_untagged_body_uses_route_fallback_kind() {
    let queue = InMemoryQueue::new();
    let (handler, seen) = recording_handler();

    let consumer = EventConsumer::builder()
        .broker(ready(&queue))
        .route_with_fallback(CHAT, EventKind::ChatMessage, handler)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    queue
        .publish(CHAT, br#"{"email":"a@b.com","mensaje":"hola","sender":"Ana"}"#)
        .await
        .unwrap();

    queue.wait_for_settlements(CHAT, 1, WAIT).await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].kind, EventKind::ChatMessage);
    assert_eq!(seen[0].text("sender").as_deref(), Some("Ana"));
    drop(seen);

    consumer.shutdown(WAIT).await.unwrap();
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_queues_do_not_block_each_other() {
    let queue = InMemoryQueue::new();
    let gate = Arc::new(Notify::new());
    let gate_in_handler = Arc::clone(&gate);

    let blocked = Arc::new(handler_fn(move |_event, _delivery| {
        let gate = Arc::clone(&gate_in_handler);
        async move {
            gate.notified().await;
            Ok::<(), HandlerError>(())
        }
    }));
    let (fast, _seen) = recording_handler();

    let consumer = EventConsumer::builder()
        .broker(ready(&queue))
        .route(TICKETS, blocked)
        .route(CHAT, fast)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();
    assert_eq!(consumer.worker_count(), 2);

    let ticket = DomainEvent::from_value(EventKind::TicketCreated, json!({ "ticketId": 1 }))
        .unwrap()
        .to_vec()
        .unwrap();
    queue.publish(TICKETS, &ticket).await.unwrap();
    queue.publish(CHAT, &chat_event("hola")).await.unwrap();

    let chat = queue.wait_for_settlements(CHAT, 1, WAIT).await;
    assert!(matches!(chat.as_slice(), [Settlement::Ack { .. }]));
    assert!(queue.settlements(TICKETS).is_empty());

    gate.notify_one();
    let tickets = queue.wait_for_settlements(TICKETS, 1, WAIT).await;
    assert!(matches!(tickets.as_slice(), [Settlement::Ack { .. }]));

    consumer.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_lost_stream_is_consumed_again() {
    let queue = InMemoryQueue::new();
    let (handler, seen) = recording_handler();

    let consumer = EventConsumer::builder()
        .broker(ready(&queue))
        .route(CHAT, handler)
        .reconnect_delay(Duration::from_millis(10))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    queue.publish(CHAT, &chat_event("first")).await.unwrap();
    queue.wait_for_settlements(CHAT, 1, WAIT).await;

    queue.disconnect(CHAT);
    queue.publish(CHAT, &chat_event("second")).await.unwrap();

    let settlements = queue.wait_for_settlements(CHAT, 2, WAIT).await;
    assert_eq!(settlements.len(), 2);
    assert_eq!(seen.lock().unwrap().len(), 2);

    consumer.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_failed_dead_letter_write_is_not_overtaken_by_later_acks() {
    let queue = InMemoryQueue::new();
    let attempts = Arc::new(Mutex::new(0_usize));
    let counter = Arc::clone(&attempts);
    let handler = handler_fn(move |event, _delivery| {
        let counter = Arc::clone(&counter);
        async move {
            if event.text("mensaje").as_deref() == Some("bad") {
                *counter.lock().unwrap() += 1;
                return Err::<(), HandlerError>("template error".into());
            }
            Ok(())
        }
    });

    queue.fail_nacks(true);
    let consumer = EventConsumer::builder()
        .broker(ready(&queue))
        .route(CHAT, Arc::new(handler))
        .reconnect_delay(Duration::from_millis(10))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    queue.publish(CHAT, &chat_event("bad")).await.unwrap();
    queue.publish(CHAT, &chat_event("good")).await.unwrap();

    // The failed message is fetched again instead of being skipped.
    let deadline = tokio::time::Instant::now() + WAIT;
    while *attempts.lock().unwrap() < 2 {
        assert!(tokio::time::Instant::now() < deadline, "message was not redelivered");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(queue.acked(CHAT).is_empty());
    assert!(queue.settlements(CHAT).is_empty());

    queue.fail_nacks(false);
    let settlements = queue.wait_for_settlements(CHAT, 2, WAIT).await;
    assert!(matches!(
        settlements.as_slice(),
        [Settlement::Nack { requeue: false, .. }, Settlement::Ack { .. }]
    ));
    assert_eq!(queue.dead_letters(CHAT), vec![chat_event("bad")]);
    assert_eq!(queue.acked(CHAT), vec![chat_event("good")]);

    consumer.shutdown(WAIT).await.unwrap();
}

// ============================================================================
// Startup
// ============================================================================

#[tokio::test]
async fn test_consumer_never_started_when_broker_stays_down() {
    let broker = BrokerContext::connect(RetryPolicy::fixed(Duration::from_millis(5)), || async {
        Err(helpdesk_relay_core::QueueError::ConnectionFailed(
            "connection refused".to_string(),
        ))
    });
    let (handler, _) = recording_handler();

    let result = EventConsumer::builder()
        .broker(broker)
        .route(CHAT, handler)
        .ready_timeout(Duration::from_millis(50))
        .build()
        .unwrap()
        .start()
        .await;

    assert!(matches!(
        result,
        Err(ConsumerError::NeverStarted(BrokerError::NotReady(_)))
    ));
}

#[tokio::test]
async fn test_consumer_never_started_when_connector_gives_up() {
    let policy = RetryPolicy::builder()
        .max_retries(1)
        .initial_delay(Duration::from_millis(5))
        .build();
    let broker = BrokerContext::connect(policy, || async {
        Err(helpdesk_relay_core::QueueError::ConnectionFailed(
            "connection refused".to_string(),
        ))
    });
    let (handler, _) = recording_handler();

    let result = EventConsumer::builder()
        .broker(broker)
        .route(CHAT, handler)
        .ready_timeout(WAIT)
        .build()
        .unwrap()
        .start()
        .await;

    assert!(matches!(
        result,
        Err(ConsumerError::NeverStarted(BrokerError::Unavailable { attempts: 2, .. }))
    ));
}

#[tokio::test]
async fn test_consumer_starts_once_broker_comes_up() {
    let queue = InMemoryQueue::new();
    let connect_to = queue.clone();
    let attempts = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&attempts);

    let broker = BrokerContext::connect(RetryPolicy::fixed(Duration::from_millis(5)), move || {
        let queue = connect_to.clone();
        let counter = Arc::clone(&counter);
        async move {
            let mut attempts = counter.lock().unwrap();
            *attempts += 1;
            if *attempts < 3 {
                Err(helpdesk_relay_core::QueueError::ConnectionFailed(
                    "starting".to_string(),
                ))
            } else {
                Ok(Arc::new(queue) as Arc<dyn DurableQueue>)
            }
        }
    });
    let (handler, _) = recording_handler();

    let consumer = EventConsumer::builder()
        .broker(broker)
        .route(CHAT, handler)
        .ready_timeout(WAIT)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    assert!(queue.is_declared(CHAT));
    consumer.shutdown(WAIT).await.unwrap();
}
