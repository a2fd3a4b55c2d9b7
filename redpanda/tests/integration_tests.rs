//! Integration tests for [`RedpandaQueue`] against a real Kafka broker.
//!
//! Validates declare, publish/consume, ack by offset commit, and dead-lettering
//! on nack.
//!
//! # Running These Tests
//!
//! Marked `#[ignore]`: they need Docker (testcontainers) and take a while to
//! start the broker.
//!
//! ```bash
//! cargo test -p helpdesk-relay-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use futures::StreamExt;
use helpdesk_relay_core::queue::{DeliveryStream, DurableQueue};
use helpdesk_relay_redpanda::RedpandaQueue;
use std::time::Duration;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .start()
        .await
        .expect("Failed to start Kafka container");
    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

/// Declare with retries while the broker finishes starting.
async fn declare_when_ready(queue: &RedpandaQueue, name: &str) {
    for attempt in 1..=60 {
        if queue.declare(name).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(attempt != 60, "Broker never accepted declare of {name}");
    }
}

async fn next_body(stream: &mut DeliveryStream) -> (Vec<u8>, helpdesk_relay_core::Delivery) {
    let delivery = tokio::time::timeout(Duration::from_secs(20), stream.next())
        .await
        .expect("Timeout waiting for delivery")
        .expect("Stream ended")
        .expect("Delivery error");
    (delivery.body().to_vec(), delivery)
}

#[tokio::test]
#[ignore]
async fn test_declare_is_idempotent() {
    let (_kafka, brokers) = start_kafka().await;
    let queue = RedpandaQueue::new(&brokers).unwrap();

    declare_when_ready(&queue, "ticket-events").await;
    queue.declare("ticket-events").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_acked_message_is_not_redelivered() {
    let (_kafka, brokers) = start_kafka().await;
    let queue = RedpandaQueue::builder()
        .brokers(&brokers)
        .consumer_group("ack-test")
        .build()
        .unwrap();
    declare_when_ready(&queue, "chat-events").await;

    queue.publish("chat-events", b"first").await.unwrap();
    queue.publish("chat-events", b"second").await.unwrap();

    let mut stream = queue.consume("chat-events").await.unwrap();
    let (body, delivery) = next_body(&mut stream).await;
    assert_eq!(body, b"first");
    delivery.ack().await.unwrap();
    drop(stream);

    // A new consumer in the same group resumes after the committed offset.
    let mut stream = queue.consume("chat-events").await.unwrap();
    let (body, delivery) = next_body(&mut stream).await;
    assert_eq!(body, b"second");
    delivery.ack().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_nack_without_requeue_dead_letters() {
    let (_kafka, brokers) = start_kafka().await;
    let queue = RedpandaQueue::builder()
        .brokers(&brokers)
        .consumer_group("dlq-test")
        .build()
        .unwrap();
    declare_when_ready(&queue, "chat-events").await;

    queue.publish("chat-events", b"{not json").await.unwrap();

    let mut stream = queue.consume("chat-events").await.unwrap();
    let (_, delivery) = next_body(&mut stream).await;
    delivery.nack(false).await.unwrap();

    let mut dead_letters = queue.consume("chat-events.dlq").await.unwrap();
    let (body, delivery) = next_body(&mut dead_letters).await;
    assert_eq!(body, b"{not json");
    delivery.ack().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_probe_reports_reachability() {
    let (_kafka, brokers) = start_kafka().await;
    let queue = RedpandaQueue::new(&brokers).unwrap();
    declare_when_ready(&queue, "probe-events").await;
    queue.probe().await.unwrap();

    let unreachable = RedpandaQueue::builder()
        .brokers("127.0.0.1:1")
        .timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    assert!(unreachable.probe().await.is_err());
}
