//! Integration tests for [`RedisRelayBus`] against a real Redis.
//!
//! Marked `#[ignore]`: they need Docker (testcontainers).
//!
//! ```bash
//! cargo test -p helpdesk-relay-redis --test integration_tests -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use futures::StreamExt;
use helpdesk_relay_core::relay::{NOTIFICATIONS_CHANNEL, RelayBus, RelayMessage};
use helpdesk_relay_redis::RedisRelayBus;
use std::time::Duration;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::redis::{REDIS_PORT, Redis};

async fn start_redis() -> (ContainerAsync<Redis>, String) {
    let redis = Redis::default()
        .start()
        .await
        .expect("Failed to start Redis container");
    let host = redis.get_host().await.expect("Failed to get host");
    let port = redis
        .get_host_port_ipv4(REDIS_PORT)
        .await
        .expect("Failed to get port");
    (redis, format!("redis://{host}:{port}"))
}

#[tokio::test]
#[ignore]
async fn test_published_message_reaches_subscriber() {
    let (_redis, url) = start_redis().await;
    let bus = RedisRelayBus::new(&url).await.unwrap();
    let mut stream = bus.subscribe(NOTIFICATIONS_CHANNEL).await.unwrap();

    let message = RelayMessage::new("notification.new")
        .for_user("u42")
        .with_message("Ticket actualizado");
    bus.publish(NOTIFICATIONS_CHANNEL, &message).await.unwrap();

    let payload = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("Timeout waiting for relay message")
        .expect("Subscription ended");
    assert_eq!(RelayMessage::decode(&payload).unwrap(), message);
}

#[tokio::test]
#[ignore]
async fn test_publish_without_subscribers_succeeds() {
    let (_redis, url) = start_redis().await;
    let bus = RedisRelayBus::new(&url).await.unwrap();

    bus.publish(NOTIFICATIONS_CHANNEL, &RelayMessage::new("notification.new"))
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn test_channels_are_isolated() {
    let (_redis, url) = start_redis().await;
    let bus = RedisRelayBus::new(&url).await.unwrap();
    let mut other = bus.subscribe("other").await.unwrap();

    bus.publish(NOTIFICATIONS_CHANNEL, &RelayMessage::new("notification.new"))
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_millis(300), other.next()).await;
    assert!(received.is_err());
}
