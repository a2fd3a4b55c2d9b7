//! Redis pub/sub relay bus for the helpdesk event relay.
//!
//! Implements [`RelayBus`] from `helpdesk-relay-core` on top of Redis `PUBLISH` /
//! `SUBSCRIBE`. Redis pub/sub has exactly the relay's guarantees: best-effort,
//! at-most-once, no persistence, and a message published while nobody is
//! subscribed is gone.
//!
//! # Connections
//!
//! - **Publishing** goes through a `ConnectionManager`, which reconnects on its own.
//! - **Each subscription** opens a dedicated pub/sub connection. When that connection
//!   drops the [`RelayStream`] ends; re-subscribing is the caller's job (the runtime's
//!   `RelaySubscriber` does it with a delay).
//!
//! # Example
//!
//! ```no_run
//! use helpdesk_relay_core::relay::{RelayBus, RelayMessage, NOTIFICATIONS_CHANNEL};
//! use helpdesk_relay_redis::RedisRelayBus;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = RedisRelayBus::new("redis://127.0.0.1:6379").await?;
//!
//! let message = RelayMessage::new("notification.new")
//!     .for_user("u42")
//!     .with_message("Ticket actualizado");
//! bus.publish(NOTIFICATIONS_CHANNEL, &message).await?;
//! # Ok(())
//! # }
//! ```

use futures::StreamExt;
use helpdesk_relay_core::relay::{RelayBus, RelayError, RelayMessage, RelayStream};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::pin::Pin;

/// Redis-backed [`RelayBus`].
///
/// `Clone` shares the same publishing connection.
#[derive(Clone)]
pub struct RedisRelayBus {
    client: Client,
    publisher: ConnectionManager,
}

impl RedisRelayBus {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - e.g. `redis://127.0.0.1:6379`, `redis://:password@host:6379/0`,
    ///   or `rediss://` for TLS
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConnectionFailed`] if the URL is malformed or the first
    /// connection cannot be established.
    pub async fn new(redis_url: &str) -> Result<Self, RelayError> {
        let client = Client::open(redis_url).map_err(|e| {
            RelayError::ConnectionFailed(format!("Failed to create Redis client: {e}"))
        })?;

        let publisher = ConnectionManager::new(client.clone()).await.map_err(|e| {
            RelayError::ConnectionFailed(format!(
                "Failed to create Redis connection manager: {e}"
            ))
        })?;

        tracing::info!("RedisRelayBus connected");

        Ok(Self { client, publisher })
    }
}

impl RelayBus for RedisRelayBus {
    fn publish(
        &self,
        channel: &str,
        message: &RelayMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + '_>> {
        let channel = channel.to_string();
        let payload = message.encode();
        let mut conn = self.publisher.clone();

        Box::pin(async move {
            let payload = payload?;
            let receivers: i64 = conn.publish(&channel, payload).await.map_err(|e| {
                RelayError::PublishFailed {
                    channel: channel.clone(),
                    reason: e.to_string(),
                }
            })?;

            tracing::debug!(channel = %channel, receivers, "Relay message published");
            Ok(())
        })
    }

    fn subscribe(
        &self,
        channel: &str,
    ) -> Pin<Box<dyn Future<Output = Result<RelayStream, RelayError>> + Send + '_>> {
        let channel = channel.to_string();

        Box::pin(async move {
            let subscription_error = |e: redis::RedisError| RelayError::SubscriptionFailed {
                channel: channel.clone(),
                reason: e.to_string(),
            };

            let mut pubsub = self
                .client
                .get_async_pubsub()
                .await
                .map_err(subscription_error)?;
            pubsub
                .subscribe(&channel)
                .await
                .map_err(subscription_error)?;

            tracing::info!(channel = %channel, "Subscribed to relay channel");

            let stream = pubsub.into_on_message().filter_map(move |msg| {
                let payload = match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        tracing::warn!(
                            channel = %msg.get_channel_name(),
                            error = %e,
                            "Dropping non-UTF-8 relay payload"
                        );
                        None
                    }
                };
                futures::future::ready(payload)
            });

            Ok(stream.boxed())
        })
    }
}
