//! In-memory relay bus.
//!
//! One `broadcast` channel per relay channel, created lazily. Like the real relay
//! it keeps nothing: a publish with no subscriber is lost.

use futures::StreamExt;
use helpdesk_relay_core::relay::{RelayBus, RelayError, RelayMessage, RelayStream};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// In-memory [`RelayBus`].
#[derive(Clone, Default)]
pub struct InMemoryRelayBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
    published: Arc<Mutex<Vec<(String, RelayMessage)>>>,
}

impl InMemoryRelayBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<String>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish a raw payload, bypassing encoding. Returns the number of receivers.
    pub fn publish_raw(&self, channel: &str, payload: impl Into<String>) -> usize {
        self.sender(channel).send(payload.into()).unwrap_or(0)
    }

    /// Messages published through [`RelayBus::publish`], in order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, RelayMessage)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current number of subscribers on `channel`.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels()
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Poll until `channel` has at least `count` subscribers. Returns whether it did.
    pub async fn wait_for_subscribers(&self, channel: &str, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.subscriber_count(channel) >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.subscriber_count(channel) >= count
    }

    /// End every subscription on `channel`, as if the transport dropped.
    pub fn close(&self, channel: &str) {
        self.channels().remove(channel);
    }
}

impl RelayBus for InMemoryRelayBus {
    fn publish(
        &self,
        channel: &str,
        message: &RelayMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + '_>> {
        let channel = channel.to_string();
        let message = message.clone();
        Box::pin(async move {
            let payload = message.encode()?;
            self.published
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((channel.clone(), message));
            // No subscriber is not an error for a best-effort relay.
            let _ = self.sender(&channel).send(payload);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        channel: &str,
    ) -> Pin<Box<dyn Future<Output = Result<RelayStream, RelayError>> + Send + '_>> {
        let channel = channel.to_string();
        Box::pin(async move {
            let mut rx = self.sender(&channel).subscribe();
            let stream = async_stream::stream! {
                loop {
                    match rx.recv().await {
                        Ok(payload) => yield payload,
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            };
            Ok(stream.boxed())
        })
    }
}
