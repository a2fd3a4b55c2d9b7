//! Relay subscription loop.
//!
//! [`drain`] turns a raw [`RelayStream`] into decoded messages, dropping malformed
//! payloads with a log line. [`RelaySubscriber`] keeps a subscription alive across
//! transport loss.

use crate::consumer::truncate_payload;
use futures::StreamExt;
use helpdesk_relay_core::relay::{RelayBus, RelayMessage, RelayStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const MALFORMED_LOG_LIMIT: usize = 128;

/// Decode every payload of `stream` and pass the valid ones to `on_message`.
///
/// Returns when the stream ends.
pub async fn drain<F>(channel: &str, mut stream: RelayStream, mut on_message: F)
where
    F: FnMut(RelayMessage),
{
    while let Some(payload) = stream.next().await {
        match RelayMessage::decode(&payload) {
            Ok(message) => on_message(message),
            Err(e) => warn!(
                channel,
                error = %e,
                payload = %truncate_payload(payload.as_bytes(), MALFORMED_LOG_LIMIT),
                "Dropping malformed relay payload"
            ),
        }
    }
}

/// Long-lived subscription to one relay channel.
pub struct RelaySubscriber {
    bus: Arc<dyn RelayBus>,
    channel: String,
    shutdown: broadcast::Receiver<()>,
    reconnect_delay: Duration,
}

impl RelaySubscriber {
    /// Subscriber for `channel` that stops on `shutdown`.
    #[must_use]
    pub fn new(
        bus: Arc<dyn RelayBus>,
        channel: impl Into<String>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            bus,
            channel: channel.into(),
            shutdown,
            reconnect_delay: Duration::from_secs(2),
        }
    }

    /// Delay before subscribing again after the subscription was lost.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Run the subscription on a background task.
    pub fn spawn<F>(self, on_message: F) -> JoinHandle<()>
    where
        F: FnMut(RelayMessage) + Send + 'static,
    {
        tokio::spawn(self.run(on_message))
    }

    async fn run<F>(mut self, mut on_message: F)
    where
        F: FnMut(RelayMessage) + Send + 'static,
    {
        loop {
            let subscribed = tokio::select! {
                _ = self.shutdown.recv() => break,
                result = self.bus.subscribe(&self.channel) => result,
            };

            match subscribed {
                Ok(stream) => {
                    info!(channel = %self.channel, "Relay subscription active");
                    tokio::select! {
                        _ = self.shutdown.recv() => break,
                        () = drain(&self.channel, stream, &mut on_message) => warn!(
                            channel = %self.channel,
                            "Relay subscription lost, subscribing again"
                        ),
                    }
                }
                Err(e) => error!(
                    channel = %self.channel,
                    error = %e,
                    retry_delay_ms = self.reconnect_delay.as_millis(),
                    "Relay subscription failed"
                ),
            }

            tokio::select! {
                _ = self.shutdown.recv() => break,
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!(channel = %self.channel, "Relay subscriber stopped");
    }
}
