//! Relay fan-out: relay channel → personal rooms.

use crate::protocol::ServerFrame;
use crate::rooms::RoomRegistry;
use helpdesk_relay_core::relay::{RelayBus, RelayMessage};
use helpdesk_relay_runtime::RelaySubscriber;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

/// Process-wide subscription that re-emits relay messages to `user:<targetUserId>`.
///
/// Messages without a target are dropped; there is no global broadcast. Malformed
/// payloads are dropped by the subscriber and never reach a client.
pub struct RelayFanout {
    bus: Arc<dyn RelayBus>,
    channel: String,
    reconnect_delay: Duration,
}

impl RelayFanout {
    /// Fan-out of `channel` on `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn RelayBus>, channel: impl Into<String>) -> Self {
        Self {
            bus,
            channel: channel.into(),
            reconnect_delay: Duration::from_secs(2),
        }
    }

    /// Delay before subscribing again after the subscription was lost.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Start forwarding into `rooms` until `shutdown` fires.
    pub fn spawn(self, rooms: Arc<RoomRegistry>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        RelaySubscriber::new(self.bus, self.channel, shutdown)
            .with_reconnect_delay(self.reconnect_delay)
            .spawn(move |message| {
                forward(&rooms, &message);
            })
    }
}

/// Emit one relay message to its target room. Returns how many connections got it.
pub fn forward(rooms: &RoomRegistry, message: &RelayMessage) -> usize {
    let Some(room) = message.target_room() else {
        debug!(kind = ?message.kind, "Dropping untargeted relay message");
        return 0;
    };

    let delivered = rooms.broadcast(&room, &ServerFrame::notification(message));
    debug!(room = %room, kind = ?message.kind, delivered, "Relay message emitted");
    delivered
}
