//! In-memory durable queue.
//!
//! Behaves like a single-node broker: messages published before anyone consumes
//! wait in the queue, deliveries stay unacknowledged until settled, and
//! [`InMemoryQueue::disconnect`] or a new `consume` call returns unsettled messages
//! to the queue flagged as redelivered.

use futures::StreamExt;
use helpdesk_relay_core::queue::{
    Acknowledger, Delivery, DeliveryInfo, DeliveryStream, DurableQueue, QueueError,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Acknowledged.
    Ack {
        /// Delivery tag
        tag: u64,
    },
    /// Negatively acknowledged.
    Nack {
        /// Delivery tag
        tag: u64,
        /// Whether the message was requeued
        requeue: bool,
    },
}

#[derive(Clone)]
struct Message {
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct Slot {
    pending: VecDeque<Message>,
    consumer: Option<mpsc::UnboundedSender<Result<Delivery, QueueError>>>,
    unacked: BTreeMap<u64, Message>,
    acked: Vec<Vec<u8>>,
    dead_letters: Vec<Vec<u8>>,
    settlements: Vec<Settlement>,
    next_tag: u64,
}

#[derive(Default)]
struct State {
    available: bool,
    failing_nacks: bool,
    declared: BTreeSet<String>,
    slots: BTreeMap<String, Slot>,
}

/// In-memory [`DurableQueue`] with settlement inspection.
#[derive(Clone)]
pub struct InMemoryQueue {
    state: Arc<Mutex<State>>,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    /// Create an empty, reachable queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                available: true,
                ..State::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every broker call fail (or succeed again).
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Make every nack fail, leaving the delivery unsettled (or succeed again).
    ///
    /// Models a dead-letter write that the broker rejects.
    pub fn fail_nacks(&self, failing: bool) {
        self.lock().failing_nacks = failing;
    }

    /// Whether `queue` was declared.
    #[must_use]
    pub fn is_declared(&self, queue: &str) -> bool {
        self.lock().declared.contains(queue)
    }

    /// Bodies acknowledged on `queue`, in order.
    #[must_use]
    pub fn acked(&self, queue: &str) -> Vec<Vec<u8>> {
        self.lock()
            .slots
            .get(queue)
            .map(|slot| slot.acked.clone())
            .unwrap_or_default()
    }

    /// Bodies nacked without requeue on `queue`, in order.
    #[must_use]
    pub fn dead_letters(&self, queue: &str) -> Vec<Vec<u8>> {
        self.lock()
            .slots
            .get(queue)
            .map(|slot| slot.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Every settlement on `queue`, in order.
    #[must_use]
    pub fn settlements(&self, queue: &str) -> Vec<Settlement> {
        self.lock()
            .slots
            .get(queue)
            .map(|slot| slot.settlements.clone())
            .unwrap_or_default()
    }

    /// Deliveries handed out but not settled yet.
    #[must_use]
    pub fn unacked_count(&self, queue: &str) -> usize {
        self.lock()
            .slots
            .get(queue)
            .map_or(0, |slot| slot.unacked.len())
    }

    /// Whether a consumer is attached to `queue`.
    #[must_use]
    pub fn has_consumer(&self, queue: &str) -> bool {
        self.lock()
            .slots
            .get(queue)
            .and_then(|slot| slot.consumer.as_ref())
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Poll until `queue` has at least `count` settlements or `timeout` elapses.
    pub async fn wait_for_settlements(
        &self,
        queue: &str,
        count: usize,
        timeout: Duration,
    ) -> Vec<Settlement> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let settlements = self.settlements(queue);
            if settlements.len() >= count || tokio::time::Instant::now() >= deadline {
                return settlements;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Drop the consumer of `queue` and return unsettled messages to the queue.
    ///
    /// The delivery stream ends; settling an old delivery afterwards fails.
    pub fn disconnect(&self, queue: &str) {
        let mut state = self.lock();
        if let Some(slot) = state.slots.get_mut(queue) {
            Self::end_session(slot);
        }
    }

    fn end_session(slot: &mut Slot) {
        slot.consumer = None;
        let unacked = std::mem::take(&mut slot.unacked);
        for (_, mut message) in unacked.into_iter().rev() {
            message.redelivered = true;
            slot.pending.push_front(message);
        }
    }

    fn deliver(&self, queue: &str, slot: &mut Slot, message: Message) {
        let Some(consumer) = slot.consumer.as_ref().filter(|tx| !tx.is_closed()) else {
            slot.consumer = None;
            slot.pending.push_back(message);
            return;
        };

        slot.next_tag += 1;
        let tag = slot.next_tag;
        let delivery = Delivery::new(
            DeliveryInfo {
                queue: queue.to_string(),
                delivery_tag: tag,
                redelivered: message.redelivered,
            },
            message.body.clone(),
            InMemoryAcker {
                queue: self.clone(),
                name: queue.to_string(),
                tag,
            },
        );

        if consumer.send(Ok(delivery)).is_ok() {
            slot.unacked.insert(tag, message);
        } else {
            slot.consumer = None;
            slot.pending.push_back(message);
        }
    }

    fn settle(&self, name: &str, tag: u64, requeue: Option<bool>) -> Result<(), QueueError> {
        let mut state = self.lock();
        if requeue == Some(false) && state.failing_nacks {
            return Err(QueueError::SettlementFailed {
                queue: name.to_string(),
                reason: "dead-letter write rejected".to_string(),
            });
        }
        let slot = state.slots.entry(name.to_string()).or_default();
        let Some(mut message) = slot.unacked.remove(&tag) else {
            return Err(QueueError::SettlementFailed {
                queue: name.to_string(),
                reason: format!("unknown delivery tag {tag}"),
            });
        };

        match requeue {
            None => {
                slot.settlements.push(Settlement::Ack { tag });
                slot.acked.push(message.body);
            }
            Some(false) => {
                slot.settlements.push(Settlement::Nack {
                    tag,
                    requeue: false,
                });
                slot.dead_letters.push(message.body);
            }
            Some(true) => {
                slot.settlements.push(Settlement::Nack { tag, requeue: true });
                message.redelivered = true;
                self.deliver(name, slot, message);
            }
        }
        Ok(())
    }

    fn unavailable(&self) -> Option<QueueError> {
        (!self.lock().available)
            .then(|| QueueError::ConnectionFailed("in-memory broker unavailable".to_string()))
    }
}

impl DurableQueue for InMemoryQueue {
    fn declare(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        let queue = queue.to_string();
        Box::pin(async move {
            if let Some(e) = self.unavailable() {
                return Err(e);
            }
            let mut state = self.lock();
            state.declared.insert(queue.clone());
            state.slots.entry(queue).or_default();
            Ok(())
        })
    }

    fn publish(
        &self,
        queue: &str,
        body: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        let queue = queue.to_string();
        let body = body.to_vec();
        Box::pin(async move {
            if let Some(e) = self.unavailable() {
                return Err(e);
            }
            let mut state = self.lock();
            let slot = state.slots.entry(queue.clone()).or_default();
            self.deliver(
                &queue,
                slot,
                Message {
                    body,
                    redelivered: false,
                },
            );
            Ok(())
        })
    }

    fn consume(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, QueueError>> + Send + '_>> {
        let queue = queue.to_string();
        Box::pin(async move {
            if let Some(e) = self.unavailable() {
                return Err(e);
            }
            let (tx, mut rx) = mpsc::unbounded_channel();
            {
                let mut state = self.lock();
                let slot = state.slots.entry(queue.clone()).or_default();
                Self::end_session(slot);
                slot.consumer = Some(tx);
                let pending = std::mem::take(&mut slot.pending);
                for message in pending {
                    self.deliver(&queue, slot, message);
                }
            }

            let stream = async_stream::stream! {
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };
            Ok(stream.boxed())
        })
    }
}

struct InMemoryAcker {
    queue: InMemoryQueue,
    name: String,
    tag: u64,
}

impl Acknowledger for InMemoryAcker {
    fn ack(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send>> {
        Box::pin(async move { self.queue.settle(&self.name, self.tag, None) })
    }

    fn nack(
        self: Box<Self>,
        requeue: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send>> {
        Box::pin(async move { self.queue.settle(&self.name, self.tag, Some(requeue)) })
    }
}
