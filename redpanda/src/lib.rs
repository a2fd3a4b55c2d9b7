//! Durable queue over Redpanda for the helpdesk event relay.
//!
//! Implements [`DurableQueue`] from `helpdesk-relay-core` with rdkafka, so it works
//! against Redpanda, Apache Kafka or any other Kafka-compatible broker.
//!
//! # Mapping
//!
//! ```text
//! queue "chat-events" ──▶ topic "chat-events"
//!                         topic "chat-events.dlq"   (dead letters)
//!
//! declare   create both topics, "already exists" is success
//! publish   produce to the topic, wait for the broker ack
//! consume   one consumer per queue, manual offset commits
//! ack       commit offset + 1 for the message's partition
//! nack      requeue=false: produce to the dead-letter topic, then commit
//!                          (seek back instead if that produce fails)
//!           requeue=true:  seek back to the message's offset
//! ```
//!
//! # Delivery Semantics
//!
//! **At-least-once** with manual commits. Offsets are committed only when the consumer
//! settles a message, and the consumer settles each message before pulling the next,
//! so a commit never covers an unprocessed message. If the process dies before a
//! commit, the message is redelivered to the next member of the consumer group.
//!
//! Kafka carries no redelivery flag, so [`DeliveryInfo::redelivered`] is always `false`
//! for this adapter.
//!
//! # Example
//!
//! ```no_run
//! use helpdesk_relay_core::queue::DurableQueue;
//! use helpdesk_relay_redpanda::RedpandaQueue;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = RedpandaQueue::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("notifications")
//!     .build()?;
//!
//! queue.declare("chat-events").await?;
//! queue.publish("chat-events", br#"{"kind":"chat-message","payload":{}}"#).await?;
//! # Ok(())
//! # }
//! ```

use helpdesk_relay_core::queue::{
    Acknowledger, Delivery, DeliveryInfo, DeliveryStream, DurableQueue, QueueError,
};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{Message, OwnedMessage};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Suffix of the dead-letter topic of each queue.
pub const DEFAULT_DEAD_LETTER_SUFFIX: &str = ".dlq";

/// Durable queue backed by a Kafka-compatible broker.
///
/// Cheap to share: clone the `Arc<dyn DurableQueue>` it is usually wrapped in.
/// The producer is shared by publishes and dead-lettering; every call to
/// [`consume`](DurableQueue::consume) creates its own consumer in the configured group.
pub struct RedpandaQueue {
    producer: FutureProducer,
    admin: AdminClient<DefaultClientContext>,
    brokers: String,
    consumer_group: String,
    dead_letter_suffix: String,
    partitions: i32,
    replication: i32,
    timeout: Duration,
    auto_offset_reset: String,
}

impl RedpandaQueue {
    /// Create a queue client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ConnectionFailed`] if the clients cannot be created.
    pub fn new(brokers: &str) -> Result<Self, QueueError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder.
    #[must_use]
    pub fn builder() -> RedpandaQueueBuilder {
        RedpandaQueueBuilder::default()
    }

    /// Broker addresses.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Consumer group shared by every queue consumed through this client.
    #[must_use]
    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    /// Topic receiving the dead letters of `queue`.
    #[must_use]
    pub fn dead_letter_topic(&self, queue: &str) -> String {
        format!("{queue}{}", self.dead_letter_suffix)
    }

    /// Fetch cluster metadata, proving the brokers are reachable.
    ///
    /// Building the client never touches the network, so this is the readiness
    /// check used when connecting a broker context.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ConnectionFailed`] if no broker answers within the timeout.
    pub async fn probe(&self) -> Result<(), QueueError> {
        let producer = self.producer.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(None, Timeout::After(timeout))
                .map(|_| ())
        })
        .await
        .map_err(|e| QueueError::ConnectionFailed(format!("Metadata task failed: {e}")))?
        .map_err(|e| QueueError::ConnectionFailed(format!("Brokers unreachable: {e}")))
    }

    fn consumer(&self, queue: &str) -> Result<StreamConsumer, QueueError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| QueueError::ConsumeFailed {
                queue: queue.to_string(),
                reason: format!("Failed to create consumer: {e}"),
            })?;

        consumer
            .subscribe(&[queue])
            .map_err(|e| QueueError::ConsumeFailed {
                queue: queue.to_string(),
                reason: format!("Failed to subscribe: {e}"),
            })?;

        Ok(consumer)
    }

    async fn create_topic(&self, topic: &str) -> Result<(), QueueError> {
        let new_topic = NewTopic::new(
            topic,
            self.partitions,
            TopicReplication::Fixed(self.replication),
        );
        let options = AdminOptions::new().operation_timeout(Some(Timeout::After(self.timeout)));

        let results = self
            .admin
            .create_topics(&[new_topic], &options)
            .await
            .map_err(|e| QueueError::DeclareFailed {
                queue: topic.to_string(),
                reason: e.to_string(),
            })?;

        for result in results {
            match result {
                Ok(_) | Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {}
                Err((name, code)) => {
                    return Err(QueueError::DeclareFailed {
                        queue: name,
                        reason: code.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Builder for configuring a [`RedpandaQueue`].
///
/// # Example
///
/// ```no_run
/// use helpdesk_relay_redpanda::RedpandaQueue;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = RedpandaQueue::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .consumer_group("notifications")
///     .dead_letter_suffix(".dead")
///     .replication(3)
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct RedpandaQueueBuilder {
    brokers: Option<String>,
    consumer_group: Option<String>,
    dead_letter_suffix: Option<String>,
    partitions: Option<i32>,
    replication: Option<i32>,
    producer_acks: Option<String>,
    timeout: Option<Duration>,
    auto_offset_reset: Option<String>,
}

impl RedpandaQueueBuilder {
    /// Comma-separated broker addresses (e.g. `"localhost:9092"`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Consumer group id. Instances sharing a group share the work of each queue.
    ///
    /// Default: `"helpdesk-relay"`
    #[must_use]
    pub fn consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = Some(group.into());
        self
    }

    /// Suffix appended to a queue name to get its dead-letter topic.
    ///
    /// Default: `".dlq"`
    #[must_use]
    pub fn dead_letter_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.dead_letter_suffix = Some(suffix.into());
        self
    }

    /// Partitions of declared topics. Default: 1
    #[must_use]
    pub const fn partitions(mut self, partitions: i32) -> Self {
        self.partitions = Some(partitions);
        self
    }

    /// Replication factor of declared topics. Default: 1
    #[must_use]
    pub const fn replication(mut self, replication: i32) -> Self {
        self.replication = Some(replication);
        self
    }

    /// Producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"all"`, a published event must survive a broker restart.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Timeout for produce, admin and seek calls. Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Where a new consumer group starts reading.
    ///
    /// Default: `"earliest"`, so events published before the first consumer
    /// joined are still processed.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaQueue`].
    ///
    /// No network round trip happens here; librdkafka connects lazily.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ConnectionFailed`] if brokers are not set or a client
    /// cannot be created from the configuration.
    pub fn build(self) -> Result<RedpandaQueue, QueueError> {
        let brokers = self
            .brokers
            .ok_or_else(|| QueueError::ConnectionFailed("Brokers not configured".to_string()))?;
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));
        let acks = self.producer_acks.unwrap_or_else(|| "all".to_string());

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", &acks)
            .create()
            .map_err(|e| QueueError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .create()
            .map_err(|e| {
                QueueError::ConnectionFailed(format!("Failed to create admin client: {e}"))
            })?;

        let queue = RedpandaQueue {
            producer,
            admin,
            brokers,
            consumer_group: self
                .consumer_group
                .unwrap_or_else(|| "helpdesk-relay".to_string()),
            dead_letter_suffix: self
                .dead_letter_suffix
                .unwrap_or_else(|| DEFAULT_DEAD_LETTER_SUFFIX.to_string()),
            partitions: self.partitions.unwrap_or(1),
            replication: self.replication.unwrap_or(1),
            timeout,
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "earliest".to_string()),
        };

        tracing::info!(
            brokers = %queue.brokers,
            consumer_group = %queue.consumer_group,
            dead_letter_suffix = %queue.dead_letter_suffix,
            acks = %acks,
            "RedpandaQueue created"
        );

        Ok(queue)
    }
}

impl DurableQueue for RedpandaQueue {
    fn declare(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        let queue = queue.to_string();
        Box::pin(async move {
            self.create_topic(&queue).await?;
            self.create_topic(&self.dead_letter_topic(&queue)).await?;
            tracing::debug!(queue = %queue, "Queue declared");
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
            produce(&self.producer, &queue, &body, self.timeout)
                .await
                .map_err(|reason| QueueError::PublishFailed { queue, reason })
        })
    }

    fn consume(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, QueueError>> + Send + '_>> {
        let queue = queue.to_string();
        Box::pin(async move {
            let consumer = Arc::new(self.consumer(&queue)?);
            let producer = self.producer.clone();
            let dead_letter_topic = self.dead_letter_topic(&queue);
            let timeout = self.timeout;

            tracing::info!(
                queue = %queue,
                consumer_group = %self.consumer_group,
                manual_commit = true,
                "Consuming queue"
            );

            // The stream only calls `recv` when polled, and the consumer polls after
            // settling the previous delivery.
            let stream = async_stream::stream! {
                loop {
                    let received = consumer.recv().await.map(|message| message.detach());
                    match received {
                        Ok(message) => {
                            let body = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
                            let info = DeliveryInfo {
                                queue: queue.clone(),
                                delivery_tag: u64::try_from(message.offset()).unwrap_or_default(),
                                redelivered: false,
                            };
                            let acker = KafkaAcknowledger {
                                consumer: Arc::clone(&consumer),
                                producer: producer.clone(),
                                dead_letter_topic: dead_letter_topic.clone(),
                                message,
                                timeout,
                            };
                            yield Ok(Delivery::new(info, body, acker));
                        }
                        Err(e) => {
                            yield Err(QueueError::TransportError(format!(
                                "Failed to receive from '{queue}': {e}"
                            )));
                            break;
                        }
                    }
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

async fn produce(
    producer: &FutureProducer,
    topic: &str,
    body: &[u8],
    timeout: Duration,
) -> Result<(), String> {
    let record: FutureRecord<'_, (), [u8]> = FutureRecord::to(topic).payload(body);
    match producer.send(record, Timeout::After(timeout)).await {
        Ok((partition, offset)) => {
            tracing::debug!(topic = %topic, partition, offset, "Message produced");
            Ok(())
        }
        Err((e, _)) => {
            tracing::error!(topic = %topic, error = %e, "Failed to produce message");
            Err(e.to_string())
        }
    }
}

/// Settles one Kafka message by committing or moving its partition offset.
struct KafkaAcknowledger {
    consumer: Arc<StreamConsumer>,
    producer: FutureProducer,
    dead_letter_topic: String,
    message: OwnedMessage,
    timeout: Duration,
}

impl KafkaAcknowledger {
    fn settlement_error(&self, e: &KafkaError) -> QueueError {
        QueueError::SettlementFailed {
            queue: self.message.topic().to_string(),
            reason: e.to_string(),
        }
    }

    /// Move the partition back so this message is fetched again.
    fn rewind(&self) -> Result<(), QueueError> {
        self.consumer
            .seek(
                self.message.topic(),
                self.message.partition(),
                Offset::Offset(self.message.offset()),
                Timeout::After(self.timeout),
            )
            .map_err(|e| self.settlement_error(&e))
    }

    fn commit(&self) -> Result<(), QueueError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                self.message.topic(),
                self.message.partition(),
                Offset::Offset(self.message.offset() + 1),
            )
            .map_err(|e| self.settlement_error(&e))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| self.settlement_error(&e))
    }
}

impl Acknowledger for KafkaAcknowledger {
    fn ack(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send>> {
        Box::pin(async move { self.commit() })
    }

    fn nack(
        self: Box<Self>,
        requeue: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send>> {
        Box::pin(async move {
            if requeue {
                return self.rewind();
            }

            let body = self.message.payload().unwrap_or_default();
            if let Err(reason) =
                produce(&self.producer, &self.dead_letter_topic, body, self.timeout).await
            {
                // Without a dead-letter copy the offset must not move past this message.
                if let Err(e) = self.rewind() {
                    tracing::warn!(
                        queue = %self.message.topic(),
                        offset = self.message.offset(),
                        error = %e,
                        "Failed to rewind after dead-letter failure"
                    );
                }
                return Err(QueueError::SettlementFailed {
                    queue: self.message.topic().to_string(),
                    reason: format!("Dead-letter publish failed: {reason}"),
                });
            }

            tracing::warn!(
                queue = %self.message.topic(),
                dead_letter_topic = %self.dead_letter_topic,
                partition = self.message.partition(),
                offset = self.message.offset(),
                "Message dead-lettered"
            );
            self.commit()
        })
    }
}
