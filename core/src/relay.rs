//! Pub/sub relay messages for live, best-effort delivery.
//!
//! The relay is independent of the durable queue. Messages exist only in transit:
//! nothing is persisted or replayed, and a message published while nobody is
//! subscribed is simply lost.
//!
//! Wire form (UTF-8 JSON), one channel per concern:
//!
//! ```json
//! { "targetUserId": "u42", "type": "notification.new", "message": "Ticket actualizado" }
//! ```
//!
//! Only `targetUserId` decides delivery. `type` is optional, and fields other than
//! the known ones are preserved as-is, so producers can publish a whole stored
//! notification (`tipo`, `titulo`, `mensaje`, ...) and the client gets it verbatim.

use crate::principal::user_room;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Channel carrying user-targeted notifications.
pub const NOTIFICATIONS_CHANNEL: &str = "notifications";

/// Errors that can occur on the relay.
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    /// Failed to connect to the relay transport
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish on a channel
    #[error("Publish failed on channel '{channel}': {reason}")]
    PublishFailed {
        /// The channel that failed
        channel: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to a channel
    #[error("Subscription failed on channel '{channel}': {reason}")]
    SubscriptionFailed {
        /// The channel that failed
        channel: String,
        /// The reason for failure
        reason: String,
    },

    /// Payload is not a valid relay message
    #[error("Malformed relay payload: {0}")]
    Malformed(String),
}

/// A message on the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    /// User whose room should receive the message. `None` means no targeted delivery.
    #[serde(
        rename = "targetUserId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub target_user_id: Option<String>,

    /// Message type, e.g. `notification.new`. Delivery never depends on it.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Human readable text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Structured data for the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,

    /// Any other fields, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RelayMessage {
    /// Create an untargeted message of the given type.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            target_user_id: None,
            kind: Some(kind.into()),
            message: None,
            payload: None,
            extra: Map::new(),
        }
    }

    /// Target the room of a user.
    #[must_use]
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.target_user_id = Some(user_id.into());
        self
    }

    /// Attach a human readable text.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach structured data.
    #[must_use]
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Room that should receive this message, if it is targeted.
    ///
    /// A blank `targetUserId` counts as absent.
    #[must_use]
    pub fn target_room(&self) -> Option<String> {
        self.target_user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(user_room)
    }

    /// Parse a raw relay payload.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Malformed`] if the payload is not a relay message.
    pub fn decode(payload: &str) -> Result<Self, RelayError> {
        serde_json::from_str(payload).map_err(|e| RelayError::Malformed(e.to_string()))
    }

    /// Serialize to the wire form.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Malformed`] if a field cannot be serialized.
    pub fn encode(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::Malformed(e.to_string()))
    }

    /// The message as a JSON value, as emitted to clients.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Stream of raw payloads received on a channel.
pub type RelayStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Trait for relay implementations.
///
/// Best-effort and at-most-once. Subscribers get raw payloads and decode them
/// themselves so that a malformed payload only costs that one message.
pub trait RelayBus: Send + Sync {
    /// Publish a message on a channel.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::PublishFailed`] if the transport rejects the message.
    fn publish(
        &self,
        channel: &str,
        message: &RelayMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + '_>>;

    /// Subscribe to a channel.
    ///
    /// The stream ends when the underlying subscription is lost.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::SubscriptionFailed`] if the subscription cannot be set up.
    fn subscribe(
        &self,
        channel: &str,
    ) -> Pin<Box<dyn Future<Output = Result<RelayStream, RelayError>> + Send + '_>>;
}
