//! Domain events carried by the durable queue.
//!
//! A [`DomainEvent`] is published by a producer service at the moment of a state
//! change and consumed by the notification service. On the wire it is UTF-8 JSON:
//!
//! ```json
//! { "kind": "chat-message", "payload": { "email": "a@b.com", "mensaje": "hola", "sender": "Ana" } }
//! ```
//!
//! Older producers publish the payload object directly, without the `kind` tag.
//! A queue that carries only one kind of event can declare it as the fallback kind
//! and [`DomainEvent::decode`] then treats the whole object as the payload.
//!
//! Events are never mutated after creation; consumers only read fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind-specific event fields, keyed by field name.
pub type Payload = Map<String, Value>;

/// Enumerated event kinds, kebab-case on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A ticket was opened.
    TicketCreated,
    /// A ticket was assigned to an agent.
    TicketAssigned,
    /// A ticket moved to another status.
    TicketStatusChanged,
    /// A chat message was sent on a ticket conversation.
    ChatMessage,
}

impl EventKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TicketCreated => "ticket-created",
            Self::TicketAssigned => "ticket-assigned",
            Self::TicketStatusChanged => "ticket-status-changed",
            Self::ChatMessage => "chat-message",
        }
    }

    /// Whether the event concerns a ticket (as opposed to a chat message).
    #[must_use]
    pub const fn is_ticket_event(self) -> bool {
        matches!(
            self,
            Self::TicketCreated | Self::TicketAssigned | Self::TicketStatusChanged
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ticket-created" => Ok(Self::TicketCreated),
            "ticket-assigned" => Ok(Self::TicketAssigned),
            "ticket-status-changed" => Ok(Self::TicketStatusChanged),
            "chat-message" => Ok(Self::ChatMessage),
            other => Err(DecodeError::UnknownKind(other.to_string())),
        }
    }
}

/// Errors produced while decoding a queue message body.
///
/// Every variant marks the message as poison: it can never be decoded, however
/// many times it is redelivered. Error messages never include the body itself.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Body is not UTF-8 JSON.
    #[error("body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Body is valid JSON but not an object.
    #[error("body is not a JSON object")]
    NotAnObject,

    /// No `kind` tag and the queue declares no fallback kind.
    #[error("event has no kind and the queue declares no fallback")]
    MissingKind,

    /// `kind` is present but not one of the known kinds.
    #[error("unknown event kind '{0}'")]
    UnknownKind(String),

    /// `payload` is present but not an object.
    #[error("event payload is not a JSON object")]
    PayloadNotAnObject,
}

/// A tagged domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// What happened.
    pub kind: EventKind,
    /// Kind-specific fields.
    #[serde(default)]
    pub payload: Payload,
}

impl DomainEvent {
    /// Create an event from a kind and its payload.
    #[must_use]
    pub const fn new(kind: EventKind, payload: Payload) -> Self {
        Self { kind, payload }
    }

    /// Create an event from a JSON value, keeping only object payloads.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::PayloadNotAnObject`] if `payload` is not an object.
    pub fn from_value(kind: EventKind, payload: Value) -> Result<Self, DecodeError> {
        match payload {
            Value::Object(payload) => Ok(Self::new(kind, payload)),
            _ => Err(DecodeError::PayloadNotAnObject),
        }
    }

    /// Decode a queue message body.
    ///
    /// Tagged bodies (`{ "kind", "payload" }`) always win. Untagged objects are
    /// accepted only when `fallback` is set.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for any body that cannot become an event.
    pub fn decode(body: &[u8], fallback: Option<EventKind>) -> Result<Self, DecodeError> {
        let Value::Object(mut object) = serde_json::from_slice::<Value>(body)? else {
            return Err(DecodeError::NotAnObject);
        };

        match object.remove("kind") {
            Some(Value::String(kind)) => {
                let kind = kind.parse()?;
                let payload = match object.remove("payload") {
                    Some(Value::Object(payload)) => payload,
                    None | Some(Value::Null) => Map::new(),
                    Some(_) => return Err(DecodeError::PayloadNotAnObject),
                };
                Ok(Self::new(kind, payload))
            }
            Some(other) => Err(DecodeError::UnknownKind(other.to_string())),
            None => fallback
                .map(|kind| Self::new(kind, object))
                .ok_or(DecodeError::MissingKind),
        }
    }

    /// Serialize to the tagged wire form.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the payload cannot be serialized.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Text value of a top-level payload field.
    ///
    /// See [`text_at`](Self::text_at).
    #[must_use]
    pub fn text(&self, field: &str) -> Option<String> {
        self.text_at(&[field])
    }

    /// Text value at a nested path of payload objects.
    ///
    /// Strings are returned when non-blank, numbers are rendered. Any other value,
    /// or a missing segment, yields `None`.
    #[must_use]
    pub fn text_at(&self, path: &[&str]) -> Option<String> {
        let (last, parents) = path.split_last()?;
        let mut object = &self.payload;
        for segment in parents {
            object = object.get(*segment)?.as_object()?;
        }
        match object.get(*last)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// First non-blank text among several candidate paths.
    #[must_use]
    pub fn first_text(&self, paths: &[&[&str]]) -> Option<String> {
        paths.iter().find_map(|path| self.text_at(path))
    }
}
