//! Gateway wire protocol.
//!
//! **Client → Server** (JSON text frames, tagged by `type`):
//! ```json
//! { "type": "join", "room": "ticket:17" }
//! { "type": "leave", "room": "ticket:17" }
//! { "type": "typing", "room": "ticket:17", "active": true }
//! { "type": "ping" }
//! ```
//!
//! **Server → Client**:
//! ```json
//! { "event": "notification.new", "data": { "targetUserId": "u42", "type": "notification.new", ... } }
//! ```

use helpdesk_relay_core::relay::RelayMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Event names emitted by the gateway.
pub mod events {
    /// A relay message for the connection's user
    pub const NOTIFICATION_NEW: &str = "notification.new";
    /// Confirmation of a `join`
    pub const ROOM_JOINED: &str = "room-joined";
    /// Confirmation of a `leave`
    pub const ROOM_LEFT: &str = "room-left";
    /// Another member of a room started typing
    pub const USER_TYPING: &str = "user-typing";
    /// Another member of a room stopped typing
    pub const USER_TYPING_END: &str = "user-typing-end";
    /// Answer to `ping`
    pub const PONG: &str = "pong";
    /// A frame was refused
    pub const ERROR: &str = "error";
}

/// Control frame sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Enter a room.
    Join {
        /// Room name, e.g. `ticket:17`
        room: String,
    },
    /// Leave a room.
    Leave {
        /// Room name
        room: String,
    },
    /// Typing indicator for the other members of a room.
    Typing {
        /// Room name
        room: String,
        /// `false` ends the indicator
        #[serde(default = "default_active")]
        active: bool,
    },
    /// Keep-alive.
    Ping,
}

const fn default_active() -> bool {
    true
}

/// Frame sent to a client: a named event with a JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerFrame {
    /// Event name, see [`events`]
    pub event: String,
    /// Event body
    pub data: Value,
}

impl ServerFrame {
    /// Frame with an arbitrary event name.
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Relay message forwarded to its target user. The whole message is the body.
    #[must_use]
    pub fn notification(message: &RelayMessage) -> Self {
        Self::new(events::NOTIFICATION_NEW, message.to_value())
    }

    /// `room-joined`.
    #[must_use]
    pub fn room_joined(room: &str) -> Self {
        Self::new(events::ROOM_JOINED, json!({ "room": room, "status": "success" }))
    }

    /// `room-left`.
    #[must_use]
    pub fn room_left(room: &str) -> Self {
        Self::new(events::ROOM_LEFT, json!({ "room": room }))
    }

    /// `user-typing` or `user-typing-end`.
    #[must_use]
    pub fn typing(room: &str, user_id: &str, active: bool) -> Self {
        let event = if active {
            events::USER_TYPING
        } else {
            events::USER_TYPING_END
        };
        Self::new(event, json!({ "room": room, "usuarioId": user_id }))
    }

    /// `pong`.
    #[must_use]
    pub fn pong() -> Self {
        Self::new(events::PONG, Value::Null)
    }

    /// `error` with a machine-readable code.
    #[must_use]
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::new(
            events::ERROR,
            json!({ "code": code, "message": message.into() }),
        )
    }

    /// JSON text of the frame.
    #[must_use]
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
