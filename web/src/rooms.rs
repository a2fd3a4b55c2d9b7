//! Room registry: which live connections receive which broadcasts.
//!
//! Every connection owns a bounded outbound queue. Broadcasts take a snapshot of
//! the room's members and `try_send` to each, so a slow client only loses its own
//! frames and never stalls the relay fan-out or other clients.

use crate::protocol::ServerFrame;
use dashmap::DashMap;
use helpdesk_relay_runtime::metrics::{counter, gauge};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Identifier of one live connection.
pub type ConnectionId = Uuid;

/// Default capacity of a connection's outbound queue.
pub const DEFAULT_CONNECTION_BUFFER: usize = 64;

struct Connection {
    sender: mpsc::Sender<String>,
    rooms: HashSet<String>,
}

/// Live connections and their room memberships.
///
/// # Example
///
/// ```ignore
/// let registry = RoomRegistry::new();
/// let (id, mut outbound) = registry.connect();
/// registry.join(id, "user:u42");
///
/// registry.broadcast("user:u42", &ServerFrame::pong());
/// assert!(outbound.recv().await.is_some());
/// ```
pub struct RoomRegistry {
    connections: DashMap<ConnectionId, Connection>,
    rooms: DashMap<String, HashSet<ConnectionId>>,
    buffer: usize,
}

impl RoomRegistry {
    /// Registry with the default per-connection buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_CONNECTION_BUFFER)
    }

    /// Registry whose connections queue at most `buffer` outbound frames.
    #[must_use]
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Register a new connection. The receiver yields the JSON text of every frame
    /// addressed to it.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.buffer);
        self.connections.insert(
            id,
            Connection {
                sender,
                rooms: HashSet::new(),
            },
        );
        self.record_connections();
        (id, receiver)
    }

    /// Remove a connection from every room it joined.
    pub fn disconnect(&self, id: ConnectionId) {
        let Some((_, connection)) = self.connections.remove(&id) else {
            return;
        };
        for room in &connection.rooms {
            self.remove_member(room, id);
        }
        self.record_connections();
    }

    /// Add a connection to `room`. Returns `false` for an unknown connection.
    ///
    /// The room entry is written while the connection entry is held, so a
    /// concurrent [`disconnect`](Self::disconnect) always sees the new room.
    pub fn join(&self, id: ConnectionId, room: &str) -> bool {
        let Some(mut connection) = self.connections.get_mut(&id) else {
            return false;
        };
        connection.rooms.insert(room.to_string());
        self.rooms.entry(room.to_string()).or_default().insert(id);
        true
    }

    /// Remove a connection from `room`. Returns whether it was a member.
    pub fn leave(&self, id: ConnectionId, room: &str) -> bool {
        let Some(mut connection) = self.connections.get_mut(&id) else {
            return false;
        };
        let was_member = connection.rooms.remove(room);
        if was_member {
            self.remove_member(room, id);
        }
        was_member
    }

    /// Whether `id` is currently in `room`.
    #[must_use]
    pub fn is_member(&self, id: ConnectionId, room: &str) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains(&id))
    }

    /// Queue a frame for one connection. Returns whether it was queued.
    pub fn send_to(&self, id: ConnectionId, frame: &ServerFrame) -> bool {
        let Some(sender) = self.sender(id) else {
            return false;
        };
        deliver(id, &sender, frame.to_text())
    }

    /// Queue a frame for every member of `room`. Returns how many accepted it.
    pub fn broadcast(&self, room: &str, frame: &ServerFrame) -> usize {
        self.broadcast_filtered(room, frame, None)
    }

    /// Queue a frame for every member of `room` except `sender`.
    pub fn broadcast_except(&self, room: &str, sender: ConnectionId, frame: &ServerFrame) -> usize {
        self.broadcast_filtered(room, frame, Some(sender))
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of non-empty rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of connections in `room`.
    #[must_use]
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |members| members.len())
    }

    fn broadcast_filtered(&self, room: &str, frame: &ServerFrame, except: Option<ConnectionId>) -> usize {
        let members: Vec<ConnectionId> = match self.rooms.get(room) {
            Some(members) => members
                .iter()
                .copied()
                .filter(|id| Some(*id) != except)
                .collect(),
            None => return 0,
        };

        let text = frame.to_text();
        let delivered = members
            .into_iter()
            .filter_map(|id| self.sender(id).map(|sender| (id, sender)))
            .filter(|(id, sender)| deliver(*id, sender, text.clone()))
            .count();

        if delivered > 0 {
            counter!("relay_gateway_emitted_total", "event" => frame.event.clone())
                .increment(delivered as u64);
        }
        delivered
    }

    fn sender(&self, id: ConnectionId) -> Option<mpsc::Sender<String>> {
        self.connections
            .get(&id)
            .map(|connection| connection.sender.clone())
    }

    fn remove_member(&self, room: &str, id: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    #[allow(clippy::cast_precision_loss)] // gauge values are f64
    fn record_connections(&self) {
        gauge!("relay_gateway_connections").set(self.connections.len() as f64);
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver(id: ConnectionId, sender: &mpsc::Sender<String>, text: String) -> bool {
    match sender.try_send(text) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!(connection_id = %id, "Outbound queue full, dropping frame");
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}
