//! Shared state of the gateway router.

use crate::rooms::RoomRegistry;
use axum::extract::FromRef;
use helpdesk_relay_auth::IdentityGate;
use std::sync::Arc;
use tokio::sync::broadcast;

/// What happens to a WebSocket handshake whose credentials are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Refuse the upgrade with 401/403.
    #[default]
    Reject,
    /// Upgrade, send an `error` event and keep the connection outside every room.
    AdmitWithoutRoom,
}

/// State shared by every gateway handler.
#[derive(Clone)]
pub struct GatewayState {
    /// Resolves handshake and request credentials
    pub gate: IdentityGate,
    /// Live connections and rooms
    pub rooms: Arc<RoomRegistry>,
    /// Handling of unauthenticated handshakes
    pub admission: AdmissionPolicy,
    shutdown: broadcast::Sender<()>,
}

impl GatewayState {
    /// State with an empty room registry and the default admission policy.
    #[must_use]
    pub fn new(gate: IdentityGate) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            gate,
            rooms: Arc::new(RoomRegistry::new()),
            admission: AdmissionPolicy::default(),
            shutdown,
        }
    }

    /// Use an existing registry (shared with the relay fan-out).
    #[must_use]
    pub fn with_rooms(mut self, rooms: Arc<RoomRegistry>) -> Self {
        self.rooms = rooms;
        self
    }

    /// Set the admission policy.
    #[must_use]
    pub const fn with_admission(mut self, admission: AdmissionPolicy) -> Self {
        self.admission = admission;
        self
    }

    /// Ask every open connection to close.
    pub fn close_connections(&self) {
        let _ = self.shutdown.send(());
    }

    /// Receiver that fires when [`close_connections`](Self::close_connections) is called.
    #[must_use]
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }
}

impl FromRef<GatewayState> for IdentityGate {
    fn from_ref(state: &GatewayState) -> Self {
        state.gate.clone()
    }
}
