//! WebSocket connection gateway.
//!
//! # Lifecycle
//!
//! ```text
//! Client                 Gateway                     RoomRegistry
//!   │                       │                             │
//!   ├─ GET /ws?token=… ────>│                             │
//!   │                       ├─ IdentityGate::resolve      │
//!   │<─ 401/403 ────────────┤  (rejected, default policy) │
//!   │<─ 101 Upgrade ────────┤  (resolved)                 │
//!   │                       ├─ connect + join user:<id> ─>│
//!   │                       │                             │
//!   ├─ {"type":"join"} ────>├─ join ticket:<id> ─────────>│
//!   │<─ room-joined ────────┤                             │
//!   │                       │<── broadcast(user:<id>) ────┤
//!   │<─ notification.new ───┤                             │
//! ```
//!
//! Identity is checked once, at the handshake. Frames are never re-authenticated.

use crate::error::AppError;
use crate::protocol::{ClientFrame, ServerFrame};
use crate::rooms::{ConnectionId, RoomRegistry};
use crate::state::{AdmissionPolicy, GatewayState};
use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use helpdesk_relay_auth::{CallerCredentials, IdentityRejection};
use helpdesk_relay_core::principal::{Principal, USER_ROOM_PREFIX};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Query string of the handshake. Browsers cannot set headers on a WebSocket
/// handshake, so the token may come here instead.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    /// Bearer credential
    pub token: Option<String>,
}

/// `GET /ws`: authenticate the handshake and upgrade.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn handle(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
) -> Response {
    let credentials = CallerCredentials::from_headers(&headers).or_token(query.token.as_deref());

    let admission = match state.gate.resolve(&credentials) {
        Ok(principal) => Ok(principal),
        Err(rejection) => match state.admission {
            AdmissionPolicy::Reject => {
                info!(reason = rejection.code(), "WebSocket handshake rejected");
                return AppError::from(rejection).into_response();
            }
            AdmissionPolicy::AdmitWithoutRoom => Err(rejection),
        },
    };

    ws.on_upgrade(move |socket| serve_connection(socket, state, admission))
}

/// What a connection is allowed to do, fixed at the handshake.
struct Session {
    id: ConnectionId,
    principal: Option<Principal>,
}

impl Session {
    fn label(&self) -> String {
        self.principal
            .as_ref()
            .map_or_else(|| "anonymous".to_string(), Principal::label)
    }

    fn typing_id(&self) -> String {
        match &self.principal {
            Some(Principal::User(user)) => user.user_id.clone(),
            Some(principal @ Principal::Service(_)) => principal.label(),
            None => String::new(),
        }
    }
}

async fn serve_connection(
    socket: WebSocket,
    state: GatewayState,
    admission: Result<Principal, IdentityRejection>,
) {
    let rooms = state.rooms.clone();
    let (id, mut outbound) = rooms.connect();

    let session = match admission {
        Ok(principal) => {
            if let Some(room) = principal.personal_room() {
                rooms.join(id, &room);
            }
            Session {
                id,
                principal: Some(principal),
            }
        }
        Err(rejection) => {
            rooms.send_to(id, &ServerFrame::error(rejection.code(), rejection.to_string()));
            Session {
                id,
                principal: None,
            }
        }
    };
    info!(connection_id = %id, principal = %session.label(), "WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let mut shutdown = state.shutdown_signal();
    let recv_rooms = rooms.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                _ = shutdown.recv() => break,
                message = receiver.next() => message,
            };
            match message {
                Some(Ok(Message::Text(text))) => on_text(&recv_rooms, &session, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Binary(_))) => {
                    recv_rooms.send_to(
                        session.id,
                        &ServerFrame::error("unsupported_frame", "Binary frames are not supported"),
                    );
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    debug!(connection_id = %session.id, error = %e, "WebSocket receive failed");
                    break;
                }
            }
        }
    });

    let send_finished = tokio::select! {
        _ = (&mut send_task) => true,
        _ = (&mut recv_task) => false,
    };

    rooms.disconnect(id);
    if send_finished {
        debug!(connection_id = %id, "Send task completed, aborting receive task");
        recv_task.abort();
    } else {
        // Dropping the registry's sender ends the send task once it has flushed.
        debug!(connection_id = %id, "Receive task completed, draining send task");
        let _ = send_task.await;
    }
    info!(connection_id = %id, "WebSocket connection closed");
}

fn on_text(rooms: &RoomRegistry, session: &Session, text: &str) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(connection_id = %session.id, error = %e, "Unparseable client frame");
            rooms.send_to(
                session.id,
                &ServerFrame::error("invalid_frame", "Unrecognized frame"),
            );
            return;
        }
    };

    let Some(principal) = &session.principal else {
        rooms.send_to(
            session.id,
            &ServerFrame::error("unauthenticated", "Connection is not authenticated"),
        );
        return;
    };

    match frame {
        ClientFrame::Join { room } => match check_room(principal, &room) {
            Ok(room) => {
                rooms.join(session.id, room);
                debug!(connection_id = %session.id, room = %room, "Joined room");
                rooms.send_to(session.id, &ServerFrame::room_joined(room));
            }
            Err(refusal) => {
                rooms.send_to(session.id, &refusal);
            }
        },
        ClientFrame::Leave { room } => {
            let room = room.trim();
            if principal.personal_room().as_deref() == Some(room) {
                rooms.send_to(
                    session.id,
                    &ServerFrame::error("forbidden_room", "The personal room cannot be left"),
                );
            } else {
                rooms.leave(session.id, room);
                rooms.send_to(session.id, &ServerFrame::room_left(room));
            }
        }
        ClientFrame::Typing { room, active } => {
            if rooms.is_member(session.id, &room) {
                let frame = ServerFrame::typing(&room, &session.typing_id(), active);
                rooms.broadcast_except(&room, session.id, &frame);
            } else {
                warn!(connection_id = %session.id, room = %room, "Typing indicator for a room not joined");
                rooms.send_to(
                    session.id,
                    &ServerFrame::error("not_a_member", "Join the room first"),
                );
            }
        }
        ClientFrame::Ping => {
            rooms.send_to(session.id, &ServerFrame::pong());
        }
    }
}

/// Rooms are free-form, except personal rooms: only the owner may be in `user:<id>`.
fn check_room<'a>(principal: &Principal, room: &'a str) -> Result<&'a str, ServerFrame> {
    let room = room.trim();
    if room.is_empty() {
        return Err(ServerFrame::error("invalid_room", "Room name is empty"));
    }
    if room.starts_with(USER_ROOM_PREFIX) && principal.personal_room().as_deref() != Some(room) {
        return Err(ServerFrame::error(
            "forbidden_room",
            "Personal rooms are reserved to their owner",
        ));
    }
    Ok(room)
}
