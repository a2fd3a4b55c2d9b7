//! # Helpdesk Relay Core
//!
//! Core types and collaborator traits for the cross-service event relay.
//!
//! The relay moves a domain event raised by one service along two decoupled paths:
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │ Producer service │
//!                  └───┬──────────┬───┘
//!          DomainEvent │          │ RelayMessage
//!                      ▼          ▼
//!            ┌──────────────┐  ┌──────────────┐
//!            │ DurableQueue │  │   RelayBus   │◄─── best-effort, no replay
//!            └──────┬───────┘  └──────┬───────┘
//!                   │ ack/nack        │
//!                   ▼                 ▼
//!          ┌────────────────┐  ┌────────────────────┐
//!          │ Event Consumer │  │ Connection Gateway │
//!          │  + Dispatcher  │  │   room "user:<id>" │
//!          └────────┬───────┘  └────────────────────┘
//!                   ▼
//!            MailTransport
//! ```
//!
//! This crate holds no I/O. Adapters for real brokers live in sibling crates
//! (`helpdesk-relay-redpanda`, `helpdesk-relay-redis`), in-memory doubles in
//! `helpdesk-relay-testing`.
//!
//! ## Modules
//!
//! - [`event`]: [`DomainEvent`](event::DomainEvent) and its wire decoding
//! - [`queue`]: the [`DurableQueue`](queue::DurableQueue) seam with per-message ack/nack
//! - [`relay`]: [`RelayMessage`](relay::RelayMessage) and the [`RelayBus`](relay::RelayBus) seam
//! - [`principal`]: resolved caller identity and room naming
//! - [`mail`]: outbound mail transport seam
//! - [`directory`]: recipient lookup seam

pub mod directory;
pub mod event;
pub mod mail;
pub mod principal;
pub mod queue;
pub mod relay;

pub use directory::{DirectoryError, RecipientDirectory};
pub use event::{DecodeError, DomainEvent, EventKind, Payload};
pub use mail::{MailError, MailTransport, OutboundEmail};
pub use principal::{Principal, ServicePrincipal, UserPrincipal, user_room};
pub use queue::{Acknowledger, Delivery, DeliveryInfo, DeliveryStream, DurableQueue, QueueError};
pub use relay::{NOTIFICATIONS_CHANNEL, RelayBus, RelayError, RelayMessage, RelayStream};
