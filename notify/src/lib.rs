//! # Helpdesk Relay Notify
//!
//! Turns consumed domain events into outbound email.
//!
//! ```text
//! DomainEvent ──▶ templates::render ──▶ resolve recipient ──▶ MailTransport::send
//!                    (pure)            payload email, or
//!                                      RecipientDirectory
//! ```
//!
//! ## Components
//!
//! - [`NotificationDispatcher`]: render, validate, resolve, send. No retries of its own.
//! - [`NotificationHandler`]: queue handler that relays ticket events to the user's
//!   live connections (best-effort) and dispatches the email.
//! - [`SmtpMailTransport`] / [`ConsoleMailTransport`]: mail transports.
//! - [`HttpRecipientDirectory`]: address lookup against the users service.

pub mod console;
pub mod directory;
pub mod dispatcher;
pub mod handler;
pub mod smtp;
pub mod templates;

pub use console::ConsoleMailTransport;
pub use directory::HttpRecipientDirectory;
pub use dispatcher::{DispatchError, NotificationDispatcher};
pub use handler::NotificationHandler;
pub use smtp::{SmtpConfig, SmtpMailTransport, SmtpSecurity};
pub use templates::{Rendered, render};
