//! Outbound mail transport seam.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// A rendered email ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    /// Destination address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
}

/// Errors reported by a mail transport.
#[derive(Error, Debug, Clone)]
pub enum MailError {
    /// Transport is not configured or could not be verified
    #[error("Mail transport unavailable: {0}")]
    Unavailable(String),

    /// Address could not be parsed
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    /// Message could not be built
    #[error("Failed to build message: {0}")]
    Build(String),

    /// The server refused or the connection failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The send did not complete in time
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

/// Trait for outbound mail transports.
///
/// A transport is expected to be verified once at startup. Implementations that
/// lose their connection re-verify lazily on the next send.
pub trait MailTransport: Send + Sync {
    /// Send one email.
    ///
    /// # Errors
    ///
    /// Returns a [`MailError`] if the email is not handed to the server.
    fn send<'a>(
        &'a self,
        email: &'a OutboundEmail,
    ) -> Pin<Box<dyn Future<Output = Result<(), MailError>> + Send + 'a>>;

    /// Check that the transport can reach and authenticate against its server.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::Unavailable`] if verification fails.
    fn verify(&self) -> Pin<Box<dyn Future<Output = Result<(), MailError>> + Send + '_>>;
}
