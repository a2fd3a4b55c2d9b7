//! Console mail transport for development.

use helpdesk_relay_core::mail::{MailError, MailTransport, OutboundEmail};
use std::future::Future;
use std::pin::Pin;
use tracing::info;

/// Mail transport that prints emails instead of sending them.
///
/// Used when no SMTP host is configured, so the notification service can run
/// locally end to end.
#[derive(Clone, Debug, Default)]
pub struct ConsoleMailTransport;

impl ConsoleMailTransport {
    /// Create a new console transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MailTransport for ConsoleMailTransport {
    fn send<'a>(
        &'a self,
        email: &'a OutboundEmail,
    ) -> Pin<Box<dyn Future<Output = Result<(), MailError>> + Send + 'a>> {
        Box::pin(async move {
            info!(
                to = %email.to,
                subject = %email.subject,
                html_len = email.html.len(),
                "📧 Email (Development Mode)"
            );
            println!("\n╔══════════════════════════════════════════════════════════════╗");
            println!("║                     NOTIFICATION EMAIL                       ║");
            println!("╠══════════════════════════════════════════════════════════════╣");
            println!("║ To: {:<57}║", email.to);
            println!("║ Subject: {:<52}║", email.subject);
            println!("╚══════════════════════════════════════════════════════════════╝");
            println!("{}\n", email.html);
            Ok(())
        })
    }

    fn verify(&self) -> Pin<Box<dyn Future<Output = Result<(), MailError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}
