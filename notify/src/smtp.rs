//! SMTP mail transport using Lettre.

use helpdesk_relay_core::mail::{MailError, MailTransport, OutboundEmail};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How the connection to the SMTP server is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// TLS from the first byte (usually port 465)
    Tls,
    /// Plain connection upgraded with STARTTLS (usually port 587)
    StartTls,
    /// No encryption. Local development servers only.
    None,
}

impl SmtpSecurity {
    /// Conventional security for a port: 465 is TLS, 25/1025/2525 are plain,
    /// anything else uses STARTTLS.
    #[must_use]
    pub const fn for_port(port: u16) -> Self {
        match port {
            465 => Self::Tls,
            25 | 1025 | 2525 => Self::None,
            _ => Self::StartTls,
        }
    }
}

/// SMTP server settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Server host name
    pub host: String,
    /// Server port
    pub port: u16,
    /// Connection security
    pub security: SmtpSecurity,
    /// Username, when the server requires authentication
    pub username: Option<String>,
    /// Password for `username`
    pub password: Option<String>,
    /// Sender, e.g. `Helpdesk <noreply@example.com>`
    pub from: String,
    /// Upper bound for one send, connection included
    pub timeout: Duration,
}

impl SmtpConfig {
    /// Settings for `host:port` with security derived from the port and a 10 s timeout.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, from: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            security: SmtpSecurity::for_port(port),
            username: None,
            password: None,
            from: from.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Authenticate with `username` and `password`.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Override the connection security.
    #[must_use]
    pub const fn with_security(mut self, security: SmtpSecurity) -> Self {
        self.security = security;
        self
    }

    /// Override the send timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Mail transport speaking SMTP.
///
/// Lettre's SMTP client is blocking, so each send runs on the blocking pool and is
/// bounded by the configured timeout. The transport is verified at startup with
/// [`verify`](MailTransport::verify); after a failed send it is marked unverified
/// and the next send verifies it again before trying.
///
/// # Examples
///
/// ```ignore
/// use helpdesk_relay_notify::{SmtpConfig, SmtpMailTransport};
///
/// let transport = SmtpMailTransport::new(
///     SmtpConfig::new("smtp.example.com", 587, "Helpdesk <noreply@example.com>")
///         .with_credentials("user", "app-password"),
/// )?;
/// transport.verify().await?;
/// ```
#[derive(Clone)]
pub struct SmtpMailTransport {
    mailer: SmtpTransport,
    from: Mailbox,
    timeout: Duration,
    verified: Arc<AtomicBool>,
}

impl SmtpMailTransport {
    /// Build the transport. No connection is opened until the first send or verify.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::InvalidAddress`] for an unparsable sender and
    /// [`MailError::Unavailable`] if the relay cannot be configured for `host`.
    pub fn new(config: SmtpConfig) -> Result<Self, MailError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(config.from.clone()))?;

        let builder = match config.security {
            SmtpSecurity::Tls => SmtpTransport::relay(&config.host)
                .map_err(|e| MailError::Unavailable(format!("SMTP relay error: {e}")))?,
            SmtpSecurity::StartTls => SmtpTransport::starttls_relay(&config.host)
                .map_err(|e| MailError::Unavailable(format!("SMTP relay error: {e}")))?,
            SmtpSecurity::None => SmtpTransport::builder_dangerous(&config.host),
        };

        let mut builder = builder.port(config.port).timeout(Some(config.timeout));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        tracing::info!(
            host = %config.host,
            port = config.port,
            security = ?config.security,
            "SMTP transport configured"
        );

        Ok(Self {
            mailer: builder.build(),
            from,
            timeout: config.timeout,
            verified: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Whether the last verification succeeded and no send failed since.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verified.load(Ordering::SeqCst)
    }

    fn build_message(&self, email: &OutboundEmail) -> Result<Message, MailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| MailError::InvalidAddress(email.to.clone()))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
            .map_err(|e| MailError::Build(e.to_string()))
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, MailError>
    where
        T: Send + 'static,
        F: FnOnce(SmtpTransport) -> Result<T, MailError> + Send + 'static,
    {
        let mailer = self.mailer.clone();
        let task = tokio::task::spawn_blocking(move || op(mailer));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(MailError::SendFailed(format!("Email task failed: {e}"))),
            Err(_) => Err(MailError::Timeout(self.timeout)),
        }
    }
}

impl MailTransport for SmtpMailTransport {
    fn send<'a>(
        &'a self,
        email: &'a OutboundEmail,
    ) -> Pin<Box<dyn Future<Output = Result<(), MailError>> + Send + 'a>> {
        Box::pin(async move {
            let message = self.build_message(email)?;

            if !self.is_verified() {
                self.verify().await?;
            }

            let result = self
                .blocking(move |mailer| {
                    mailer
                        .send(&message)
                        .map(|_| ())
                        .map_err(|e| MailError::SendFailed(e.to_string()))
                })
                .await;

            if let Err(e) = &result {
                self.verified.store(false, Ordering::SeqCst);
                tracing::warn!(error = %e, "SMTP send failed, transport will be verified again");
            }
            result
        })
    }

    fn verify(&self) -> Pin<Box<dyn Future<Output = Result<(), MailError>> + Send + '_>> {
        Box::pin(async move {
            let reachable = self
                .blocking(|mailer| {
                    mailer
                        .test_connection()
                        .map_err(|e| MailError::Unavailable(e.to_string()))
                })
                .await
                .map_err(|e| match e {
                    MailError::Unavailable(_) => e,
                    other => MailError::Unavailable(other.to_string()),
                })?;

            if !reachable {
                self.verified.store(false, Ordering::SeqCst);
                return Err(MailError::Unavailable(
                    "SMTP server rejected the connection test".to_string(),
                ));
            }

            self.verified.store(true, Ordering::SeqCst);
            tracing::info!("SMTP transport verified");
            Ok(())
        })
    }
}
