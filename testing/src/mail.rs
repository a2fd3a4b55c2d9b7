//! Recording mail transport.

use helpdesk_relay_core::mail::{MailError, MailTransport, OutboundEmail};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mail transport that records every email instead of sending it.
///
/// Can be switched to fail, to exercise the dispatcher's error path.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailTransport {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
    failure: Arc<Mutex<Option<MailError>>>,
    attempts: Arc<AtomicUsize>,
    verifications: Arc<AtomicUsize>,
}

impl RecordingMailTransport {
    /// Create a transport that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport whose sends fail with `error`.
    #[must_use]
    pub fn failing(error: MailError) -> Self {
        let transport = Self::default();
        transport.fail_with(Some(error));
        transport
    }

    /// Make subsequent sends fail with `error`, or succeed again with `None`.
    pub fn fail_with(&self, error: Option<MailError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Emails accepted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls to `send`, successful or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Calls to `verify`.
    #[must_use]
    pub fn verifications(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }
}

impl MailTransport for RecordingMailTransport {
    fn send<'a>(
        &'a self,
        email: &'a OutboundEmail,
    ) -> Pin<Box<dyn Future<Output = Result<(), MailError>> + Send + 'a>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let failure = self
                .failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(error) = failure {
                return Err(error);
            }
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(email.clone());
            Ok(())
        })
    }

    fn verify(&self) -> Pin<Box<dyn Future<Output = Result<(), MailError>> + Send + '_>> {
        Box::pin(async move {
            self.verifications.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
