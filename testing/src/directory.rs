//! Static recipient directory.

use helpdesk_relay_core::directory::{DirectoryError, RecipientDirectory};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Directory backed by a fixed map of user id to email address.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    emails: HashMap<String, String>,
    unavailable: bool,
}

impl StaticDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user.
    #[must_use]
    pub fn with(mut self, user_id: impl Into<String>, email: impl Into<String>) -> Self {
        self.emails.insert(user_id.into(), email.into());
        self
    }

    /// A directory whose lookups always fail.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            emails: HashMap::new(),
            unavailable: true,
        }
    }
}

impl RecipientDirectory for StaticDirectory {
    fn email_for<'a>(
        &'a self,
        user_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, DirectoryError>> + Send + 'a>> {
        Box::pin(async move {
            if self.unavailable {
                return Err(DirectoryError::Unavailable(
                    "static directory marked unavailable".to_string(),
                ));
            }
            Ok(self.emails.get(user_id).cloned())
        })
    }
}
