//! Recipient lookup seam.
//!
//! Events often carry only a user id; the address lives in the users service.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from a recipient directory.
#[derive(Error, Debug, Clone)]
pub enum DirectoryError {
    /// The directory could not be reached
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    /// The directory answered with something unexpected
    #[error("Invalid directory response: {0}")]
    InvalidResponse(String),
}

/// Trait for recipient metadata lookups.
pub trait RecipientDirectory: Send + Sync {
    /// Email address of a user. `Ok(None)` when the user is unknown or has no address.
    ///
    /// # Errors
    ///
    /// Returns a [`DirectoryError`] if the lookup itself fails.
    fn email_for<'a>(
        &'a self,
        user_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, DirectoryError>> + Send + 'a>>;
}
