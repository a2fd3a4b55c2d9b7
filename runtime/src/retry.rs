//! Retry logic with capped backoff for transient failures.
//!
//! The same policy drives broker reconnection (see [`crate::broker`]) and
//! producer-side publishing (see [`crate::publisher`]). A multiplier of `1.0`
//! gives a fixed delay; no retry ceiling means the operation is retried until it
//! succeeds. With a ceiling, giving up is an explicit [`RetryError::Exhausted`].
//!
//! # Example
//!
//! ```rust
//! use helpdesk_relay_runtime::retry::{RetryPolicy, retry_with_backoff};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(10))
//!     .multiplier(2.0)
//!     .build();
//!
//! let result = retry_with_backoff(policy, || async {
//!     Ok::<_, String>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Retry policy configuration.
///
/// # Default Values
///
/// - `max_retries`: `Some(3)`
/// - `initial_delay`: 100ms
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt. `None` retries forever.
    pub max_retries: Option<usize>,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Ceiling for the delay between retries
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: Some(Some(3)),
            initial_delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// Fixed delay, no ceiling.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            max_retries: None,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    ///
    /// `initial_delay * multiplier ^ attempt`, capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);

        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }

        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Whether another retry is allowed after `retries_done` retries.
    #[must_use]
    pub fn allows_retry(&self, retries_done: usize) -> bool {
        self.max_retries.is_none_or(|max| retries_done < max)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<Option<usize>>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set the retry ceiling.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(Some(max_retries));
        self
    }

    /// Retry until success.
    #[must_use]
    pub const fn unlimited(mut self) -> Self {
        self.max_retries = Some(None);
        self
    }

    /// Set delay before the first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set the delay ceiling.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            initial_delay: self.initial_delay.unwrap_or(defaults.initial_delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
        }
    }
}

/// Terminal outcome of a retried operation.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// Every allowed attempt failed
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Number of attempts made, including the first
        attempts: usize,
        /// Error of the final attempt
        last_error: E,
    },
}

impl<E> RetryError<E> {
    /// Error of the final attempt.
    pub fn into_last_error(self) -> E {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
        }
    }
}

/// Retry an async operation following `policy`.
///
/// # Errors
///
/// Returns [`RetryError::Exhausted`] with the last error once the retry ceiling
/// is reached. Never returns with an unlimited policy until the operation succeeds.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut retries = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if retries > 0 {
                    tracing::info!(attempt = retries + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !policy.allows_retry(retries) {
                    tracing::error!(
                        attempts = retries + 1,
                        error = %err,
                        "Operation failed after max retries"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: retries + 1,
                        last_error: err,
                    });
                }

                let delay = policy.delay_for_attempt(retries);
                tracing::warn!(
                    attempt = retries + 1,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying"
                );

                sleep(delay).await;
                retries += 1;
            }
        }
    }
}
