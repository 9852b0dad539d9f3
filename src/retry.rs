//! Retry logic with exponential backoff
//!
//! Remote requests are retried on transient failures (connection problems,
//! 5xx responses). Access and not-found answers are final and returned at once.
//!
//! # Example
//!
//! ```no_run
//! use thingmirror::retry::{IsRetryable, with_retry};
//! use thingmirror::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = with_retry(&config, || async {
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Connection(_) | FetchError::ServerError { .. } => true,
            // Takedowns and missing things do not come back by asking again
            FetchError::Forbidden { .. }
            | FetchError::NotFound { .. }
            | FetchError::Status { .. }
            | FetchError::InvalidResponse { .. } => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the successful result or the last error after all retry attempts
/// are exhausted. Non-retryable errors are returned immediately.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Request succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Request failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tokio::time::sleep(jittered_delay).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::debug!(
                        error = %e,
                        attempts = attempt + 1,
                        "Request failed after all retry attempts exhausted"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay; the result lies between `delay` and `2 * delay`
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
