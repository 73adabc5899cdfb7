//! Retry logic with exponential backoff
//!
//! The staging gate uses this to retry file moves that fail transiently, for
//! example while another process still holds a freshly written file open.
//! Backoff is exponential with optional jitter.
//!
//! # Example
//!
//! ```no_run
//! use routed_dl::retry::{IsRetryable, with_retry};
//! use routed_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MoveError {
//!     Locked,
//!     Gone,
//! }
//!
//! impl std::fmt::Display for MoveError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MoveError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MoveError::Locked)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MoveError> {
//! let config = RetryConfig::default();
//! with_retry(&config, || async { Ok::<_, MoveError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use rand::Rng;
use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (file locked, permission momentarily denied, interrupted
/// call) should return `true`. Permanent failures (missing file, collision,
/// invalid path) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for std::io::Error {
    fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::PermissionDenied
                | ErrorKind::ResourceBusy
                | ErrorKind::WouldBlock
                | ErrorKind::Interrupted
                | ErrorKind::TimedOut
        )
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Makes one initial attempt plus up to `config.max_attempts` retries of
/// retryable errors. Returns the first success or the last error.
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
                    tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
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
                    "operation failed, retrying"
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
                    tracing::warn!(
                        error = %e,
                        attempts = attempt + 1,
                        "operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Stretch `delay` by a uniform factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
