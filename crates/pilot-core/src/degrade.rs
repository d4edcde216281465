//! Bounded retry and graceful degradation
//!
//! Two shapes of the same policy:
//! - [`fail_open`]: run once, log and swallow failure. For infrastructure such
//!   as the activity log that must never stop a run.
//! - [`RetryPolicy`]: run up to `max_attempts` times with a pause between
//!   attempts, then either return the last error or degrade to a fallback value.
//!   Oracle planning and perception both go through it.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open (infrastructure, not control flow)
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Attempt budget and pacing for a retried operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Run `f` until it succeeds or the attempts are spent
    ///
    /// Returns the last error when every attempt failed. No pause follows the
    /// final attempt.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut f: F) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match f(attempt).await {
                Ok(val) => return Ok(val),
                Err(e) if attempt >= self.max_attempts => {
                    warn!(
                        "{} failed after {} attempts: {}",
                        operation_name, self.max_attempts, e
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        operation_name, attempt, self.max_attempts, e
                    );
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Like [`RetryPolicy::run`], but degrade to `fallback` instead of failing
    pub async fn run_or_else<F, Fut, T, D>(&self, operation_name: &str, f: F, fallback: D) -> T
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
        D: FnOnce() -> T,
    {
        match self.run(operation_name, f).await {
            Ok(val) => val,
            Err(_) => {
                warn!("{} degraded to fallback value", operation_name);
                fallback()
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}
