//! Retry and timeout helpers for calls that cross a process boundary.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RagError, Result};

/// Exponential backoff policy for transient failures.
///
/// Only errors for which [`RagError::is_transient`] returns `true` are
/// retried; permanent errors are returned immediately.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Number of retries after the first attempt (0 disables retrying).
    pub max_retries: u32,
    /// Backoff before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on any single backoff, in milliseconds.
    pub max_backoff_ms: u64,
    /// Factor applied to the backoff after each retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3, initial_backoff_ms: 200, max_backoff_ms: 5_000, backoff_multiplier: 2.0 }
    }
}

impl RetryConfig {
    /// Create a policy with the given retry count and initial backoff.
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff_ms: initial_backoff.as_millis() as u64,
            ..Self::default()
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self { max_retries: 0, initial_backoff_ms: 0, max_backoff_ms: 0, backoff_multiplier: 1.0 }
    }

    /// Set the maximum backoff.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff_ms = max_backoff.as_millis() as u64;
        self
    }

    /// Backoff to sleep before retry number `retry` (zero-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let millis = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(retry as i32);
        let capped = millis.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Run `operation`, retrying transient failures with exponential backoff.
    ///
    /// `name` identifies the operation in log output.
    pub async fn run<F, Fut, T>(&self, name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => {
                    debug!(operation = name, error = %err, "permanent failure, not retrying");
                    return Err(err);
                }
                Err(err) if retry >= self.max_retries => {
                    debug!(operation = name, attempts = retry + 1, "retries exhausted");
                    return Err(err);
                }
                Err(err) => {
                    let backoff = self.backoff(retry);
                    retry += 1;
                    warn!(
                        operation = name,
                        attempt = retry,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Await `future`, failing with [`RagError::Timeout`] after `timeout`.
pub async fn with_timeout<T>(
    operation: &str,
    timeout: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(RagError::Timeout { operation: operation.to_string(), timeout }),
    }
}
