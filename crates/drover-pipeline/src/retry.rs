//! Attempt-counting retry policy for remote legs.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, warn};

use crate::PipelineError;

/// Anything whose failures can be attributed to a wallet in logs.
pub trait HasOwnerAddress: Send + Sync {
    fn owner_address(&self) -> &str;
}

/// How an error behaves under [`RetryPolicy`].
pub trait Classify: std::fmt::Display + Sized {
    /// Errors that are re-raised on the first occurrence.
    fn is_non_retryable(&self) -> bool;

    /// Wrap the final error with the operation that produced it.
    fn exhausted(operation: &str, error: Self) -> Self;
}

impl Classify for PipelineError {
    fn is_non_retryable(&self) -> bool {
        matches!(
            self.root(),
            PipelineError::NonRetryable(_) | PipelineError::Config(_)
        ) || self.is_fatal()
    }

    fn exhausted(operation: &str, error: Self) -> Self {
        PipelineError::Exhausted {
            operation: operation.to_string(),
            source: Box::new(error),
        }
    }
}

/// Retry settings shared by every wrapped operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts for ordinary errors.
    pub attempts: u32,
    /// Attempts for errors matching `unlimited_phrases`.
    pub unlimited_cap: u32,
    /// Pause between attempts.
    pub sleep: Duration,
    /// Substrings marking an error as transient enough for the larger cap.
    pub unlimited_phrases: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            unlimited_cap: 10,
            sleep: Duration::from_secs(2),
            unlimited_phrases: vec![
                "429".to_string(),
                "Too Many Requests".to_string(),
                "timed out".to_string(),
            ],
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or its cap is hit.
    ///
    /// Non-retryable errors return immediately. Either way the returned error
    /// is wrapped as `"{operation}: {error}"`.
    pub async fn run<T, E, F, Fut>(
        &self,
        receiver: &dyn HasOwnerAddress,
        source: &str,
        operation: &str,
        mut op: F,
    ) -> Result<T, E>
    where
        E: Classify,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_non_retryable() => return Err(E::exhausted(operation, e)),
                Err(e) => e,
            };

            attempt += 1;
            let message = err.to_string();
            let unlimited = self
                .unlimited_phrases
                .iter()
                .any(|phrase| message.contains(phrase.as_str()));
            let max = if unlimited {
                self.unlimited_cap
            } else {
                self.attempts
            };

            if unlimited {
                warn!(
                    owner = receiver.owner_address(),
                    source,
                    operation,
                    error = %message,
                    attempt,
                    max,
                    "attempt failed"
                );
            } else {
                error!(
                    owner = receiver.owner_address(),
                    source,
                    operation,
                    error = %message,
                    attempt,
                    max,
                    "attempt failed"
                );
            }

            if attempt >= max {
                return Err(E::exhausted(operation, err));
            }
            sleep(self.sleep).await;
        }
    }

    /// Like [`RetryPolicy::run`], but a final failure becomes `None`.
    pub async fn run_or_none<T, E, F, Fut>(
        &self,
        receiver: &dyn HasOwnerAddress,
        source: &str,
        operation: &str,
        op: F,
    ) -> Option<T>
    where
        E: Classify,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(receiver, source, operation, op).await.ok()
    }
}
