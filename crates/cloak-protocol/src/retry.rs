//! Bounded retry with exponential backoff for ledger calls.

use std::future::Future;
use std::time::Duration;

use cloak_ledger::LedgerError;
use tracing::warn;

use crate::{ClaimError, Result};

/// How transient ledger failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1` (1-based `attempt`).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `call` until it succeeds, fails permanently, or runs out of attempts.
///
/// Only [`LedgerError::Transient`] is retried. Exhausting the attempts
/// surfaces [`ClaimError::LedgerTimeout`].
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &'static str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = cloak_ledger::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(LedgerError::Transient(msg)) if attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %msg,
                    "transient ledger failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(LedgerError::Transient(msg)) => {
                warn!(operation, attempts = attempt, error = %msg, "ledger retries exhausted");
                return Err(ClaimError::LedgerTimeout {
                    attempts: attempt,
                    last_error: msg,
                });
            }
            Err(other) => return Err(other.into()),
        }
    }
}
