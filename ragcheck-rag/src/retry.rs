//! Timeout and bounded retry for calls to external providers.
//!
//! Every embedding, generation and judge call goes through [`with_retry`]:
//! each attempt is bounded by [`RetryPolicy::timeout`], and failures that
//! report themselves as retryable are repeated with exponential backoff up to
//! [`RetryPolicy::max_attempts`] attempts in total.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::{RagError, Result};

/// An error that knows whether repeating the failed call could help.
pub trait RetryableError: Display + Sized {
    /// Whether the failed call may succeed if attempted again.
    fn is_retryable(&self) -> bool;

    /// The error reported when an attempt exceeds its timeout.
    fn timed_out(operation: &str, after: Duration) -> Self;
}

/// Retry and timeout settings for one kind of external call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for every further attempt.
    pub initial_backoff_ms: u64,
    /// Upper bound for a single backoff delay.
    pub max_backoff_ms: u64,
    /// Timeout applied to every single attempt.
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 500, max_backoff_ms: 8_000, timeout_ms: 30_000 }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry(timeout: Duration) -> Self {
        Self { max_attempts: 1, timeout_ms: timeout.as_millis() as u64, ..Self::default() }
    }

    /// Check that the policy can make progress.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `max_attempts` or `timeout_ms` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RagError::ConfigError("retry max_attempts must be at least 1".into()));
        }
        if self.timeout_ms == 0 {
            return Err(RagError::ConfigError("retry timeout_ms must be greater than zero".into()));
        }
        Ok(())
    }

    /// The per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Backoff before attempt `attempt + 1`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let millis = self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    fn jittered_backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let spread = base.as_millis() as u64 / 4;
        if spread == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

/// Run `call` under `policy`, retrying retryable failures.
///
/// `operation` names the call in logs and in timeout errors.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> std::result::Result<T, E>
where
    E: RetryableError,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout(), call()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(E::timed_out(operation, policy.timeout())),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.jittered_backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(operation, attempt, error = %e, "call failed");
                return Err(e);
            }
        }
    }
}
