//! Bounded retry policies for external calls
//!
//! Every outbound operation (model load, webhook reconciliation, message
//! delivery) gets its own [`RetryPolicy`] instead of an ad hoc sleep loop.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::{Error, Result};

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles each attempt, with up to 25% jitter
    Exponential,
}

/// Retry policy for a class of external calls
///
/// `max_attempts` counts the first try, so a value of 1 never retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Delay growth strategy
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff: Backoff::Exponential,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    /// A policy with a fixed delay between attempts
    #[must_use]
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    /// A policy with exponential backoff capped at `max_delay`
    #[must_use]
    pub const fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            backoff: Backoff::Exponential,
        }
    }
}

/// Compute the delay before retry number `attempt` (0-based).
///
/// Fixed policies always wait `base_delay`. Exponential policies wait
/// `min(base_delay * 2^attempt + jitter, max_delay)`, where jitter is 0-25%
/// of the computed delay.
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    if policy.backoff == Backoff::Fixed {
        return policy.base_delay;
    }

    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(policy.max_delay);

    let jitter = base.mul_f64(rand::thread_rng().gen_range(0.0..0.25));

    (base + jitter).min(policy.max_delay)
}

/// Run `op` until it succeeds or the policy's attempts are exhausted.
///
/// Every error is treated as transient; the last error is returned once the
/// budget is spent.
///
/// # Errors
///
/// Returns the error of the final attempt
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < max_attempts => {
                let delay = delay_for_attempt(policy, attempt);
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Bound `fut` by `limit`, mapping expiry to [`Error::Timeout`]
///
/// # Errors
///
/// Returns the future's own error, or `Error::Timeout` when it runs too long
pub async fn with_timeout<T, Fut>(limit: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(limit))?
}
