//! Bounded retry with exponential backoff and jitter.
//!
//! The policy is an explicit value consumed by a generic combinator, so
//! retry behavior is configured in one place and decoupled from any
//! specific call site. Errors classify themselves via [`Retryable`]:
//! fatal errors abort immediately, transient errors back off
//! exponentially, and rate limits honor the server's hint when present.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::Error;

/// How an error should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Do not retry; surface to the caller immediately.
    Fatal,
    /// Retry with exponential backoff.
    Transient,
    /// Retry after the server-supplied hint, or backoff if absent.
    RateLimited,
}

/// Classification hook implemented by retryable error types.
pub trait Retryable {
    fn retry_class(&self) -> RetryClass;

    /// Server-supplied delay hint, if the error carries one.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for Error {
    fn retry_class(&self) -> RetryClass {
        match self {
            Error::RateLimited { .. } => RetryClass::RateLimited,
            Error::Network(_) | Error::Io(_) => RetryClass::Transient,
            Error::Api { status, .. } if *status >= 500 => RetryClass::Transient,
            _ => RetryClass::Fatal,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Retry policy: attempt bound, backoff curve, and jitter switch.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum total attempts (first call included).
    pub max_attempts: u32,
    /// Base delay for the exponential curve.
    pub base_delay: Duration,
    /// Cap applied before jitter.
    pub max_delay: Duration,
    /// Multiplicative jitter in [0.5, 1.5] when enabled.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy with jitter disabled, for deterministic tests.
    pub fn fixed(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }

    /// Delay before the retry following `attempt` (zero-based):
    /// `min(base * 2^attempt, cap)`, jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        if self.jitter {
            let factor = rand::thread_rng().gen_range(0.5..=1.5);
            exp.mul_f64(factor)
        } else {
            exp
        }
    }
}

/// Run `op` under `policy`, retrying transient and rate-limited failures.
///
/// `name` labels log lines and metrics; it should be a short operation
/// identifier like `"create_draft"`.
pub async fn retry_with_policy<T, E, F, Fut>(
    policy: &RetryPolicy,
    name: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let class = err.retry_class();
                let exhausted = attempt + 1 >= policy.max_attempts;
                if class == RetryClass::Fatal || exhausted {
                    if class != RetryClass::Fatal {
                        tracing::warn!(op = name, attempts = attempt + 1, error = %err, "retries exhausted");
                    }
                    return Err(err);
                }

                let delay = match class {
                    RetryClass::RateLimited => err
                        .retry_after()
                        .unwrap_or_else(|| policy.delay_for_attempt(attempt)),
                    _ => policy.delay_for_attempt(attempt),
                };
                tracing::debug!(op = name, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
                metrics::counter!("api_retries_total").increment(1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
