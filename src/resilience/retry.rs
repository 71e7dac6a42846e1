//! Retry with exponential backoff for remote conversation calls

use crate::TessaError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy for remote calls
///
/// Controls how many times a failed call is retried and how long to wait
/// between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (total attempts = `max_retries + 1`)
    pub max_retries: u32,
    /// Delay before the first retry (doubles each attempt)
    pub initial_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Policy that makes a single attempt
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Worst-case total time spent sleeping between attempts
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_retries)
            .map(|attempt| delay_for_attempt(self, attempt))
            .sum()
    }
}

/// Compute the delay before retrying after the given (zero-based) attempt:
/// `min(initial_delay * 2^attempt, max_delay)`.
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    policy
        .initial_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(policy.max_delay)
}

/// Default retry predicate: only network and api failures are retried.
pub fn should_retry_error(error: &TessaError) -> bool {
    error.is_recoverable()
}

/// Run `operation`, retrying failures that `should_retry` accepts.
///
/// The last error is returned once retries are exhausted or the predicate
/// rejects an error. `max_retries = 0` makes exactly one attempt.
pub async fn with_retry<T, E, F, Fut, P>(
    mut operation: F,
    policy: &RetryPolicy,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                if attempt >= policy.max_retries || !should_retry(&e) {
                    return Err(e);
                }

                let delay = delay_for_attempt(policy, attempt);
                warn!(
                    "Retry attempt {}/{} after {}ms: {}",
                    attempt + 1,
                    policy.max_retries,
                    delay.as_millis(),
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
