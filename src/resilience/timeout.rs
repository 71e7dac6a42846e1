//! Time limit for remote calls
//!
//! `with_timeout` races an operation against a timer. When the timer wins the
//! operation's future is dropped and a `TessaError::Timeout` is returned.
//!
//! Known limitation: dropping the future only stops local polling. Work the
//! operation already handed off (a request the server is processing, a task it
//! spawned) keeps running and its outcome is discarded.

use crate::{Result, TessaError};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default time limit for one LLM call, including its retries
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Message carried by the timeout error of an LLM call
pub const LLM_TIMEOUT_MESSAGE: &str = "LLM request timed out";

/// Await `operation`, failing with `TessaError::Timeout(message)` if it takes
/// longer than `limit`.
pub async fn with_timeout<T, Fut>(operation: Fut, limit: Duration, message: &str) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Operation exceeded {}ms: {}", limit.as_millis(), message);
            Err(TessaError::Timeout(message.to_string()))
        }
    }
}
