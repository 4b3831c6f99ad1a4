//! Timeout, backoff and jitter helpers shared by the sync engines.

use crate::chain::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retries after the first attempt.
pub const MAX_RETRIES: u32 = 5;
/// Upper bound of the randomized backoff between attempts.
pub const MAX_BACKOFF: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            max_backoff: MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt may follow `retry` retries already made.
    pub fn allows(&self, retry: u32) -> bool {
        retry < self.max_retries
    }

    /// Uniform delay in `0..=max_backoff`.
    pub fn backoff(&self) -> Duration {
        let max_ms = self.max_backoff.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Races `fut` against `limit`; an elapsed deadline becomes [`FetchError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(limit)),
    }
}

/// Dispatch jitter in `1..=base` milliseconds.
pub fn jitter(base: u64) -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(1..=base.max(1)))
}

/// Sleeps for one dispatch jitter.
pub async fn throttle(base: u64) {
    tokio::time::sleep(jitter(base)).await;
}
