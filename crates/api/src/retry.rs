//! Exponential-backoff retry for transient storage failures.
//!
//! Only [`RepositoryError::StorageUnavailable`] is retried. Version
//! mismatches and every other error are returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use tablesync_db::repository::{RepositoryError, RepositoryResult};

/// How many times to retry and how long to wait before the first retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub attempts: u32,
    /// Delay before the first retry; doubled for each subsequent one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts,
            base_delay,
        }
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy is spent.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> RepositoryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RepositoryResult<T>>,
{
    let mut retry = 0;
    loop {
        match op().await {
            Err(err) if err.is_transient() && retry < policy.attempts => {
                let delay = policy.delay(retry);
                tracing::warn!(
                    operation,
                    attempt = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Storage unavailable, retrying"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(err @ RepositoryError::StorageUnavailable(_)) => {
                tracing::error!(operation, retries = retry, error = %err, "Storage unavailable after all retries");
                return Err(err);
            }
            other => return other,
        }
    }
}
