use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::debug;

/// Exponential backoff policy for async operations.
///
/// The delay before retry `n` (1-based) is `base_delay * 2^(n-1)`.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Five attempts, backoff doubling from half a second.
    pub fn default_network() -> Self {
        Self::new(5, Duration::from_millis(500))
    }

    pub fn delay_for(&self, retry: usize) -> Duration {
        let factor = 2_u32.saturating_pow(retry.saturating_sub(1) as u32);
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `op` until it succeeds, `retryable` rejects the error, or the
    /// attempt budget is spent. The last error is returned as-is.
    pub async fn retry_async<F, Fut, T, E, P>(&self, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(val) => return Ok(val),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
                    sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_network()
    }
}
