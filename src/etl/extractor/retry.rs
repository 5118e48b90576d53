//! Retry policy for RPC calls made by extractors and chain readers.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Exponential backoff for transient node failures (rate limits, timeouts, 5xx).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 tries once.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Single attempt, used by tests and one-shot replays.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Backoff to wait after `backoff`, capped at `max_backoff`.
    pub fn next_backoff(&self, backoff: Duration) -> Duration {
        Duration::from_secs_f64(
            (backoff.as_secs_f64() * self.backoff_multiplier).min(self.max_backoff.as_secs_f64()),
        )
    }

    /// Run `operation` until it succeeds or the retries are exhausted.
    ///
    /// `label` names the operation in logs and in the `credindex_rpc_retries_total` counter.
    ///
    /// ```rust,ignore
    /// let head = policy.execute("eth_blockNumber", || client.block_number()).await?;
    /// ```
    pub async fn execute<F, Fut, T>(&self, label: &'static str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempts > 0 {
                        tracing::info!(
                            target: "credindex::etl::retry",
                            operation = label,
                            "Operation succeeded after {} attempt(s)",
                            attempts + 1
                        );
                    }
                    return Ok(result);
                }
                Err(err) => {
                    attempts += 1;

                    if attempts > self.max_retries {
                        tracing::error!(
                            target: "credindex::etl::retry",
                            operation = label,
                            "Operation failed after {} attempts: {:?}",
                            attempts,
                            err
                        );
                        return Err(err);
                    }

                    metrics::counter!("credindex_rpc_retries_total", "operation" => label).increment(1);
                    tracing::warn!(
                        target: "credindex::etl::retry",
                        operation = label,
                        "Operation failed (attempt {}/{}): {:?}. Retrying in {:?}...",
                        attempts,
                        self.max_retries + 1,
                        err,
                        backoff
                    );

                    sleep(backoff).await;
                    backoff = self.next_backoff(backoff);
                }
            }
        }
    }
}
