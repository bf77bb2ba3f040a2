use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::config::RetryConfig;

/// Marks an error that retrying cannot fix (bad request, auth failure...).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Permanent(pub String);

/// Retry, backoff and timeout policy handed to every external-call site.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
    attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
            attempt_timeout: None,
        }
    }

    /// Single attempt, no timeout.
    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = Some(attempt_timeout);
        self
    }

    /// Retry a future with exponential backoff
    pub async fn retry<F, Fut, T>(&self, operation_name: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let outcome = match self.attempt_timeout {
                Some(limit) => match timeout(limit, f()).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!(
                        "{} timed out after {} ms",
                        operation_name,
                        limit.as_millis()
                    )),
                },
                None => f().await,
            };

            match outcome {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    attempt += 1;
                    if e.downcast_ref::<Permanent>().is_some() {
                        warn!(
                            operation = operation_name,
                            error = %e,
                            "Operation failed with a permanent error, not retrying"
                        );
                        return Err(e);
                    }
                    if attempt > self.max_retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed after max retries"
                        );
                        return Err(e);
                    }

                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis(),
                        error = %e,
                        "Operation failed, retrying"
                    );

                    sleep(backoff).await;

                    backoff = std::cmp::min(backoff * 2, self.max_backoff);
                }
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        let policy = Self::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        );
        if config.request_timeout_secs > 0 {
            policy.with_attempt_timeout(Duration::from_secs(config.request_timeout_secs))
        } else {
            policy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3, 1, 2);

        let result = policy
            .retry("flaky", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    anyhow::bail!("transient {}", n);
                }
                Ok(n)
            })
            .await
            .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(2, 1, 1);

        let result: Result<()> = policy
            .retry("always-down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("down")
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(5, 1, 1);

        let result: Result<()> = policy
            .retry("bad-request", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Permanent("400 Bad Request".into()).into())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_failure() {
        let policy = RetryPolicy::none().with_attempt_timeout(Duration::from_millis(10));

        let result: Result<()> = policy
            .retry("slow", || async {
                sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
