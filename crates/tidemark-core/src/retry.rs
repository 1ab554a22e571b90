use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;
use crate::error::CoreError;

/// Bounded retries with exponential backoff for calls to external services.
///
/// Every attempt runs under `call_timeout`; a timeout counts as a transient
/// failure. Non-transient errors are returned immediately.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    call_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, call_timeout: Duration) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            call_timeout,
        }
    }

    /// Delay after the failed attempt numbered `attempt` (starting at 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    pub async fn run<T, E, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<CoreError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e.into(),
                Err(_) => CoreError::Transient(format!(
                    "{operation} timed out after {:?}",
                    self.call_timeout
                )),
            };

            if !error.is_transient() || attempt >= self.max_attempts {
                return Err(error);
            }
            let delay = self.backoff(attempt);
            warn!(operation, attempt, ?delay, error = %error, "transient failure, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tidemark_chain::ChainError;

    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            &RetryConfig {
                max_attempts,
                initial_backoff_ms: 100,
                max_backoff_ms: 350,
            },
            Duration::from_secs(1),
        )
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy(5);
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(350));
        assert_eq!(p.backoff(40), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = policy(3)
            .run("test call", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ChainError::Unavailable("down".into()))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = policy(2)
            .run("test call", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ChainError::Unavailable("down".into()))
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = policy(5)
            .run("test call", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ChainError::InvalidTransactionHash {
                    transaction_number: 1,
                    transaction_time_hash: "h".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(err.is_fork());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out_as_transient() {
        let err = policy(1)
            .run("slow call", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ChainError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Transient(_)));
    }
}
