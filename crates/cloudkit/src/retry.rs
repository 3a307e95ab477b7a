//! Retry logic with exponential backoff for throttled calls.

use crate::error::{Error, Result};
use crate::types::RetryConfig;
use std::future::Future;

/// Execute an async operation with retry logic.
///
/// Retries the operation while it returns a retryable error, sleeping with
/// exponential backoff between attempts. Non-retryable errors and the
/// error of the last attempt are returned as is.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                // If error is not retryable, or this was the last attempt, give up
                if !e.is_retryable() || attempt + 1 >= config.max_attempts {
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt);
                log::warn!(
                    "{label}: attempt {}/{} failed: {e}. Retrying in {:.1}s",
                    attempt + 1,
                    config.max_attempts,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Whether an error should be retried by the API client.
pub(crate) fn is_throttled(err: &Error) -> bool {
    err.is_rate_exceeded()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn network() -> Error {
        Error::Network {
            path: "v3/x".to_string(),
            message: "timeout".to_string(),
        }
    }

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_with_retry_success_first_try() {
        let result = with_retry(&RetryConfig::no_retry(), "op", || async { Ok::<_, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_retry_non_retryable_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<()> = with_retry(&RetryConfig::default(), "op", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(Error::Http {
                    path: "v3/x".to_string(),
                    status: 400,
                    message: "bad request".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_eventual_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = with_retry(&fast(3), "op", || {
            let current = counter.fetch_add(1, Ordering::SeqCst);
            async move { if current < 2 { Err(network()) } else { Ok(42) } }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_all_attempts_fail() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<()> = with_retry(&fast(3), "op", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(network()) }
        })
        .await;

        assert!(matches!(result, Err(Error::Network { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_is_throttled() {
        let err = Error::Http {
            path: "v3/x".to_string(),
            status: 400,
            message: "Rate exceeded".to_string(),
        };
        assert!(is_throttled(&err));
        assert!(!is_throttled(&network()));
    }
}
