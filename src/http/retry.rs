//! Bounded retry for transient failures.

use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

use super::error::HttpError;
use super::options::RequestOptions;
use crate::config::ClientConfig;

/// Retries applied when neither the call nor the client configures any.
pub const DEFAULT_RETRY_COUNT: usize = 0;

/// Delay between retry attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// How a single call is allowed to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub retries: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Per-call settings win over the client configuration.
    pub fn resolve(options: &RequestOptions, config: &ClientConfig) -> Self {
        Self {
            enabled: options.enable_retry,
            retries: options.retry_count.unwrap_or(config.retry_count),
            delay: config.retry_delay,
        }
    }

    fn allows(&self, remaining: usize, error: &HttpError) -> bool {
        self.enabled && remaining > 0 && error.is_retryable()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            retries: DEFAULT_RETRY_COUNT,
            delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable code, or
/// runs out of retries. Attempts never overlap: each one settles before the
/// delay and the next submission. The last error is propagated unchanged.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, HttpError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, HttpError>>,
{
    let mut remaining = policy.retries;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !policy.allows(remaining, &e) {
                    debug!("{}: giving up after attempt {}: {}", operation_name, attempt, e);
                    return Err(e);
                }

                warn!(
                    "{}: attempt {} failed ({}), {} retries left, retrying in {}ms...",
                    operation_name,
                    attempt,
                    e,
                    remaining,
                    policy.delay.as_millis()
                );
                remaining -= 1;
                attempt += 1;
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ErrorCode;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(retries: usize) -> RetryPolicy {
        RetryPolicy {
            enabled: true,
            retries,
            delay: Duration::from_millis(1000),
        }
    }

    #[test]
    fn test_resolve_prefers_call_over_config() {
        let config = ClientConfig {
            retry_count: 4,
            retry_delay: Duration::from_millis(250),
            ..ClientConfig::default()
        };

        let resolved = RetryPolicy::resolve(&RequestOptions::new(), &config);
        assert_eq!(resolved.retries, 4);
        assert_eq!(resolved.delay, Duration::from_millis(250));
        assert!(resolved.enabled);

        let resolved = RetryPolicy::resolve(&RequestOptions::new().retries(1), &config);
        assert_eq!(resolved.retries, 1);

        let resolved = RetryPolicy::resolve(&RequestOptions::new().without_retry(), &config);
        assert!(!resolved.enabled);
    }

    #[test]
    fn test_default_policy_does_not_retry() {
        let resolved = RetryPolicy::resolve(&RequestOptions::new(), &ClientConfig::default());
        assert_eq!(resolved.retries, DEFAULT_RETRY_COUNT);
        assert_eq!(RetryPolicy::default().retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_success() {
        let result = with_retry("test", policy(3), || async { Ok::<_, HttpError>("success") }).await;
        assert_eq!(result.unwrap(), "success");
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_stops_on_non_retryable() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let counter = call_count.clone();

        let result = with_retry("test", policy(3), || {
            let count = counter.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(HttpError::new("not found", ErrorCode::Status(404)))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().code, ErrorCode::Status(404));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_recovers_from_transient_failure() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let counter = call_count.clone();

        let result = with_retry("test", policy(3), || {
            let count = counter.clone();
            async move {
                let current = count.fetch_add(1, Ordering::SeqCst);
                if current < 2 {
                    Err(HttpError::new("unavailable", ErrorCode::ServiceUnavailable))
                } else {
                    Ok("success after retries")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success after retries");
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_makes_at_most_n_plus_one_attempts() {
        for retries in 0..4 {
            let call_count = Arc::new(AtomicUsize::new(0));
            let counter = call_count.clone();

            let result = with_retry("test", policy(retries), || {
                let count = counter.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HttpError::new("bad gateway", ErrorCode::BadGateway))
                }
            })
            .await;

            assert_eq!(result.unwrap_err().code, ErrorCode::BadGateway);
            assert_eq!(call_count.load(Ordering::SeqCst), retries + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_disabled() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let counter = call_count.clone();
        let disabled = RetryPolicy {
            enabled: false,
            ..policy(5)
        };

        let result = with_retry("test", disabled, || {
            let count = counter.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(HttpError::new("timeout", ErrorCode::RequestTimeout))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_waits_between_attempts() {
        let start = tokio::time::Instant::now();

        let _ = with_retry("test", policy(2), || async {
            Err::<(), _>(HttpError::new("boom", ErrorCode::InternalServerError))
        })
        .await;

        assert!(start.elapsed() >= Duration::from_millis(2000));
    }
}
