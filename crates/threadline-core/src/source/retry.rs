//! Backoff for idempotent backend reads
//!
//! Only failures `FeedError::is_retryable` accepts are repeated. A server
//! Retry-After replaces the computed delay.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::feed::FeedError;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Spread each delay by up to a quarter of itself
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Wait before retry number `attempt` (0-based): doubling, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    fn spread(&self, delay: Duration) -> Duration {
        let quarter = delay.as_millis() as u64 / 4;
        if !self.jitter || quarter == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..quarter))
    }
}

/// Run a backend read, repeating it on transient failures
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, FeedError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, FeedError>>,
{
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= config.max_retries || !err.is_retryable() {
            return Err(err);
        }

        let wait = match err.retry_after() {
            Some(server_wait) => server_wait,
            None => config.spread(config.backoff(attempt)),
        };
        warn!(
            attempt = attempt + 1,
            max_retries = config.max_retries,
            delay_ms = wait.as_millis() as u64,
            "Retrying backend read: {}",
            err
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::feed::CommentId;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let config = RetryConfig::default();
        assert_eq!(config.backoff(0), Duration::from_millis(500));
        assert_eq!(config.backoff(2), Duration::from_secs(2));
        assert_eq!(config.backoff(10), Duration::from_secs(8));
        assert_eq!(config.backoff(u32::MAX), Duration::from_secs(8));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let config = RetryConfig::default();
        for _ in 0..50 {
            let wait = config.spread(Duration::from_secs(4));
            assert!(wait >= Duration::from_secs(4) && wait < Duration::from_secs(5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_from_transient_failure() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        let result = with_retry(&config, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(FeedError::transport("connection reset"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_retries: 1,
            ..RetryConfig::default()
        };
        let result: Result<(), FeedError> = with_retry(&config, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FeedError::Transport {
                status: Some(503),
                message: "unavailable".into(),
                retry_after: Some(Duration::from_secs(1)),
            })
        })
        .await;
        assert!(matches!(
            result,
            Err(FeedError::Transport {
                status: Some(503),
                ..
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_does_not_retry_not_found() {
        let calls = AtomicU32::new(0);
        let result: Result<(), FeedError> = with_retry(&RetryConfig::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FeedError::EntityNotFound(CommentId::new("c1")))
        })
        .await;
        assert!(matches!(result, Err(FeedError::EntityNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
