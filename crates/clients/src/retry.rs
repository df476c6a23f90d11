//! Retry logic with exponential backoff for model calls.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::ClientError;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    /// Initial delay, the base for exponential backoff, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Delay before a given attempt (0 = first try, no delay).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }
        let exponential =
            self.base_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
        Duration::from_millis(exponential.min(self.max_delay_ms as f64) as u64)
    }
}

/// Outcome of a retried operation.
#[derive(Debug, Clone)]
pub struct RetryResult<T> {
    pub result: Result<T, ClientError>,
    /// 1 = first try succeeded.
    pub attempts: u32,
    pub total_duration: Duration,
}

impl<T> RetryResult<T> {
    pub fn into_result(self) -> Result<T, ClientError> {
        self.result
    }
}

/// Classify an error message as retryable. Timeouts, connection failures
/// and 5xx/429 class responses retry; 4xx class responses do not.
pub fn is_retryable(error: &ClientError) -> bool {
    match error {
        ClientError::Transient(_) => true,
        ClientError::Rejected(_) | ClientError::BadResponse(_) | ClientError::CircuitOpen(_) => {
            false
        }
        _ => false,
    }
}

/// Drive an async operation through the retry budget. Only transient
/// errors consume retries; the first non-retryable error is returned as-is.
pub async fn execute_with_retry<T, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let start = Instant::now();
    let mut last_error: Option<ClientError> = None;

    for attempt in 0..=config.max_retries {
        let delay = config.calculate_delay(attempt);
        if delay > Duration::from_millis(0) {
            sleep(delay).await;
        }

        match operation(attempt).await {
            Ok(value) => {
                return RetryResult {
                    result: Ok(value),
                    attempts: attempt + 1,
                    total_duration: start.elapsed(),
                };
            }
            Err(err) => {
                let retryable = is_retryable(&err);
                last_error = Some(err);
                if !retryable {
                    return RetryResult {
                        result: Err(last_error.unwrap()),
                        attempts: attempt + 1,
                        total_duration: start.elapsed(),
                    };
                }
            }
        }
    }

    let last = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "all retries exhausted".to_string());
    RetryResult {
        result: Err(ClientError::RetriesExhausted(last)),
        attempts: config.max_retries + 1,
        total_duration: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_is_exponential_and_capped() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 300,
            backoff_multiplier: 2.0,
        };
        assert_eq!(config.calculate_delay(0), Duration::from_millis(0));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(config.calculate_delay(3), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn transient_errors_consume_retries() {
        let config = RetryConfig::default().with_base_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = execute_with_retry(&config, |_attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ClientError::Transient("503".into()))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.attempts, 3);
        assert_eq!(result.result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn rejections_fail_fast() {
        let config = RetryConfig::default().with_base_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: RetryResult<()> = execute_with_retry(&config, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ClientError::Rejected("403".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result.result, Err(ClientError::Rejected(_))));
    }

    #[tokio::test]
    async fn exhaustion_reports_last_error() {
        let config = RetryConfig {
            max_retries: 1,
            base_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 2.0,
        };

        let result: RetryResult<()> = execute_with_retry(&config, |_attempt| async {
            Err(ClientError::Transient("timeout".into()))
        })
        .await;

        assert_eq!(result.attempts, 2);
        assert!(matches!(result.result, Err(ClientError::RetriesExhausted(msg)) if msg.contains("timeout")));
    }
}
