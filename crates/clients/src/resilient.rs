//! Resilient LLM wrapper: retry + circuit breaker around any provider.
//!
//! Call sites stay oblivious: the wrapper is itself an [`LlmClient`].
//! Transient failures consume the bounded retry budget; repeated
//! failures open the breaker and fail fast until the provider recovers.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::llm::{ChatMessage, LlmClient, LlmOptions, TaskType};
use crate::retry::{execute_with_retry, RetryConfig};
use crate::ClientError;

/// Wraps a provider with the shared resilience policy.
pub struct ResilientLlm {
    inner: Arc<dyn LlmClient>,
    retry: RetryConfig,
    breaker: CircuitBreaker,
    call_timeout: Duration,
    provider: String,
}

impl ResilientLlm {
    pub fn new(inner: Arc<dyn LlmClient>, provider: impl Into<String>) -> Self {
        Self::with_configs(
            inner,
            provider,
            RetryConfig::default(),
            CircuitBreakerConfig::default(),
        )
    }

    pub fn with_configs(
        inner: Arc<dyn LlmClient>,
        provider: impl Into<String>,
        retry: RetryConfig,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            inner,
            retry,
            breaker: CircuitBreaker::new(breaker),
            call_timeout: Duration::from_secs(60),
            provider: provider.into(),
        }
    }

    /// Per-call deadline; a call past it counts as a transient failure.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

#[async_trait]
impl LlmClient for ResilientLlm {
    async fn complete(
        &self,
        task: TaskType,
        messages: &[ChatMessage],
        options: &LlmOptions,
    ) -> Result<String, ClientError> {
        if !self.breaker.allow_request() {
            return Err(ClientError::CircuitOpen(self.provider.clone()));
        }
        let result = execute_with_retry(&self.retry, |_attempt| async {
            match timeout(self.call_timeout, self.inner.complete(task, messages, options)).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::Transient(format!(
                    "call exceeded {:?} deadline",
                    self.call_timeout
                ))),
            }
        })
        .await
        .into_result();
        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlakyLlm {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for FlakyLlm {
        async fn complete(
            &self,
            _task: TaskType,
            _messages: &[ChatMessage],
            _options: &LlmOptions,
        ) -> Result<String, ClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err(ClientError::Transient("503".into()))
            } else {
                Ok("answer".into())
            }
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_through() {
        let flaky = Arc::new(FlakyLlm {
            failures_before_success: 2,
            calls: AtomicU32::new(0),
        });
        let llm = ResilientLlm::with_configs(
            flaky,
            "test",
            RetryConfig::default().with_base_delay(Duration::from_millis(1)),
            CircuitBreakerConfig::default(),
        );
        let out = llm
            .complete(TaskType::LongTextSummary, &[ChatMessage::user("q")], &LlmOptions::default())
            .await
            .unwrap();
        assert_eq!(out, "answer");
    }

    #[tokio::test]
    async fn persistent_failures_open_the_breaker() {
        let broken = Arc::new(FlakyLlm {
            failures_before_success: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let llm = ResilientLlm::with_configs(
            broken,
            "test",
            RetryConfig {
                max_retries: 0,
                base_delay_ms: 1,
                max_delay_ms: 1,
                backoff_multiplier: 1.0,
            },
            CircuitBreakerConfig::default().with_failure_threshold(2),
        );
        let messages = [ChatMessage::user("q")];
        let options = LlmOptions::default();
        for _ in 0..2 {
            let _ = llm
                .complete(TaskType::LongTextSummary, &messages, &options)
                .await;
        }
        let err = llm
            .complete(TaskType::LongTextSummary, &messages, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::CircuitOpen(_)));
    }
}
