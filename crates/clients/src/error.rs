//! Error surface shared by the LLM and embedding clients.

use thiserror::Error;

/// Failures surfaced by external model calls.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClientError {
    /// Timeout or retryable transport failure; eligible for retry.
    #[error("transient failure: {0}")]
    Transient(String),
    /// The provider answered but the payload is unusable.
    #[error("bad response: {0}")]
    BadResponse(String),
    /// Circuit breaker is open for this provider.
    #[error("circuit open for provider {0}")]
    CircuitOpen(String),
    /// Non-retryable provider rejection (auth, quota class, 4xx).
    #[error("rejected by provider: {0}")]
    Rejected(String),
    /// Retry budget exhausted; carries the last error text.
    #[error("retries exhausted: {0}")]
    RetriesExhausted(String),
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }
}
