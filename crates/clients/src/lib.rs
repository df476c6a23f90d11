//! Pluggable external services for the strata pipeline.
//!
//! The pipeline talks to three kinds of remote models: a chat LLM, an
//! embedding model, and (indirectly) the stores. This crate owns the first
//! two as traits, [`LlmClient`] and [`EmbeddingClient`], together with the
//! resilience plumbing every call site shares: bounded retry with
//! exponential backoff, a circuit breaker per provider, and a TTL+LRU cache
//! for expensive idempotent lookups.
//!
//! Deterministic in-process implementations ship alongside the traits:
//! [`ScriptedLlm`] replays canned responses per task type and
//! [`HashEmbedder`] produces stable bag-of-tokens vectors, so every test in
//! the workspace runs without a network.

mod cache;
mod circuit_breaker;
mod embed;
mod error;
mod llm;
mod resilient;
mod retry;

pub use cache::{CacheConfig, TtlCache};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use embed::{cosine_similarity, EmbeddingClient, HashEmbedder};
pub use error::ClientError;
pub use llm::{ChatMessage, ChatRole, LlmClient, LlmOptions, ScriptedLlm, TaskType};
pub use resilient::ResilientLlm;
pub use retry::{execute_with_retry, is_retryable, RetryConfig, RetryResult};
