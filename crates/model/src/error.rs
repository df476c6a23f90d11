//! Validation errors raised at record construction time.

use thiserror::Error;

/// Errors produced by the construction-time validators in [`crate::validate`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModelError {
    #[error("invalid entity type name: {0}")]
    InvalidTypeName(String),
    #[error("invalid span: {0}")]
    InvalidSpan(String),
    #[error("confidence out of range: {0}")]
    InvalidConfidence(String),
    #[error("invalid identifier: {0}")]
    InvalidId(String),
    #[error("evidence does not contain the claim: {0}")]
    EvidenceMismatch(String),
}
