//! Error types produced by the structural pass.

use thiserror::Error;

/// Failures during parsing and structural indexing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IngestError {
    #[error("invalid utf-8 payload: {0}")]
    InvalidUtf8(String),
    #[error("document produced no structural items")]
    EmptyDocument,
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    #[error("parser failure: {0}")]
    Parser(String),
}
