//! Error and abstention surface of the extraction pass.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard failures of the extraction pass.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExtractError {
    #[error("llm failure: {0}")]
    Llm(String),
    #[error("embedding failure: {0}")]
    Embedding(String),
    #[error("document has no extractable content")]
    EmptyDocument,
}

/// Why an extractor chose not to emit. Abstentions are logged with their
/// reason and never surface as errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum AbstainReason {
    NoConceptMatch,
    AnchorNotFound,
    LowConfidence,
    PolicyRejected,
    NotVerbatim,
    UnknownUnit,
    LabelNotGrounded,
    SubjectMissing,
}
