//! Error types of the coreference pass.

use thiserror::Error;

/// Failures of the coreference pipeline. Abstentions are not errors;
/// they are recorded as decisions inside the result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CorefError {
    #[error("document has no resolvable text")]
    EmptyDocument,
    #[error("engine failure: {0}")]
    Engine(String),
}
