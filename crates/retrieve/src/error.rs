//! Errors of the retrieval stage.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RetrieveError {
    #[error("vector store failure: {0}")]
    Store(String),
    #[error("embedding failure: {0}")]
    Embedding(String),
    #[error("synthesis failure: {0}")]
    Synthesis(String),
}

impl RetrieveError {
    pub fn store(msg: impl Into<String>) -> Self {
        RetrieveError::Store(msg.into())
    }
}
