//! Errors of the graph layer.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GraphError {
    #[error("graph backend failure: {0}")]
    Backend(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl GraphError {
    pub fn backend(msg: impl Into<String>) -> Self {
        GraphError::Backend(msg.into())
    }
}
