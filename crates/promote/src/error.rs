//! Errors of the promotion layer.

use thiserror::Error;

use graphnav::GraphError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PromoteError {
    #[error("graph failure during promotion: {0}")]
    Graph(#[from] GraphError),
    #[error("invalid promotion input: {0}")]
    InvalidInput(String),
}
