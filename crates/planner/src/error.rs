//! Errors of the planner.

use thiserror::Error;

use graphnav::GraphError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PlannerError {
    #[error("graph failure during planning: {0}")]
    Graph(#[from] GraphError),
    #[error("embedding failure during planning: {0}")]
    Embedding(String),
}
