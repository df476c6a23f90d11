//! Retrieval configuration.

use serde::{Deserialize, Serialize};

/// Knobs of the retrieval stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrieveConfig {
    pub collection: String,
    pub top_k: usize,
    /// Vector-score floor applied before reranking.
    pub score_floor: f64,
}

impl Default for RetrieveConfig {
    fn default() -> Self {
        Self {
            collection: "knowbase".into(),
            top_k: 10,
            score_floor: 0.5,
        }
    }
}
