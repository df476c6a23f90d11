//! The vector store seam.
//!
//! A minimal trait with the filter grammar the retriever needs:
//! `match_value`, `match_any`, and must / must-not combinators. The
//! in-memory implementation scores by cosine over normalized vectors.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::RwLock;

use clients::cosine_similarity;

use crate::RetrieveError;

/// One condition of a payload filter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FilterCondition {
    MatchValue { key: String, value: Value },
    MatchAny { key: String, values: Vec<Value> },
}

impl FilterCondition {
    fn matches(&self, payload: &Map<String, Value>) -> bool {
        match self {
            FilterCondition::MatchValue { key, value } => payload.get(key) == Some(value),
            FilterCondition::MatchAny { key, values } => payload
                .get(key)
                .map(|v| values.contains(v))
                .unwrap_or(false),
        }
    }
}

/// Boolean combination of conditions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    pub must: Vec<FilterCondition>,
    pub must_not: Vec<FilterCondition>,
}

impl Filter {
    pub fn matches(&self, payload: &Map<String, Value>) -> bool {
        self.must.iter().all(|c| c.matches(payload))
            && !self.must_not.iter().any(|c| c.matches(payload))
    }
}

/// A stored point: id, vector, payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

/// A scored search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Map<String, Value>,
}

/// The store boundary.
pub trait VectorStore: Send + Sync {
    fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<(), RetrieveError>;

    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, RetrieveError>;

    fn point_count(&self, collection: &str) -> Result<usize, RetrieveError>;
}

/// In-memory cosine store for tests and demos.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, IndexMap<String, VectorPoint>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<(), RetrieveError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| RetrieveError::store("poisoned lock"))?;
        let entry = collections.entry(collection.to_string()).or_default();
        for point in points {
            entry.insert(point.id.clone(), point);
        }
        Ok(())
    }

    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, RetrieveError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| RetrieveError::store("poisoned lock"))?;
        let Some(points) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<ScoredPoint> = points
            .values()
            .filter(|p| filter.matches(&p.payload))
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: cosine_similarity(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    fn point_count(&self, collection: &str) -> Result<usize, RetrieveError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| RetrieveError::store("poisoned lock"))?;
        Ok(collections.get(collection).map(IndexMap::len).unwrap_or(0))
    }
}
