//! The graph store seam.
//!
//! A deliberately small, typed trait with merge semantics equivalent to
//! parametrised `MERGE … ON CREATE SET … ON MATCH SET`: create-or-match
//! on a caller-supplied key, with declarative on-match operations so
//! every write is idempotent. Tests and the demo run on the in-memory
//! implementation; production backends adapt a real graph database
//! behind the same trait.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::RwLock;

use crate::GraphError;

/// A node: unique key, one or more labels, tenant scope, properties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub key: String,
    pub labels: Vec<String>,
    pub tenant_id: String,
    pub props: Map<String, Value>,
}

impl NodeRecord {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// A directed edge between two node keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeRecord {
    pub source: String,
    pub rel_type: String,
    pub target: String,
    pub props: Map<String, Value>,
}

/// Whether a merge created or matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created,
    Matched,
}

/// Declarative ON MATCH mutations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MergeOp {
    /// `props[key] += by` (missing starts at 0).
    Increment { key: String, by: i64 },
    /// `props[key].push(value)` (missing starts as []).
    Append { key: String, value: Value },
    /// `props[key] = value`.
    Set { key: String, value: Value },
}

fn apply_ops(props: &mut Map<String, Value>, ops: &[MergeOp]) {
    for op in ops {
        match op {
            MergeOp::Increment { key, by } => {
                let current = props.get(key).and_then(Value::as_i64).unwrap_or(0);
                props.insert(key.clone(), json!(current + by));
            }
            MergeOp::Append { key, value } => {
                match props.get_mut(key).and_then(Value::as_array_mut) {
                    Some(list) => list.push(value.clone()),
                    None => {
                        props.insert(key.clone(), json!([value]));
                    }
                }
            }
            MergeOp::Set { key, value } => {
                props.insert(key.clone(), value.clone());
            }
        }
    }
}

/// The store boundary. Implementations must be `Send + Sync`; all
/// operations are idempotent by construction.
pub trait GraphStore: Send + Sync {
    fn merge_node(
        &self,
        key: &str,
        labels: &[&str],
        tenant_id: &str,
        on_create: Map<String, Value>,
        on_match: &[MergeOp],
    ) -> Result<MergeOutcome, GraphError>;

    fn get_node(&self, key: &str) -> Result<Option<NodeRecord>, GraphError>;

    /// Nodes carrying a label within a tenant, in insertion order.
    fn nodes_with_label(&self, label: &str, tenant_id: &str) -> Result<Vec<NodeRecord>, GraphError>;

    fn merge_edge(
        &self,
        source: &str,
        rel_type: &str,
        target: &str,
        on_create: Map<String, Value>,
        on_match: &[MergeOp],
    ) -> Result<MergeOutcome, GraphError>;

    fn edges_from(&self, source: &str) -> Result<Vec<EdgeRecord>, GraphError>;

    fn edges_to(&self, target: &str) -> Result<Vec<EdgeRecord>, GraphError>;

    /// All edges of one relationship type.
    fn edges_of_type(&self, rel_type: &str) -> Result<Vec<EdgeRecord>, GraphError>;

    fn set_edge_prop(
        &self,
        source: &str,
        rel_type: &str,
        target: &str,
        key: &str,
        value: Value,
    ) -> Result<(), GraphError>;

    fn delete_edge(&self, source: &str, rel_type: &str, target: &str) -> Result<(), GraphError>;

    fn node_count(&self) -> Result<usize, GraphError>;

    fn edge_count(&self) -> Result<usize, GraphError>;
}

type EdgeKey = (String, String, String);

/// In-memory store over insertion-ordered maps, for tests and demos.
#[derive(Default)]
pub struct InMemoryGraphStore {
    nodes: RwLock<IndexMap<String, NodeRecord>>,
    edges: RwLock<IndexMap<EdgeKey, EdgeRecord>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphStore for InMemoryGraphStore {
    fn merge_node(
        &self,
        key: &str,
        labels: &[&str],
        tenant_id: &str,
        on_create: Map<String, Value>,
        on_match: &[MergeOp],
    ) -> Result<MergeOutcome, GraphError> {
        let mut nodes = self.nodes.write().map_err(|_| GraphError::backend("poisoned lock"))?;
        match nodes.get_mut(key) {
            Some(existing) => {
                apply_ops(&mut existing.props, on_match);
                Ok(MergeOutcome::Matched)
            }
            None => {
                nodes.insert(
                    key.to_string(),
                    NodeRecord {
                        key: key.to_string(),
                        labels: labels.iter().map(|l| (*l).to_string()).collect(),
                        tenant_id: tenant_id.to_string(),
                        props: on_create,
                    },
                );
                Ok(MergeOutcome::Created)
            }
        }
    }

    fn get_node(&self, key: &str) -> Result<Option<NodeRecord>, GraphError> {
        let nodes = self.nodes.read().map_err(|_| GraphError::backend("poisoned lock"))?;
        Ok(nodes.get(key).cloned())
    }

    fn nodes_with_label(&self, label: &str, tenant_id: &str) -> Result<Vec<NodeRecord>, GraphError> {
        let nodes = self.nodes.read().map_err(|_| GraphError::backend("poisoned lock"))?;
        Ok(nodes
            .values()
            .filter(|n| n.tenant_id == tenant_id && n.has_label(label))
            .cloned()
            .collect())
    }

    fn merge_edge(
        &self,
        source: &str,
        rel_type: &str,
        target: &str,
        on_create: Map<String, Value>,
        on_match: &[MergeOp],
    ) -> Result<MergeOutcome, GraphError> {
        let key = (source.to_string(), rel_type.to_string(), target.to_string());
        let mut edges = self.edges.write().map_err(|_| GraphError::backend("poisoned lock"))?;
        match edges.get_mut(&key) {
            Some(existing) => {
                apply_ops(&mut existing.props, on_match);
                Ok(MergeOutcome::Matched)
            }
            None => {
                edges.insert(
                    key,
                    EdgeRecord {
                        source: source.to_string(),
                        rel_type: rel_type.to_string(),
                        target: target.to_string(),
                        props: on_create,
                    },
                );
                Ok(MergeOutcome::Created)
            }
        }
    }

    fn edges_from(&self, source: &str) -> Result<Vec<EdgeRecord>, GraphError> {
        let edges = self.edges.read().map_err(|_| GraphError::backend("poisoned lock"))?;
        Ok(edges.values().filter(|e| e.source == source).cloned().collect())
    }

    fn edges_to(&self, target: &str) -> Result<Vec<EdgeRecord>, GraphError> {
        let edges = self.edges.read().map_err(|_| GraphError::backend("poisoned lock"))?;
        Ok(edges.values().filter(|e| e.target == target).cloned().collect())
    }

    fn edges_of_type(&self, rel_type: &str) -> Result<Vec<EdgeRecord>, GraphError> {
        let edges = self.edges.read().map_err(|_| GraphError::backend("poisoned lock"))?;
        Ok(edges.values().filter(|e| e.rel_type == rel_type).cloned().collect())
    }

    fn set_edge_prop(
        &self,
        source: &str,
        rel_type: &str,
        target: &str,
        key: &str,
        value: Value,
    ) -> Result<(), GraphError> {
        let edge_key = (source.to_string(), rel_type.to_string(), target.to_string());
        let mut edges = self.edges.write().map_err(|_| GraphError::backend("poisoned lock"))?;
        match edges.get_mut(&edge_key) {
            Some(edge) => {
                edge.props.insert(key.to_string(), value);
                Ok(())
            }
            None => Err(GraphError::NotFound(format!(
                "edge {source}-[{rel_type}]->{target}"
            ))),
        }
    }

    fn delete_edge(&self, source: &str, rel_type: &str, target: &str) -> Result<(), GraphError> {
        let edge_key = (source.to_string(), rel_type.to_string(), target.to_string());
        let mut edges = self.edges.write().map_err(|_| GraphError::backend("poisoned lock"))?;
        edges.shift_remove(&edge_key);
        Ok(())
    }

    fn node_count(&self) -> Result<usize, GraphError> {
        Ok(self.nodes.read().map_err(|_| GraphError::backend("poisoned lock"))?.len())
    }

    fn edge_count(&self) -> Result<usize, GraphError> {
        Ok(self.edges.read().map_err(|_| GraphError::backend("poisoned lock"))?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn merge_node_is_idempotent_with_on_match_ops() {
        let store = InMemoryGraphStore::new();
        let outcome = store
            .merge_node("rule:t:k1", &["NormativeRule"], "t", props(&[("doc_coverage", json!(1))]), &[])
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Created);

        let outcome = store
            .merge_node(
                "rule:t:k1",
                &["NormativeRule"],
                "t",
                props(&[]),
                &[MergeOp::Increment { key: "doc_coverage".into(), by: 1 }],
            )
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Matched);

        let node = store.get_node("rule:t:k1").unwrap().unwrap();
        assert_eq!(node.props["doc_coverage"], json!(2));
        assert_eq!(store.node_count().unwrap(), 1);
    }

    #[test]
    fn merge_edge_increments_and_appends() {
        let store = InMemoryGraphStore::new();
        store
            .merge_edge(
                "c1",
                "MENTIONED_IN",
                "ctx1",
                props(&[("count", json!(1)), ("ids", json!(["a"]))]),
                &[],
            )
            .unwrap();
        store
            .merge_edge(
                "c1",
                "MENTIONED_IN",
                "ctx1",
                props(&[]),
                &[
                    MergeOp::Increment { key: "count".into(), by: 2 },
                    MergeOp::Append { key: "ids".into(), value: json!("b") },
                ],
            )
            .unwrap();

        let edges = store.edges_of_type("MENTIONED_IN").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].props["count"], json!(3));
        assert_eq!(edges[0].props["ids"], json!(["a", "b"]));
    }

    #[test]
    fn label_and_tenant_filters_apply() {
        let store = InMemoryGraphStore::new();
        store
            .merge_node("c1", &["CanonicalConcept"], "t1", props(&[]), &[])
            .unwrap();
        store
            .merge_node("c2", &["CanonicalConcept"], "t2", props(&[]), &[])
            .unwrap();
        store
            .merge_node("ctx1", &["ContextNode", "SectionContext"], "t1", props(&[]), &[])
            .unwrap();

        assert_eq!(store.nodes_with_label("CanonicalConcept", "t1").unwrap().len(), 1);
        assert_eq!(store.nodes_with_label("ContextNode", "t1").unwrap().len(), 1);
        assert_eq!(store.nodes_with_label("SectionContext", "t1").unwrap().len(), 1);
    }

    #[test]
    fn set_edge_prop_requires_existing_edge() {
        let store = InMemoryGraphStore::new();
        let err = store.set_edge_prop("a", "R", "b", "weight", json!(0.5));
        assert!(matches!(err, Err(GraphError::NotFound(_))));
    }
}
