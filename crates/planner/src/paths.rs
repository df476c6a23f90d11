//! Semantic path search over the typed graph store.
//!
//! Bounded-depth enumeration of simple paths between two concepts over
//! the semantic relation set, treating edges as undirected. Every edge
//! must clear the tier filter; path confidence is the product of edge
//! confidences; the k best paths by confidence are kept, which stands in
//! for a Yen-style k-shortest search on a store without projections.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use graphnav::{EdgeRecord, GraphStore};
use model::{compute_path_tier, DefensibilityTier, RelationKind, SemanticGrade};

use crate::PlannerError;

/// Path search bounds.
pub const MAX_PATH_HOPS: usize = 3;
pub const MAX_PATHS: usize = 5;
pub const MIN_PATH_CONFIDENCE: f64 = 0.3;

/// A semantic path between two concepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticPath {
    /// Concept node keys along the path.
    pub node_keys: Vec<String>,
    /// Canonical names along the path, when known.
    pub node_names: Vec<String>,
    /// Relation labels along the path.
    pub relations: Vec<String>,
    /// Product of edge confidences.
    pub confidence: f64,
    pub length: usize,
    pub edge_tiers: Vec<DefensibilityTier>,
    pub edge_grades: Vec<SemanticGrade>,
    /// Weakest tier on the path.
    pub path_tier: DefensibilityTier,
    /// Set when edge grades mix in a way the policy should know about.
    pub semantic_integrity_warning: Option<String>,
    /// Section context ids collected via MENTIONED_IN for the path nodes.
    pub evidence_context_ids: Vec<String>,
}

fn edge_tier(edge: &EdgeRecord) -> DefensibilityTier {
    match edge.props.get("defensibility_tier").and_then(Value::as_str) {
        Some("EXTENDED") => DefensibilityTier::Extended,
        Some("EXPERIMENTAL") => DefensibilityTier::Experimental,
        // Untiered legacy edges are treated as STRICT.
        _ => DefensibilityTier::Strict,
    }
}

fn edge_grade(edge: &EdgeRecord) -> SemanticGrade {
    match edge.props.get("semantic_grade").and_then(Value::as_str) {
        Some("MIXED") => SemanticGrade::Mixed,
        Some("DISCURSIVE") => SemanticGrade::Discursive,
        _ => SemanticGrade::Explicit,
    }
}

fn edge_confidence(edge: &EdgeRecord) -> f64 {
    edge.props
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
}

fn is_semantic(rel_type: &str) -> bool {
    RelationKind::semantic_set()
        .iter()
        .any(|k| k.label() == rel_type)
}

/// Mixed explicit/discursive paths are flagged, never silently promoted.
pub fn validate_path_semantic_integrity(grades: &[SemanticGrade]) -> Option<String> {
    let has_explicit = grades
        .iter()
        .any(|g| matches!(g, SemanticGrade::Explicit | SemanticGrade::Mixed));
    let has_discursive = grades.iter().any(|g| *g == SemanticGrade::Discursive);
    if has_explicit && has_discursive {
        Some("path mixes explicit and discursive edges".to_string())
    } else {
        None
    }
}

/// Find the best tier-admissible paths between two concept keys.
pub fn find_paths(
    store: &dyn GraphStore,
    source_key: &str,
    target_key: &str,
    allowed_tiers: &BTreeSet<DefensibilityTier>,
) -> Result<Vec<SemanticPath>, PlannerError> {
    let mut found: Vec<SemanticPath> = Vec::new();
    let mut stack: Vec<(String, Vec<String>, Vec<EdgeRecord>)> = vec![(
        source_key.to_string(),
        vec![source_key.to_string()],
        Vec::new(),
    )];

    while let Some((current, nodes, edges)) = stack.pop() {
        if edges.len() >= MAX_PATH_HOPS {
            continue;
        }
        // Undirected step: outgoing and incoming semantic edges.
        let mut neighbors: Vec<(String, EdgeRecord)> = Vec::new();
        for edge in store.edges_from(&current)? {
            if is_semantic(&edge.rel_type) {
                neighbors.push((edge.target.clone(), edge));
            }
        }
        for edge in store.edges_to(&current)? {
            if is_semantic(&edge.rel_type) {
                neighbors.push((edge.source.clone(), edge));
            }
        }

        for (next, edge) in neighbors {
            if nodes.contains(&next) {
                continue;
            }
            if !allowed_tiers.contains(&edge_tier(&edge)) {
                continue;
            }
            let mut next_nodes = nodes.clone();
            next_nodes.push(next.clone());
            let mut next_edges = edges.clone();
            next_edges.push(edge);

            if next == target_key {
                let confidence: f64 = next_edges.iter().map(edge_confidence).product();
                if confidence >= MIN_PATH_CONFIDENCE {
                    found.push(build_path(store, next_nodes, &next_edges, confidence)?);
                }
                continue;
            }
            stack.push((next, next_nodes, next_edges));
        }
    }

    found.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    found.truncate(MAX_PATHS);
    debug!(
        source = source_key,
        target = target_key,
        paths = found.len(),
        "semantic_path_search"
    );
    Ok(found)
}

fn build_path(
    store: &dyn GraphStore,
    node_keys: Vec<String>,
    edges: &[EdgeRecord],
    confidence: f64,
) -> Result<SemanticPath, PlannerError> {
    let node_names = node_keys
        .iter()
        .map(|key| {
            Ok(store
                .get_node(key)?
                .and_then(|n| {
                    n.props
                        .get("canonical_name")
                        .and_then(Value::as_str)
                        .map(String::from)
                })
                .unwrap_or_else(|| key.clone()))
        })
        .collect::<Result<Vec<_>, PlannerError>>()?;
    let edge_tiers: Vec<DefensibilityTier> = edges.iter().map(edge_tier).collect();
    let edge_grades: Vec<SemanticGrade> = edges.iter().map(edge_grade).collect();
    Ok(SemanticPath {
        relations: edges.iter().map(|e| e.rel_type.clone()).collect(),
        length: edges.len(),
        path_tier: compute_path_tier(&edge_tiers),
        semantic_integrity_warning: validate_path_semantic_integrity(&edge_grades),
        evidence_context_ids: Vec::new(),
        node_keys,
        node_names,
        confidence,
        edge_tiers,
        edge_grades,
    })
}

/// Collect section context ids mentioned by the path's concepts,
/// strongest mentions first, capped at 50.
pub fn collect_path_evidence(
    store: &dyn GraphStore,
    node_keys: &[String],
) -> Result<Vec<String>, PlannerError> {
    let mut weighted: Vec<(String, f64)> = Vec::new();
    for key in node_keys {
        for edge in store.edges_from(key)? {
            if edge.rel_type != "MENTIONED_IN" {
                continue;
            }
            let is_section = store
                .get_node(&edge.target)?
                .map(|n| n.has_label("SectionContext"))
                .unwrap_or(false);
            if !is_section {
                continue;
            }
            let weight = edge.props.get("weight").and_then(Value::as_f64).unwrap_or(0.0);
            weighted.push((edge.target, weight));
        }
    }
    weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let mut seen = BTreeSet::new();
    Ok(weighted
        .into_iter()
        .filter(|(id, _)| seen.insert(id.clone()))
        .take(50)
        .map(|(id, _)| id)
        .collect())
}
