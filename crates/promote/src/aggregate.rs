//! Canonical relation aggregation.
//!
//! Typed relation candidates from every document roll up into one
//! CanonicalRelation node per (tenant, subject, kind, object), merged in
//! the graph store so repeat ingestion is idempotent and cross-document
//! support accumulates naturally.

use serde_json::{json, Map, Value};
use tracing::debug;

use extract::TypedRelation;
use graphnav::{GraphStore, MergeOp};
use model::{CanonicalRelation, RelationKind, SemanticGrade};

use crate::PromoteError;

/// Store key of a canonical relation.
pub fn canonical_relation_key(
    tenant_id: &str,
    subject: &str,
    kind: RelationKind,
    object: &str,
) -> String {
    format!("crel:{tenant_id}:{subject}|{}|{object}", kind.label())
}

/// Merge one document's typed relations into the aggregate nodes.
/// Returns the affected canonical relation keys.
pub fn aggregate_relations(
    store: &dyn GraphStore,
    tenant_id: &str,
    doc_id: &str,
    relations: &[TypedRelation],
) -> Result<Vec<String>, PromoteError> {
    let mut touched = Vec::new();
    for relation in relations {
        let key = canonical_relation_key(
            tenant_id,
            &relation.subject_concept_id,
            relation.kind,
            &relation.object_concept_id,
        );
        let explicit = u32::from(relation.grade_hint == SemanticGrade::Explicit);
        let discursive = u32::from(relation.grade_hint == SemanticGrade::Discursive);
        let sections: Vec<&str> = relation
            .evidence
            .iter()
            .map(|e| e.chunk_id.as_str())
            .collect();

        let mut on_create = Map::new();
        on_create.insert("subject".into(), json!(relation.subject_concept_id));
        on_create.insert("kind".into(), json!(relation.kind.label()));
        on_create.insert("object".into(), json!(relation.object_concept_id));
        on_create.insert("explicit_support_count".into(), json!(explicit));
        on_create.insert("discursive_support_count".into(), json!(discursive));
        on_create.insert("doc_ids".into(), json!([doc_id]));
        on_create.insert("section_ids".into(), json!(sections));
        on_create.insert("confidences".into(), json!([relation.confidence]));
        on_create.insert("has_marker".into(), json!(relation.has_marker));
        on_create.insert("span_count".into(), json!(relation.evidence.len()));

        let mut on_match = vec![
            MergeOp::Increment { key: "explicit_support_count".into(), by: i64::from(explicit) },
            MergeOp::Increment { key: "discursive_support_count".into(), by: i64::from(discursive) },
            MergeOp::Increment { key: "span_count".into(), by: relation.evidence.len() as i64 },
            MergeOp::Append { key: "doc_ids".into(), value: json!(doc_id) },
            MergeOp::Append { key: "confidences".into(), value: json!(relation.confidence) },
        ];
        for section in &sections {
            on_match.push(MergeOp::Append { key: "section_ids".into(), value: json!(section) });
        }
        if relation.has_marker {
            on_match.push(MergeOp::Set { key: "has_marker".into(), value: json!(true) });
        }

        store.merge_node(&key, &["CanonicalRelation"], tenant_id, on_create, &on_match)?;
        if !touched.contains(&key) {
            touched.push(key);
        }
    }
    debug!(relations = relations.len(), aggregates = touched.len(), "relations_aggregated");
    Ok(touched)
}

/// Read one aggregate node back into a [`CanonicalRelation`].
pub fn read_canonical_relation(
    store: &dyn GraphStore,
    key: &str,
) -> Result<Option<CanonicalRelation>, PromoteError> {
    let Some(node) = store.get_node(key)? else {
        return Ok(None);
    };
    let str_prop = |name: &str| {
        node.props
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let count_prop = |name: &str| node.props.get(name).and_then(Value::as_i64).unwrap_or(0) as u32;
    let distinct = |name: &str| {
        node.props
            .get(name)
            .and_then(Value::as_array)
            .map(|list| {
                let mut values: Vec<&str> = list.iter().filter_map(Value::as_str).collect();
                values.sort_unstable();
                values.dedup();
                values.len() as u32
            })
            .unwrap_or(0)
    };

    let mut confidences: Vec<f64> = node
        .props
        .get("confidences")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();
    confidences.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let confidence_p50 = if confidences.is_empty() {
        0.0
    } else {
        confidences[confidences.len() / 2]
    };

    let kind = RelationKind::semantic_set()
        .iter()
        .copied()
        .find(|k| k.label() == str_prop("kind"))
        .unwrap_or(RelationKind::Unknown);

    Ok(Some(CanonicalRelation {
        canonical_relation_id: key.to_string(),
        tenant_id: node.tenant_id.clone(),
        subject_concept_id: str_prop("subject"),
        kind,
        object_concept_id: str_prop("object"),
        explicit_support_count: count_prop("explicit_support_count"),
        discursive_support_count: count_prop("discursive_support_count"),
        distinct_documents: distinct("doc_ids"),
        distinct_sections: distinct("section_ids"),
        confidence_p50,
    }))
}

/// Marker and span bookkeeping needed by tier attribution.
pub fn read_tier_inputs(
    store: &dyn GraphStore,
    key: &str,
) -> Result<(bool, usize), PromoteError> {
    let Some(node) = store.get_node(key)? else {
        return Ok((false, 0));
    };
    let has_marker = node
        .props
        .get("has_marker")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let span_count = node
        .props
        .get("span_count")
        .and_then(Value::as_i64)
        .unwrap_or(0) as usize;
    Ok((has_marker, span_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::EvidenceSpan;
    use graphnav::InMemoryGraphStore;
    use model::ExtractionMethod;

    fn relation(grade: SemanticGrade, confidence: f64, chunk: &str) -> TypedRelation {
        TypedRelation {
            subject_concept_id: "con_a".into(),
            kind: RelationKind::Requires,
            object_concept_id: "con_b".into(),
            method: ExtractionMethod::Llm,
            confidence,
            evidence: vec![EvidenceSpan {
                chunk_id: chunk.into(),
                text: "evidence".into(),
            }],
            grade_hint: grade,
            has_marker: grade == SemanticGrade::Explicit,
        }
    }

    #[test]
    fn cross_document_support_accumulates() {
        let store = InMemoryGraphStore::new();
        let keys = aggregate_relations(
            &store,
            "t1",
            "doc_1",
            &[relation(SemanticGrade::Discursive, 0.8, "ch_1")],
        )
        .unwrap();
        aggregate_relations(
            &store,
            "t1",
            "doc_2",
            &[relation(SemanticGrade::Explicit, 0.9, "ch_2")],
        )
        .unwrap();

        let canonical = read_canonical_relation(&store, &keys[0]).unwrap().unwrap();
        assert_eq!(canonical.explicit_support_count, 1);
        assert_eq!(canonical.discursive_support_count, 1);
        assert_eq!(canonical.distinct_documents, 2);
        assert_eq!(canonical.distinct_sections, 2);
        assert!(canonical.confidence_p50 >= 0.8);

        let (has_marker, span_count) = read_tier_inputs(&store, &keys[0]).unwrap();
        assert!(has_marker);
        assert_eq!(span_count, 2);
    }

    #[test]
    fn reingestion_of_same_doc_is_detectable_by_doc_ids() {
        let store = InMemoryGraphStore::new();
        let rels = [relation(SemanticGrade::Explicit, 0.9, "ch_1")];
        let keys = aggregate_relations(&store, "t1", "doc_1", &rels).unwrap();
        aggregate_relations(&store, "t1", "doc_1", &rels).unwrap();

        let canonical = read_canonical_relation(&store, &keys[0]).unwrap().unwrap();
        // Same document twice: support grows but distinct docs stay at 1.
        assert_eq!(canonical.distinct_documents, 1);
        assert_eq!(store.node_count().unwrap(), 1);
    }
}
