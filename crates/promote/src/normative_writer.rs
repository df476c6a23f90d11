//! Normative rule and spec fact writer.
//!
//! MERGE semantics on the dedup key: first sighting creates the node,
//! repeats increment `doc_coverage`, append the raw id, and accumulate
//! the source sections so `section_coverage` stays live. Coverage is a
//! first-class retrieval signal downstream. These nodes are indexable
//! and filterable but never traversable.

use serde_json::{json, Map, Value};
use tracing::info;

use graphnav::{doc_key, GraphStore, MergeOp, MergeOutcome};
use model::{fact_dedup_key, rule_dedup_key, NormativeRule, SpecFact};

use crate::PromoteError;

/// Write counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormativeWriteStats {
    pub rules_written: usize,
    pub rules_deduplicated: usize,
    pub facts_written: usize,
    pub facts_deduplicated: usize,
}

/// Writer for rules and facts of one tenant.
pub struct NormativeWriter<'a> {
    store: &'a dyn GraphStore,
    tenant_id: String,
}

impl<'a> NormativeWriter<'a> {
    pub fn new(store: &'a dyn GraphStore, tenant_id: &str) -> Self {
        Self {
            store,
            tenant_id: tenant_id.to_string(),
        }
    }

    pub fn write_rules(&self, rules: &[NormativeRule]) -> Result<NormativeWriteStats, PromoteError> {
        let mut stats = NormativeWriteStats::default();
        for rule in rules {
            let dedup = rule_dedup_key(rule);
            let key = format!("rule:{}:{dedup}", self.tenant_id);

            let mut on_create = Map::new();
            on_create.insert("rule_id".into(), json!(rule.rule_id));
            on_create.insert("dedup_key".into(), json!(dedup));
            on_create.insert("subject_text".into(), json!(rule.subject_text));
            on_create.insert("modality".into(), json!(rule.modality.label()));
            on_create.insert("constraint_kind".into(), json!(rule.constraint_kind));
            on_create.insert("constraint_value".into(), json!(rule.constraint_value));
            on_create.insert("evidence_span".into(), json!(rule.evidence_span));
            on_create.insert("source_doc_id".into(), json!(rule.source_doc_id));
            on_create.insert("confidence".into(), json!(rule.confidence));
            on_create.insert("doc_coverage".into(), json!(1));
            let section = rule.evidence_section.as_deref().unwrap_or("");
            on_create.insert("sections".into(), json!([section]));
            on_create.insert("raw_rule_ids".into(), json!([rule.rule_id]));

            let on_match = [
                MergeOp::Increment { key: "doc_coverage".into(), by: 1 },
                MergeOp::Append { key: "sections".into(), value: json!(section) },
                MergeOp::Append { key: "raw_rule_ids".into(), value: json!(rule.rule_id) },
            ];
            let outcome = self.store.merge_node(
                &key,
                &["NormativeRule"],
                &self.tenant_id,
                on_create,
                &on_match,
            )?;
            match outcome {
                MergeOutcome::Created => stats.rules_written += 1,
                MergeOutcome::Matched => stats.rules_deduplicated += 1,
            }
            self.store.merge_edge(
                &key,
                "EXTRACTED_FROM",
                &doc_key(&self.tenant_id, &rule.source_doc_id),
                Map::new(),
                &[],
            )?;
        }
        info!(
            written = stats.rules_written,
            deduplicated = stats.rules_deduplicated,
            "normative_rules_written"
        );
        Ok(stats)
    }

    pub fn write_facts(&self, facts: &[SpecFact]) -> Result<NormativeWriteStats, PromoteError> {
        let mut stats = NormativeWriteStats::default();
        for fact in facts {
            let dedup = fact_dedup_key(fact);
            let key = format!("fact:{}:{dedup}", self.tenant_id);

            let mut on_create = Map::new();
            on_create.insert("fact_id".into(), json!(fact.fact_id));
            on_create.insert("dedup_key".into(), json!(dedup));
            on_create.insert("attribute_name".into(), json!(fact.attribute_name));
            on_create.insert("spec_type".into(), json!(fact.spec_type));
            on_create.insert("value".into(), json!(fact.value));
            if let Some(numeric) = fact.value_numeric {
                on_create.insert("value_numeric".into(), json!(numeric));
            }
            if let Some(unit) = &fact.unit {
                on_create.insert("unit".into(), json!(unit));
            }
            on_create.insert("source_structure".into(), json!(fact.source_structure));
            on_create.insert("evidence_text".into(), json!(fact.evidence_text));
            on_create.insert("source_doc_id".into(), json!(fact.source_doc_id));
            on_create.insert("confidence".into(), json!(fact.confidence));
            on_create.insert("doc_coverage".into(), json!(1));
            on_create.insert("raw_fact_ids".into(), json!([fact.fact_id]));

            let on_match = [
                MergeOp::Increment { key: "doc_coverage".into(), by: 1 },
                MergeOp::Append { key: "raw_fact_ids".into(), value: json!(fact.fact_id) },
            ];
            let outcome = self.store.merge_node(
                &key,
                &["SpecFact"],
                &self.tenant_id,
                on_create,
                &on_match,
            )?;
            match outcome {
                MergeOutcome::Created => stats.facts_written += 1,
                MergeOutcome::Matched => stats.facts_deduplicated += 1,
            }
            self.store.merge_edge(
                &key,
                "EXTRACTED_FROM",
                &doc_key(&self.tenant_id, &fact.source_doc_id),
                Map::new(),
                &[],
            )?;
        }
        info!(
            written = stats.facts_written,
            deduplicated = stats.facts_deduplicated,
            "spec_facts_written"
        );
        Ok(stats)
    }
}

/// Coverage of a rule node, read back for retrieval signals.
pub fn rule_coverage(store: &dyn GraphStore, key: &str) -> Result<i64, PromoteError> {
    Ok(store
        .get_node(key)?
        .and_then(|n| n.props.get("doc_coverage").and_then(Value::as_i64))
        .unwrap_or(0))
}

/// Distinct source sections of a rule node. Rules sighted outside any
/// section do not count toward coverage.
pub fn rule_section_coverage(store: &dyn GraphStore, key: &str) -> Result<usize, PromoteError> {
    let Some(node) = store.get_node(key)? else {
        return Ok(0);
    };
    let mut sections: Vec<&str> = node
        .props
        .get("sections")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    sections.sort_unstable();
    sections.dedup();
    Ok(sections.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use graphnav::InMemoryGraphStore;
    use model::{ConstraintKind, ExtractionMethod, Modality, SpecSource};

    fn rule(doc: &str, section: Option<&str>) -> NormativeRule {
        NormativeRule {
            rule_id: format!("rule_{doc}"),
            tenant_id: "t1".into(),
            subject_text: "All exports".into(),
            subject_concept_id: None,
            modality: Modality::Must,
            constraint_kind: ConstraintKind::Requirement,
            constraint_value: "be encrypted".into(),
            evidence_span: "All exports must be encrypted.".into(),
            evidence_section: section.map(String::from),
            source_doc_id: doc.into(),
            extraction_method: ExtractionMethod::Pattern,
            confidence: 0.9,
            created_at: Utc::now(),
        }
    }

    fn fact(doc: &str) -> SpecFact {
        SpecFact {
            fact_id: format!("fact_{doc}"),
            tenant_id: "t1".into(),
            attribute_name: "Upload size".into(),
            spec_type: "Limits".into(),
            value: "10 GB".into(),
            value_numeric: Some(10.0),
            unit: Some("GB".into()),
            source_structure: SpecSource::TableRow,
            row_header: Some("Upload size".into()),
            column_header: None,
            evidence_text: "| Upload size | 10 GB |".into(),
            source_doc_id: doc.into(),
            confidence: 0.95,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn same_rule_from_two_docs_merges_with_coverage() {
        let store = InMemoryGraphStore::new();
        let writer = NormativeWriter::new(&store, "t1");

        let stats = writer.write_rules(&[rule("doc_1", Some("Security"))]).unwrap();
        assert_eq!(stats.rules_written, 1);
        let stats = writer.write_rules(&[rule("doc_2", Some("Compliance"))]).unwrap();
        assert_eq!(stats.rules_deduplicated, 1);
        // Same section again: doc coverage grows, section coverage does not.
        writer.write_rules(&[rule("doc_3", Some("Security"))]).unwrap();

        let nodes = store.nodes_with_label("NormativeRule", "t1").unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].props["doc_coverage"], json!(3));
        assert_eq!(
            nodes[0].props["raw_rule_ids"],
            json!(["rule_doc_1", "rule_doc_2", "rule_doc_3"])
        );
        assert_eq!(rule_coverage(&store, &nodes[0].key).unwrap(), 3);
        assert_eq!(rule_section_coverage(&store, &nodes[0].key).unwrap(), 2);
    }

    #[test]
    fn sectionless_sightings_do_not_count_toward_section_coverage() {
        let store = InMemoryGraphStore::new();
        let writer = NormativeWriter::new(&store, "t1");
        writer.write_rules(&[rule("doc_1", None)]).unwrap();
        writer.write_rules(&[rule("doc_2", None)]).unwrap();

        let nodes = store.nodes_with_label("NormativeRule", "t1").unwrap();
        assert_eq!(rule_section_coverage(&store, &nodes[0].key).unwrap(), 0);
        assert_eq!(rule_coverage(&store, &nodes[0].key).unwrap(), 2);
    }

    #[test]
    fn facts_merge_on_dedup_key() {
        let store = InMemoryGraphStore::new();
        let writer = NormativeWriter::new(&store, "t1");
        writer.write_facts(&[fact("doc_1")]).unwrap();
        let stats = writer.write_facts(&[fact("doc_2")]).unwrap();
        assert_eq!(stats.facts_deduplicated, 1);

        let nodes = store.nodes_with_label("SpecFact", "t1").unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].props["value_numeric"], json!(10.0));
    }
}
