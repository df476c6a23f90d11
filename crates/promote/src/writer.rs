//! Semantic relation writer.
//!
//! Creates the SemanticRelation node, its bookkeeping edges
//! (`PROMOTED_FROM`, `SEMANTIC_SUBJECT`, `SEMANTIC_OBJECT`) and the
//! traversable kind-labelled edge between the two concepts. Writes are
//! idempotent, and promotion is monotonic: a later batch may strengthen
//! a relation but never weaken its tier or grade.

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::info;

use graphnav::{concept_key, GraphStore, MergeOp};
use model::{
    short_hash, CanonicalRelation, DefensibilityTier, SemanticGrade, SemanticRelation,
    SupportStrength,
};

use crate::PromoteError;

/// Writer bound to one store and tenant.
pub struct SemanticRelationWriter<'a> {
    store: &'a dyn GraphStore,
    tenant_id: String,
}

impl<'a> SemanticRelationWriter<'a> {
    pub fn new(store: &'a dyn GraphStore, tenant_id: &str) -> Self {
        Self {
            store,
            tenant_id: tenant_id.to_string(),
        }
    }

    /// Persist a promoted relation. Returns the written record, with the
    /// tier/grade kept monotonic against any existing promotion.
    pub fn write(
        &self,
        canonical: &CanonicalRelation,
        grade: SemanticGrade,
        tier: DefensibilityTier,
        support: SupportStrength,
        promotion_reason: &str,
    ) -> Result<SemanticRelation, PromoteError> {
        let relation_id = format!(
            "srel_{}",
            short_hash(&canonical.canonical_relation_id)
        );
        let node_key = format!("srel:{}:{}", self.tenant_id, relation_id);

        // Monotonicity: never demote an existing promotion.
        let (final_grade, final_tier) = match self.store.get_node(&node_key)? {
            Some(existing) => {
                let existing_tier = existing
                    .props
                    .get("defensibility_tier")
                    .and_then(Value::as_str)
                    .and_then(parse_tier)
                    .unwrap_or(tier);
                let existing_grade = existing
                    .props
                    .get("semantic_grade")
                    .and_then(Value::as_str)
                    .and_then(parse_grade)
                    .unwrap_or(grade);
                (strongest_grade(existing_grade, grade), existing_tier.min(tier))
            }
            None => (grade, tier),
        };

        let mut on_create = Map::new();
        on_create.insert("relation_id".into(), json!(relation_id));
        on_create.insert("canonical_relation_id".into(), json!(canonical.canonical_relation_id));
        on_create.insert("kind".into(), json!(canonical.kind.label()));
        on_create.insert("semantic_grade".into(), json!(final_grade.label()));
        on_create.insert("defensibility_tier".into(), json!(final_tier.label()));
        on_create.insert("confidence".into(), json!(canonical.confidence_p50));
        on_create.insert("support_count".into(), json!(support.support_count));
        on_create.insert("promoted_at".into(), json!(Utc::now().to_rfc3339()));
        on_create.insert("promotion_reason".into(), json!(promotion_reason));

        let on_match = [
            MergeOp::Set { key: "semantic_grade".into(), value: json!(final_grade.label()) },
            MergeOp::Set { key: "defensibility_tier".into(), value: json!(final_tier.label()) },
            MergeOp::Set { key: "confidence".into(), value: json!(canonical.confidence_p50) },
            MergeOp::Set { key: "support_count".into(), value: json!(support.support_count) },
            MergeOp::Set { key: "promotion_reason".into(), value: json!(promotion_reason) },
        ];
        self.store.merge_node(
            &node_key,
            &["SemanticRelation"],
            &self.tenant_id,
            on_create,
            &on_match,
        )?;

        // Bookkeeping edges.
        self.store.merge_edge(
            &node_key,
            "PROMOTED_FROM",
            &canonical.canonical_relation_id,
            Map::new(),
            &[],
        )?;
        let subject_key = concept_key(&self.tenant_id, &canonical.subject_concept_id);
        let object_key = concept_key(&self.tenant_id, &canonical.object_concept_id);
        self.store
            .merge_edge(&node_key, "SEMANTIC_SUBJECT", &subject_key, Map::new(), &[])?;
        self.store
            .merge_edge(&node_key, "SEMANTIC_OBJECT", &object_key, Map::new(), &[])?;

        // The traversable edge the planner walks.
        let mut edge_props = Map::new();
        edge_props.insert("relation_id".into(), json!(relation_id));
        edge_props.insert("confidence".into(), json!(canonical.confidence_p50));
        edge_props.insert("semantic_grade".into(), json!(final_grade.label()));
        edge_props.insert("defensibility_tier".into(), json!(final_tier.label()));
        self.store.merge_edge(
            &subject_key,
            canonical.kind.label(),
            &object_key,
            edge_props,
            &[
                MergeOp::Set { key: "confidence".into(), value: json!(canonical.confidence_p50) },
                MergeOp::Set { key: "semantic_grade".into(), value: json!(final_grade.label()) },
                MergeOp::Set {
                    key: "defensibility_tier".into(),
                    value: json!(final_tier.label()),
                },
            ],
        )?;

        info!(
            relation_id = %relation_id,
            kind = canonical.kind.label(),
            grade = final_grade.label(),
            tier = final_tier.label(),
            "semantic_relation_written"
        );

        Ok(SemanticRelation {
            relation_id,
            tenant_id: self.tenant_id.clone(),
            canonical_relation_id: canonical.canonical_relation_id.clone(),
            subject_concept_id: canonical.subject_concept_id.clone(),
            kind: canonical.kind,
            object_concept_id: canonical.object_concept_id.clone(),
            semantic_grade: final_grade,
            defensibility_tier: final_tier,
            support,
            confidence: canonical.confidence_p50,
            promoted_at: Utc::now(),
            promotion_reason: promotion_reason.to_string(),
        })
    }
}

fn parse_tier(label: &str) -> Option<DefensibilityTier> {
    match label {
        "STRICT" => Some(DefensibilityTier::Strict),
        "EXTENDED" => Some(DefensibilityTier::Extended),
        "EXPERIMENTAL" => Some(DefensibilityTier::Experimental),
        _ => None,
    }
}

fn parse_grade(label: &str) -> Option<SemanticGrade> {
    match label {
        "EXPLICIT" => Some(SemanticGrade::Explicit),
        "MIXED" => Some(SemanticGrade::Mixed),
        "DISCURSIVE" => Some(SemanticGrade::Discursive),
        _ => None,
    }
}

/// Grade strength order for monotonic upgrades: EXPLICIT > MIXED > DISCURSIVE.
fn strongest_grade(a: SemanticGrade, b: SemanticGrade) -> SemanticGrade {
    let rank = |g: SemanticGrade| match g {
        SemanticGrade::Explicit => 2,
        SemanticGrade::Mixed => 1,
        SemanticGrade::Discursive => 0,
    };
    if rank(a) >= rank(b) {
        a
    } else {
        b
    }
}
