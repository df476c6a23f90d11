//! Promotion layer: from aggregated evidence to traversable knowledge.
//!
//! Typed relation candidates accumulate into canonical aggregates; the
//! promoter grades their support, the tier rules decide how defensible
//! the claim is, and the writers persist the result idempotently. A
//! relation whose only support is discursive never reaches STRICT
//! without the basis matrix and an explicit marker vouching for it.

mod aggregate;
mod error;
mod normative_writer;
mod promoter;
mod tier;
mod writer;

pub use aggregate::{
    aggregate_relations, canonical_relation_key, read_canonical_relation, read_tier_inputs,
};
pub use error::PromoteError;
pub use normative_writer::{
    rule_coverage, rule_section_coverage, NormativeWriteStats, NormativeWriter,
};
pub use promoter::{PromotionResult, PromotionStats, PromotionThresholds, RelationPromoter};
pub use tier::{compute_defensibility_tier, TierMatrix, TierOutcome};
pub use writer::SemanticRelationWriter;

use extract::TypedRelation;
use graphnav::GraphStore;
use model::{DiscursiveBasis, ExtractionMethod, PromotionDecision, SemanticRelation};
use tracing::info;

/// Run the full promotion pass for one document's relations: aggregate,
/// evaluate, attribute tiers, write. Returns the promoted relations.
pub fn promote_document_relations(
    store: &dyn GraphStore,
    tenant_id: &str,
    doc_id: &str,
    relations: &[TypedRelation],
    thresholds: &PromotionThresholds,
    matrix: &TierMatrix,
) -> Result<Vec<SemanticRelation>, PromoteError> {
    let touched = aggregate_relations(store, tenant_id, doc_id, relations)?;
    let mut promoter = RelationPromoter::new(*thresholds);
    let writer = SemanticRelationWriter::new(store, tenant_id);
    let mut promoted = Vec::new();

    for key in touched {
        let Some(canonical) = read_canonical_relation(store, &key)? else {
            continue;
        };
        let result = promoter.evaluate(&canonical);
        if result.decision != PromotionDecision::Promote {
            continue;
        }
        let (has_marker, span_count) = read_tier_inputs(store, &key)?;
        // The recorded bases for purely discursive aggregates: the
        // extractor only distinguishes discourse inference today, so the
        // matrix sees the weakest basis unless a marker is present.
        let bases: Vec<DiscursiveBasis> = if canonical.discursive_support_count > 0 {
            vec![DiscursiveBasis::DiscourseInference]
        } else {
            Vec::new()
        };
        let outcome = compute_defensibility_tier(
            result.semantic_grade,
            &bases,
            canonical.kind,
            ExtractionMethod::Llm,
            span_count,
            has_marker,
            matrix,
        );
        let tier = match outcome {
            TierOutcome::Tier(tier) => tier,
            TierOutcome::Rejected => continue,
        };
        promoted.push(writer.write(
            &canonical,
            result.semantic_grade,
            tier,
            result.support,
            &result.reason,
        )?);
    }

    info!(
        doc_id,
        candidates = relations.len(),
        promoted = promoted.len(),
        "promotion_pass_complete"
    );
    Ok(promoted)
}
