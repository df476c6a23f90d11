//! Defensibility tier attribution.
//!
//! Tier rules:
//! - EXPLICIT → STRICT, always.
//! - MIXED → STRICT (at least one explicit witness grounds the claim).
//! - DISCURSIVE → STRICT only when the basis matrix allows the relation
//!   kind and an explicit textual marker is present; relations inferred
//!   without any evidence span land in EXPERIMENTAL; forbidden kinds
//!   reject outright. The matrix is plain data supplied by deployments.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use model::{DefensibilityTier, DiscursiveBasis, ExtractionMethod, RelationKind, SemanticGrade};

/// Outcome of tier attribution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TierOutcome {
    Tier(DefensibilityTier),
    /// The relation kind must never be carried by discursive evidence.
    Rejected,
}

/// Externally-supplied table of (kind, basis) pairs that may reach
/// STRICT at DISCURSIVE grade, plus kinds that reject outright.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierMatrix {
    strict_pairs: HashSet<(RelationKind, DiscursiveBasis)>,
    forbidden_kinds: HashSet<RelationKind>,
}

impl TierMatrix {
    pub fn new(
        strict_pairs: impl IntoIterator<Item = (RelationKind, DiscursiveBasis)>,
        forbidden_kinds: impl IntoIterator<Item = RelationKind>,
    ) -> Self {
        Self {
            strict_pairs: strict_pairs.into_iter().collect(),
            forbidden_kinds: forbidden_kinds.into_iter().collect(),
        }
    }

    pub fn allows_strict(&self, kind: RelationKind, bases: &[DiscursiveBasis]) -> bool {
        !bases.is_empty()
            && bases
                .iter()
                .all(|basis| self.strict_pairs.contains(&(kind, *basis)))
    }

    pub fn is_forbidden(&self, kind: RelationKind) -> bool {
        self.forbidden_kinds.contains(&kind)
    }
}

impl Default for TierMatrix {
    /// Conservative default: only linguistically well-determined bases
    /// (choice sets, enumerations, appositions) can carry definitional
    /// and variant kinds to STRICT; causal and lifecycle kinds never
    /// rest on discursive evidence alone.
    fn default() -> Self {
        use DiscursiveBasis::*;
        use RelationKind::*;
        let strict_kinds = [Defines, ExampleOf, ChoiceBetween, AlternativeTo];
        let bases = [ChoiceSet, Enumeration, Apposition];
        let strict_pairs = strict_kinds
            .into_iter()
            .flat_map(|kind| bases.into_iter().map(move |basis| (kind, basis)));
        Self::new(
            strict_pairs,
            [Causes, Prevents, Replaces, Deprecates, ConflictsWith],
        )
    }
}

/// Compute the tier for a relation candidate.
pub fn compute_defensibility_tier(
    grade: SemanticGrade,
    discursive_bases: &[DiscursiveBasis],
    kind: RelationKind,
    method: ExtractionMethod,
    span_count: usize,
    has_marker_in_text: bool,
    matrix: &TierMatrix,
) -> TierOutcome {
    match grade {
        SemanticGrade::Explicit | SemanticGrade::Mixed => {
            TierOutcome::Tier(DefensibilityTier::Strict)
        }
        SemanticGrade::Discursive => {
            if matrix.is_forbidden(kind) {
                return TierOutcome::Rejected;
            }
            if method == ExtractionMethod::Inferred || span_count == 0 {
                return TierOutcome::Tier(DefensibilityTier::Experimental);
            }
            if has_marker_in_text && matrix.allows_strict(kind, discursive_bases) {
                TierOutcome::Tier(DefensibilityTier::Strict)
            } else {
                TierOutcome::Tier(DefensibilityTier::Extended)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_and_mixed_are_strict() {
        let matrix = TierMatrix::default();
        for grade in [SemanticGrade::Explicit, SemanticGrade::Mixed] {
            let outcome = compute_defensibility_tier(
                grade,
                &[],
                RelationKind::Requires,
                ExtractionMethod::Llm,
                1,
                true,
                &matrix,
            );
            assert_eq!(outcome, TierOutcome::Tier(DefensibilityTier::Strict));
        }
    }

    #[test]
    fn discursive_defaults_to_extended() {
        let matrix = TierMatrix::default();
        let outcome = compute_defensibility_tier(
            SemanticGrade::Discursive,
            &[DiscursiveBasis::DiscourseInference],
            RelationKind::Requires,
            ExtractionMethod::Llm,
            2,
            false,
            &matrix,
        );
        assert_eq!(outcome, TierOutcome::Tier(DefensibilityTier::Extended));
    }

    #[test]
    fn basis_matrix_can_reach_strict_with_marker() {
        let matrix = TierMatrix::default();
        let outcome = compute_defensibility_tier(
            SemanticGrade::Discursive,
            &[DiscursiveBasis::ChoiceSet],
            RelationKind::ChoiceBetween,
            ExtractionMethod::Llm,
            2,
            true,
            &matrix,
        );
        assert_eq!(outcome, TierOutcome::Tier(DefensibilityTier::Strict));

        // Same kind and basis, but no marker: only EXTENDED.
        let outcome = compute_defensibility_tier(
            SemanticGrade::Discursive,
            &[DiscursiveBasis::ChoiceSet],
            RelationKind::ChoiceBetween,
            ExtractionMethod::Llm,
            2,
            false,
            &matrix,
        );
        assert_eq!(outcome, TierOutcome::Tier(DefensibilityTier::Extended));
    }

    #[test]
    fn forbidden_kinds_reject_at_discursive() {
        let matrix = TierMatrix::default();
        let outcome = compute_defensibility_tier(
            SemanticGrade::Discursive,
            &[DiscursiveBasis::Enumeration],
            RelationKind::Causes,
            ExtractionMethod::Llm,
            3,
            true,
            &matrix,
        );
        assert_eq!(outcome, TierOutcome::Rejected);
    }

    #[test]
    fn inferred_or_spanless_claims_are_experimental() {
        let matrix = TierMatrix::default();
        let outcome = compute_defensibility_tier(
            SemanticGrade::Discursive,
            &[DiscursiveBasis::Enumeration],
            RelationKind::Uses,
            ExtractionMethod::Inferred,
            3,
            true,
            &matrix,
        );
        assert_eq!(outcome, TierOutcome::Tier(DefensibilityTier::Experimental));

        let outcome = compute_defensibility_tier(
            SemanticGrade::Discursive,
            &[],
            RelationKind::Uses,
            ExtractionMethod::Llm,
            0,
            false,
            &matrix,
        );
        assert_eq!(outcome, TierOutcome::Tier(DefensibilityTier::Experimental));
    }
}
