//! Promotion evaluation: PROMOTE, DEFER or REJECT per grade.
//!
//! Thresholds are calibrated precision-first: explicit claims promote
//! cheaply, discursive claims need corroboration across assertions or
//! documents plus bundle diversity.

use serde::{Deserialize, Serialize};
use tracing::debug;

use model::{
    compute_bundle_diversity, compute_semantic_grade, CanonicalRelation, PromotionDecision,
    SemanticGrade, SupportStrength,
};

/// Promotion thresholds per semantic grade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PromotionThresholds {
    pub explicit_min_support: u32,
    pub explicit_min_confidence: f64,
    pub explicit_min_docs: u32,

    pub mixed_min_support: u32,
    pub mixed_min_confidence: f64,
    pub mixed_min_explicit: u32,

    /// Discursive needs this many assertions, or two documents.
    pub discursive_min_support: u32,
    pub discursive_min_confidence: f64,
    pub discursive_min_diversity: f64,

    /// Below this, reject regardless of grade.
    pub absolute_min_confidence: f64,
}

impl Default for PromotionThresholds {
    fn default() -> Self {
        Self {
            explicit_min_support: 1,
            explicit_min_confidence: 0.60,
            explicit_min_docs: 1,
            mixed_min_support: 1,
            mixed_min_confidence: 0.65,
            mixed_min_explicit: 1,
            discursive_min_support: 2,
            discursive_min_confidence: 0.70,
            discursive_min_diversity: 0.33,
            absolute_min_confidence: 0.40,
        }
    }
}

/// Verdict with its justification.
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionResult {
    pub decision: PromotionDecision,
    pub reason: String,
    pub semantic_grade: SemanticGrade,
    pub support: SupportStrength,
    pub warnings: Vec<String>,
}

/// Counters of one promoter's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionStats {
    pub evaluated: usize,
    pub promoted: usize,
    pub deferred: usize,
    pub rejected: usize,
}

/// Evaluates canonical relations against the thresholds.
#[derive(Debug, Default)]
pub struct RelationPromoter {
    thresholds: PromotionThresholds,
    stats: PromotionStats,
}

impl RelationPromoter {
    pub fn new(thresholds: PromotionThresholds) -> Self {
        Self {
            thresholds,
            stats: PromotionStats::default(),
        }
    }

    pub fn stats(&self) -> PromotionStats {
        self.stats
    }

    /// Compute the support strength of a canonical relation.
    pub fn compute_support(&self, canonical: &CanonicalRelation) -> SupportStrength {
        SupportStrength {
            support_count: canonical.total_assertions(),
            explicit_count: canonical.explicit_support_count,
            discursive_count: canonical.discursive_support_count,
            doc_coverage: canonical.distinct_documents,
            distinct_sections: canonical.distinct_sections,
            bundle_diversity: compute_bundle_diversity(canonical.distinct_sections),
        }
    }

    /// Evaluate one canonical relation.
    pub fn evaluate(&mut self, canonical: &CanonicalRelation) -> PromotionResult {
        self.stats.evaluated += 1;

        let grade = compute_semantic_grade(
            canonical.explicit_support_count,
            canonical.discursive_support_count,
        );
        let support = self.compute_support(canonical);
        let confidence = canonical.confidence_p50;
        let t = &self.thresholds;

        let result = if confidence < t.absolute_min_confidence {
            PromotionResult {
                decision: PromotionDecision::Reject,
                reason: format!(
                    "confidence {confidence:.2} below absolute minimum {:.2}",
                    t.absolute_min_confidence
                ),
                semantic_grade: grade,
                support,
                warnings: Vec::new(),
            }
        } else {
            match grade {
                SemanticGrade::Explicit => self.evaluate_explicit(grade, support, confidence),
                SemanticGrade::Mixed => self.evaluate_mixed(grade, support, confidence),
                SemanticGrade::Discursive => self.evaluate_discursive(grade, support, confidence),
            }
        };

        match result.decision {
            PromotionDecision::Promote => self.stats.promoted += 1,
            PromotionDecision::Defer => self.stats.deferred += 1,
            PromotionDecision::Reject => self.stats.rejected += 1,
        }
        debug!(
            relation = %canonical.canonical_relation_id,
            decision = ?result.decision,
            reason = %result.reason,
            "promotion_evaluated"
        );
        result
    }

    fn evaluate_explicit(
        &self,
        grade: SemanticGrade,
        support: SupportStrength,
        confidence: f64,
    ) -> PromotionResult {
        let t = &self.thresholds;
        if support.support_count < t.explicit_min_support {
            return defer(grade, support, format!(
                "explicit support {} below {}",
                support.support_count, t.explicit_min_support
            ));
        }
        if confidence < t.explicit_min_confidence {
            return defer(grade, support, format!(
                "explicit confidence {confidence:.2} below {:.2}",
                t.explicit_min_confidence
            ));
        }
        if support.doc_coverage < t.explicit_min_docs {
            return defer(grade, support, format!(
                "explicit doc coverage {} below {}",
                support.doc_coverage, t.explicit_min_docs
            ));
        }
        promote(grade, support, format!(
            "explicit thresholds met (support={}, conf={confidence:.2})",
            support.support_count
        ))
    }

    fn evaluate_mixed(
        &self,
        grade: SemanticGrade,
        support: SupportStrength,
        confidence: f64,
    ) -> PromotionResult {
        let t = &self.thresholds;
        if support.explicit_count < t.mixed_min_explicit {
            return defer(grade, support, format!(
                "mixed explicit count {} below {}",
                support.explicit_count, t.mixed_min_explicit
            ));
        }
        if support.support_count < t.mixed_min_support {
            return defer(grade, support, format!(
                "mixed support {} below {}",
                support.support_count, t.mixed_min_support
            ));
        }
        if confidence < t.mixed_min_confidence {
            return defer(grade, support, format!(
                "mixed confidence {confidence:.2} below {:.2}",
                t.mixed_min_confidence
            ));
        }
        promote(grade, support, format!(
            "mixed thresholds met (explicit={}, conf={confidence:.2})",
            support.explicit_count
        ))
    }

    fn evaluate_discursive(
        &self,
        grade: SemanticGrade,
        support: SupportStrength,
        confidence: f64,
    ) -> PromotionResult {
        let t = &self.thresholds;
        let mut warnings = Vec::new();

        let support_ok =
            support.support_count >= t.discursive_min_support || support.doc_coverage >= 2;
        if !support_ok {
            return defer(grade, support, format!(
                "discursive support insufficient (assertions={}, docs={})",
                support.support_count, support.doc_coverage
            ));
        }
        if confidence < t.discursive_min_confidence {
            return defer(grade, support, format!(
                "discursive confidence {confidence:.2} below {:.2}",
                t.discursive_min_confidence
            ));
        }
        if support.bundle_diversity < t.discursive_min_diversity {
            if support.doc_coverage >= 2 {
                warnings.push(format!(
                    "low bundle diversity ({:.2}) compensated by multi-doc coverage",
                    support.bundle_diversity
                ));
            } else {
                return defer(grade, support, format!(
                    "discursive bundle diversity {:.2} below {:.2}",
                    support.bundle_diversity, t.discursive_min_diversity
                ));
            }
        }
        PromotionResult {
            decision: PromotionDecision::Promote,
            reason: format!(
                "discursive thresholds met (support={}, docs={}, diversity={:.2}, conf={confidence:.2})",
                support.support_count, support.doc_coverage, support.bundle_diversity
            ),
            semantic_grade: grade,
            support,
            warnings,
        }
    }
}

fn promote(grade: SemanticGrade, support: SupportStrength, reason: String) -> PromotionResult {
    PromotionResult {
        decision: PromotionDecision::Promote,
        reason,
        semantic_grade: grade,
        support,
        warnings: Vec::new(),
    }
}

fn defer(grade: SemanticGrade, support: SupportStrength, reason: String) -> PromotionResult {
    PromotionResult {
        decision: PromotionDecision::Defer,
        reason,
        semantic_grade: grade,
        support,
        warnings: Vec::new(),
    }
}
