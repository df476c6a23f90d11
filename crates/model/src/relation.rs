//! Concepts, assertions, typed relations, grades and tiers.
//!
//! The aggregation path is: unit-anchored [`RawAssertion`]s roll up into a
//! [`CanonicalRelation`] per (subject, kind, object); when promotion
//! thresholds hold, the aggregate is promoted to a [`SemanticRelation`]
//! carrying a [`SemanticGrade`] and a [`DefensibilityTier`]. Only semantic
//! relations are ever traversed by the planner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Anchor;

/// Review status of a canonical concept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConceptStatus {
    Pending,
    Approved,
    Rejected,
}

/// A normalized, tenant-unique reference to an entity or term.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalConcept {
    pub canonical_id: String,
    pub tenant_id: String,
    pub canonical_name: String,
    /// Registry type name, UPPERCASE ("PRODUCT", "TOPIC", …).
    pub concept_type: String,
    pub surface_forms: Vec<String>,
    pub quality_score: f64,
    /// Number of assertions citing this concept.
    pub support: u32,
    pub status: ConceptStatus,
}

/// Rhetorical classification of an assertion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssertionKind {
    Definitional,
    Prescriptive,
    Causal,
    Comparative,
    Factual,
    Conditional,
    Permissive,
    Procedural,
}

impl AssertionKind {
    /// Kinds promotable under the strict policy without further evidence.
    pub fn always_promotable(self) -> bool {
        matches!(
            self,
            AssertionKind::Definitional
                | AssertionKind::Prescriptive
                | AssertionKind::Factual
                | AssertionKind::Causal
        )
    }
}

/// A classified, anchored textual claim extracted from one unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawAssertion {
    pub assertion_id: String,
    pub tenant_id: String,
    pub source_doc_id: String,
    pub text: String,
    pub kind: AssertionKind,
    pub confidence: f64,
    pub anchor: Anchor,
}

/// How a typed relation was extracted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Pattern,
    Llm,
    Hybrid,
    Inferred,
}

/// Closed set of relation kinds between canonical concepts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum RelationKind {
    // Structural
    PartOf,
    SubtypeOf,
    // Dependency
    Requires,
    Uses,
    // Integration
    IntegratesWith,
    Extends,
    // Capability
    Enables,
    // Temporal
    VersionOf,
    Precedes,
    Replaces,
    Deprecates,
    // Variant
    AlternativeTo,
    ChoiceBetween,
    // Governance
    AppliesTo,
    GovernedBy,
    // Causal / constraint
    Causes,
    Prevents,
    Mitigates,
    // Definitional / instance
    Defines,
    ExampleOf,
    // Special
    AssociatedWith,
    ConflictsWith,
    Unknown,
}

impl RelationKind {
    /// Graph edge label, e.g. `REQUIRES`.
    pub fn label(self) -> &'static str {
        match self {
            RelationKind::PartOf => "PART_OF",
            RelationKind::SubtypeOf => "SUBTYPE_OF",
            RelationKind::Requires => "REQUIRES",
            RelationKind::Uses => "USES",
            RelationKind::IntegratesWith => "INTEGRATES_WITH",
            RelationKind::Extends => "EXTENDS",
            RelationKind::Enables => "ENABLES",
            RelationKind::VersionOf => "VERSION_OF",
            RelationKind::Precedes => "PRECEDES",
            RelationKind::Replaces => "REPLACES",
            RelationKind::Deprecates => "DEPRECATES",
            RelationKind::AlternativeTo => "ALTERNATIVE_TO",
            RelationKind::ChoiceBetween => "CHOICE_BETWEEN",
            RelationKind::AppliesTo => "APPLIES_TO",
            RelationKind::GovernedBy => "GOVERNED_BY",
            RelationKind::Causes => "CAUSES",
            RelationKind::Prevents => "PREVENTS",
            RelationKind::Mitigates => "MITIGATES",
            RelationKind::Defines => "DEFINES",
            RelationKind::ExampleOf => "EXAMPLE_OF",
            RelationKind::AssociatedWith => "ASSOCIATED_WITH",
            RelationKind::ConflictsWith => "CONFLICTS_WITH",
            RelationKind::Unknown => "UNKNOWN",
        }
    }

    /// All kinds the planner may ever traverse. `Unknown` is excluded.
    pub fn semantic_set() -> &'static [RelationKind] {
        use RelationKind::*;
        &[
            PartOf,
            SubtypeOf,
            Requires,
            Uses,
            IntegratesWith,
            Extends,
            Enables,
            VersionOf,
            Precedes,
            Replaces,
            Deprecates,
            AlternativeTo,
            ChoiceBetween,
            AppliesTo,
            GovernedBy,
            Causes,
            Prevents,
            Mitigates,
            Defines,
            ExampleOf,
            AssociatedWith,
            ConflictsWith,
        ]
    }
}

/// How a relation was evidenced across its support.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SemanticGrade {
    Explicit,
    Mixed,
    Discursive,
}

impl SemanticGrade {
    pub fn label(self) -> &'static str {
        match self {
            SemanticGrade::Explicit => "EXPLICIT",
            SemanticGrade::Mixed => "MIXED",
            SemanticGrade::Discursive => "DISCURSIVE",
        }
    }
}

/// Runtime-authorization label gating which relations the planner may walk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DefensibilityTier {
    Strict,
    Extended,
    Experimental,
}

impl DefensibilityTier {
    pub fn label(self) -> &'static str {
        match self {
            DefensibilityTier::Strict => "STRICT",
            DefensibilityTier::Extended => "EXTENDED",
            DefensibilityTier::Experimental => "EXPERIMENTAL",
        }
    }
}

/// Linguistic basis a discursive claim rests on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DiscursiveBasis {
    ChoiceSet,
    Enumeration,
    Apposition,
    DiscourseInference,
}

/// Promotion verdict for one canonical relation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionDecision {
    Promote,
    Defer,
    Reject,
}

/// Support composition of a canonical relation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SupportStrength {
    pub support_count: u32,
    pub explicit_count: u32,
    pub discursive_count: u32,
    pub doc_coverage: u32,
    pub distinct_sections: u32,
    pub bundle_diversity: f64,
}

/// Aggregate over raw assertions sharing subject, kind and object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalRelation {
    pub canonical_relation_id: String,
    pub tenant_id: String,
    pub subject_concept_id: String,
    pub kind: RelationKind,
    pub object_concept_id: String,
    pub explicit_support_count: u32,
    pub discursive_support_count: u32,
    pub distinct_documents: u32,
    pub distinct_sections: u32,
    /// Median confidence over the supporting assertions.
    pub confidence_p50: f64,
}

impl CanonicalRelation {
    pub fn total_assertions(&self) -> u32 {
        self.explicit_support_count + self.discursive_support_count
    }
}

/// A promoted, grade- and tier-labelled edge between two concepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticRelation {
    pub relation_id: String,
    pub tenant_id: String,
    pub canonical_relation_id: String,
    pub subject_concept_id: String,
    pub kind: RelationKind,
    pub object_concept_id: String,
    pub semantic_grade: SemanticGrade,
    pub defensibility_tier: DefensibilityTier,
    pub support: SupportStrength,
    pub confidence: f64,
    pub promoted_at: DateTime<Utc>,
    pub promotion_reason: String,
}

/// Grade is a pure function of the support composition.
pub fn compute_semantic_grade(explicit: u32, discursive: u32) -> SemanticGrade {
    match (explicit, discursive) {
        (e, 0) if e > 0 => SemanticGrade::Explicit,
        (0, d) if d > 0 => SemanticGrade::Discursive,
        _ => SemanticGrade::Mixed,
    }
}

/// Diversity of the evidence bundle: saturates at three distinct sections.
pub fn compute_bundle_diversity(distinct_sections: u32) -> f64 {
    (f64::from(distinct_sections.min(3)) / 3.0 * 100.0).round() / 100.0
}

/// Effective tier of a path is its weakest edge.
pub fn compute_path_tier(edge_tiers: &[DefensibilityTier]) -> DefensibilityTier {
    edge_tiers
        .iter()
        .copied()
        .max()
        .unwrap_or(DefensibilityTier::Strict)
}
