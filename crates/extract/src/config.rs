//! Pass 1 configuration.

use serde::{Deserialize, Serialize};

/// Relation extraction strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelationStrategy {
    /// LLM proposes tuples, validated against concepts and evidence.
    LlmFirst,
    /// Patterns propose, the LLM validates and adjusts confidence.
    Hybrid,
    /// Patterns only. Low precision; kept for offline runs.
    PatternOnly,
}

/// Knobs of the semantic extraction pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pass1Config {
    /// Heuristic extraction when the LLM yields nothing usable.
    pub allow_fallback: bool,
    /// Strict promotion policy: only always-promotable assertion kinds.
    pub strict_promotion: bool,
    /// Confidence floor below which assertions are dropped outright.
    pub min_assertion_confidence: f64,
    /// Concept budget base; the effective budget adapts to section count.
    pub concept_budget_base: usize,
    pub concept_budget_max: usize,
    /// Minimum linking score for assertion → concept matches.
    pub min_link_score: f64,

    /// Build the global view meta-document before analysis.
    pub enable_global_view: bool,
    /// Pointer-based extraction (anti-reformulation).
    pub enable_pointer_mode: bool,
    /// Tokens a pointer label must share with its unit.
    pub pointer_min_shared_tokens: usize,
    /// Iterative concept refinement.
    pub enable_refinement: bool,
    /// Refine while unlinked rate exceeds this…
    pub refinement_rate_threshold: f64,
    /// …and unlinked count exceeds this.
    pub refinement_count_threshold: usize,
    pub refinement_max_iterations: usize,

    /// Bounded worker pool for per-item LLM extraction.
    pub max_workers: usize,

    pub relation_strategy: RelationStrategy,
}

impl Default for Pass1Config {
    fn default() -> Self {
        Self {
            allow_fallback: true,
            strict_promotion: true,
            min_assertion_confidence: 0.40,
            concept_budget_base: 8,
            concept_budget_max: 40,
            min_link_score: 0.3,
            enable_global_view: true,
            enable_pointer_mode: true,
            pointer_min_shared_tokens: 2,
            enable_refinement: true,
            refinement_rate_threshold: 0.10,
            refinement_count_threshold: 20,
            refinement_max_iterations: 3,
            max_workers: 8,
            relation_strategy: RelationStrategy::LlmFirst,
        }
    }
}
