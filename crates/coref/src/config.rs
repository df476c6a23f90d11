//! Pass 0.5 configuration.

use serde::{Deserialize, Serialize};

/// Knobs of the coreference pass. Defaults are the conservative
/// production values; loosen them only for experiments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorefConfig {
    // Pronoun gating.
    pub confidence_threshold: f64,
    pub max_sentence_distance: usize,
    pub max_char_distance: usize,

    // Named↔named gating.
    pub enable_named_gating: bool,
    pub named_jaro_reject: f64,
    pub named_jaro_accept: f64,
    pub named_jaccard_accept: f64,
    pub enable_llm_arbitration: bool,
    /// Optional domain hint forwarded to the arbiter prompt.
    pub domain_context: Option<String>,

    // Processing.
    pub skip_if_exists: bool,
    pub create_concept_alignments: bool,
    pub persist_decisions: bool,

    /// Documents above this size resolve in overlapping batches.
    pub batch_size: usize,
    pub batch_overlap: usize,

    /// Confidence the rule-based engine reports for its clusters.
    pub engine_confidence: f64,
}

impl Default for CorefConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.85,
            max_sentence_distance: 2,
            max_char_distance: 500,
            enable_named_gating: true,
            named_jaro_reject: 0.55,
            named_jaro_accept: 0.95,
            named_jaccard_accept: 0.8,
            enable_llm_arbitration: true,
            domain_context: None,
            skip_if_exists: true,
            create_concept_alignments: true,
            persist_decisions: true,
            batch_size: 50_000,
            batch_overlap: 3_000,
            engine_confidence: 0.9,
        }
    }
}
