//! Conservative pronoun gating.
//!
//! A pronoun link is only admitted when the engine is confident and the
//! antecedent is close; everything else abstains. Abstention is recorded,
//! never silently dropped.

use model::{CorefOutcome, CorefReasonCode, CorefScope};

use crate::config::CorefConfig;
use crate::engine::{expletive_set, pronoun_set};

/// A candidate antecedent for one pronoun.
#[derive(Debug, Clone)]
pub struct GatingCandidate {
    pub mention_id: String,
    pub surface: String,
    pub engine_confidence: f64,
    pub sentence_distance: usize,
    pub char_distance: usize,
}

/// Verdict of the pronoun gate.
#[derive(Debug, Clone)]
pub struct GatingResult {
    pub outcome: CorefOutcome,
    pub reason_code: CorefReasonCode,
    pub confidence: f64,
    pub scope: CorefScope,
    /// Index of the accepted candidate, when resolved.
    pub candidate_idx: Option<usize>,
}

/// Pronoun gating policy with the conservative thresholds.
#[derive(Debug, Clone)]
pub struct PronounGate {
    confidence_threshold: f64,
    max_sentence_distance: usize,
    max_char_distance: usize,
}

impl PronounGate {
    pub fn new(cfg: &CorefConfig) -> Self {
        Self {
            confidence_threshold: cfg.confidence_threshold,
            max_sentence_distance: cfg.max_sentence_distance,
            max_char_distance: cfg.max_char_distance,
        }
    }

    /// Evaluate candidates for one pronoun, best candidate first.
    pub fn evaluate(&self, pronoun: &str, lang: &str, candidates: &[GatingCandidate]) -> GatingResult {
        let lower = pronoun.to_lowercase();

        if expletive_set(lang).contains(&lower.as_str()) {
            return GatingResult {
                outcome: CorefOutcome::NonReferential,
                reason_code: CorefReasonCode::NonReferentialPronoun,
                confidence: 0.0,
                scope: CorefScope::Sentence,
                candidate_idx: None,
            };
        }
        if !pronoun_set(lang).contains(&lower.as_str()) {
            return GatingResult {
                outcome: CorefOutcome::NonReferential,
                reason_code: CorefReasonCode::NonReferentialPronoun,
                confidence: 0.0,
                scope: CorefScope::Sentence,
                candidate_idx: None,
            };
        }
        if candidates.is_empty() {
            return GatingResult {
                outcome: CorefOutcome::Abstain,
                reason_code: CorefReasonCode::NoCandidate,
                confidence: 0.0,
                scope: CorefScope::Sentence,
                candidate_idx: None,
            };
        }

        let mut last_reason = CorefReasonCode::NoCandidate;
        for (idx, candidate) in candidates.iter().enumerate() {
            if candidate.engine_confidence < self.confidence_threshold {
                last_reason = CorefReasonCode::LowEngineConfidence;
                continue;
            }
            if candidate.sentence_distance > self.max_sentence_distance {
                last_reason = CorefReasonCode::SentenceDistanceExceeded;
                continue;
            }
            if candidate.char_distance > self.max_char_distance {
                last_reason = CorefReasonCode::CharDistanceExceeded;
                continue;
            }
            let scope = if candidate.sentence_distance == 0 {
                CorefScope::Sentence
            } else {
                CorefScope::Window
            };
            return GatingResult {
                outcome: CorefOutcome::Resolved,
                reason_code: CorefReasonCode::GatePassed,
                confidence: candidate.engine_confidence,
                scope,
                candidate_idx: Some(idx),
            };
        }

        GatingResult {
            outcome: CorefOutcome::Abstain,
            reason_code: last_reason,
            confidence: 0.0,
            scope: CorefScope::Sentence,
            candidate_idx: None,
        }
    }
}
