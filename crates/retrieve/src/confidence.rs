//! Auditable answer confidence.
//!
//! The score is assembled from transparent parts (vector base, reranker
//! base, diversity, knowledge-graph bonus, cross-document chain bonus)
//! and capped: the system never claims more than 0.90 certainty. The
//! step values are empirical and tunable; the shape (monotonic in every
//! signal) is the contract.

use serde::{Deserialize, Serialize};

use crate::retriever::RetrievedChunk;

/// Knowledge-graph signals accompanying an answer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct KgSignals {
    pub concepts_count: usize,
    pub relations_count: usize,
    pub sources_count: usize,
    pub avg_confidence: f64,
}

/// Cross-document chain signals.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ChainSignals {
    pub chain_count: usize,
    pub distinct_docs_count: usize,
    pub max_hops: usize,
}

/// Tunable coefficients. Defaults mirror the calibrated production
/// values; the hard cap is not negotiable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceConfig {
    pub diversity_bonus_per_chunk: f64,
    pub diversity_bonus_cap: f64,
    pub kg_concept_bonus: f64,
    pub kg_concept_cap: f64,
    pub kg_relation_bonus: f64,
    pub kg_relation_cap: f64,
    pub kg_multi_source_bonus: f64,
    pub chain_docs_bonuses: [f64; 3],
    pub chain_hops_bonuses: [f64; 2],
    pub chain_count_bonuses: [f64; 2],
    pub hard_cap: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            diversity_bonus_per_chunk: 0.02,
            diversity_bonus_cap: 0.10,
            kg_concept_bonus: 0.01,
            kg_concept_cap: 0.05,
            kg_relation_bonus: 0.02,
            kg_relation_cap: 0.08,
            kg_multi_source_bonus: 0.05,
            // ≥2 docs, ≥3 docs, ≥4 docs.
            chain_docs_bonuses: [0.05, 0.08, 0.12],
            // ≥2 hops, ≥3 hops.
            chain_hops_bonuses: [0.03, 0.05],
            // ≥2 chains, ≥3 chains.
            chain_count_bonuses: [0.03, 0.05],
            hard_cap: 0.90,
        }
    }
}

/// The transparent parts of the final score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceBreakdown {
    pub base_score: f64,
    pub kg_bonus: f64,
    pub chain_bonus: f64,
    pub final_score: f64,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Compute the breakdown from the retrieved chunks and graph signals.
pub fn compute_confidence(
    chunks: &[RetrievedChunk],
    kg: Option<KgSignals>,
    chains: Option<ChainSignals>,
    cfg: &ConfidenceConfig,
) -> ConfidenceBreakdown {
    if chunks.is_empty() {
        return ConfidenceBreakdown {
            base_score: 0.0,
            kg_bonus: 0.0,
            chain_bonus: 0.0,
            final_score: 0.0,
        };
    }

    // Vector side: min-max normalized similarity scores.
    let scores: Vec<f64> = chunks.iter().map(|c| c.score).collect();
    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let normalized: Vec<f64> = if max > min {
        scores.iter().map(|s| (s - min) / (max - min)).collect()
    } else {
        scores
            .iter()
            .map(|s| if *s > 0.7 { 0.8 } else { 0.5 })
            .collect()
    };
    let avg_vector = normalized.iter().sum::<f64>() / normalized.len() as f64;

    // Reranker side: sigmoid over scores shifted against the maximum.
    let rerank_scores: Vec<f64> = chunks.iter().map(|c| c.rerank_score).collect();
    let max_rerank = rerank_scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let avg_rerank = rerank_scores
        .iter()
        .map(|s| sigmoid(s - max_rerank + 2.0))
        .sum::<f64>()
        / rerank_scores.len() as f64;

    let diversity = (chunks.len() as f64 * cfg.diversity_bonus_per_chunk)
        .min(cfg.diversity_bonus_cap);
    let base_score = (0.5 * avg_vector + 0.5 * avg_rerank + diversity).min(1.0);

    // Knowledge-graph bonus, modulated by mean relation confidence.
    let mut kg_bonus = 0.0;
    if let Some(kg) = kg {
        if kg.concepts_count > 0 {
            kg_bonus += (kg.concepts_count as f64 * cfg.kg_concept_bonus).min(cfg.kg_concept_cap);
        }
        if kg.relations_count > 0 {
            kg_bonus +=
                (kg.relations_count as f64 * cfg.kg_relation_bonus).min(cfg.kg_relation_cap);
        }
        if kg.sources_count >= 2 {
            kg_bonus += cfg.kg_multi_source_bonus;
        }
        if kg.avg_confidence > 0.0 {
            kg_bonus *= kg.avg_confidence;
        }
    }
    kg_bonus = kg_bonus.min((cfg.hard_cap - base_score).max(0.0));

    // Chain bonus, capped so the total never exceeds the hard cap.
    let mut chain_bonus = 0.0;
    if let Some(chains) = chains {
        chain_bonus += match chains.distinct_docs_count {
            0 | 1 => 0.0,
            2 => cfg.chain_docs_bonuses[0],
            3 => cfg.chain_docs_bonuses[1],
            _ => cfg.chain_docs_bonuses[2],
        };
        chain_bonus += match chains.max_hops {
            0 | 1 => 0.0,
            2 => cfg.chain_hops_bonuses[0],
            _ => cfg.chain_hops_bonuses[1],
        };
        chain_bonus += match chains.chain_count {
            0 | 1 => 0.0,
            2 => cfg.chain_count_bonuses[0],
            _ => cfg.chain_count_bonuses[1],
        };
    }
    let max_chain = (cfg.hard_cap - base_score - kg_bonus).max(0.0);
    chain_bonus = chain_bonus.min(max_chain);

    let final_score = (base_score + kg_bonus + chain_bonus).min(cfg.hard_cap);
    ConfidenceBreakdown {
        base_score: round3(base_score),
        kg_bonus: round3(kg_bonus),
        chain_bonus: round3(chain_bonus),
        final_score: round3(final_score),
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(score: f64, rerank: f64) -> RetrievedChunk {
        RetrievedChunk {
            text: "chunk".into(),
            document_id: "doc_1".into(),
            document_name: "Guide".into(),
            context_id: None,
            section_path: None,
            slide_index: None,
            score,
            rerank_score: rerank,
        }
    }

    #[test]
    fn empty_results_score_zero() {
        let breakdown = compute_confidence(&[], None, None, &ConfidenceConfig::default());
        assert_eq!(breakdown.final_score, 0.0);
    }

    #[test]
    fn strong_signals_never_exceed_the_cap() {
        let chunks: Vec<RetrievedChunk> = (0..8).map(|i| chunk(0.9 - i as f64 * 0.01, 1.8)).collect();
        let kg = KgSignals {
            concepts_count: 10,
            relations_count: 10,
            sources_count: 4,
            avg_confidence: 1.0,
        };
        let chains = ChainSignals {
            chain_count: 5,
            distinct_docs_count: 5,
            max_hops: 4,
        };
        let breakdown =
            compute_confidence(&chunks, Some(kg), Some(chains), &ConfidenceConfig::default());
        assert!(breakdown.final_score <= 0.90);
        assert_eq!(breakdown.final_score, 0.90);
        // The parts still add up to the reported final.
        let sum = breakdown.base_score + breakdown.kg_bonus + breakdown.chain_bonus;
        assert!((sum - breakdown.final_score).abs() < 0.005);
    }

    #[test]
    fn bonuses_are_monotonic_in_their_signals() {
        let chunks = vec![chunk(0.8, 1.0), chunk(0.7, 0.5)];
        let cfg = ConfidenceConfig::default();

        let without = compute_confidence(&chunks, None, None, &cfg);
        let with_kg = compute_confidence(
            &chunks,
            Some(KgSignals {
                concepts_count: 3,
                relations_count: 2,
                sources_count: 2,
                avg_confidence: 0.9,
            }),
            None,
            &cfg,
        );
        assert!(with_kg.final_score >= without.final_score);
        assert!(with_kg.kg_bonus > 0.0);

        let shallow = ChainSignals { chain_count: 1, distinct_docs_count: 2, max_hops: 1 };
        let deep = ChainSignals { chain_count: 3, distinct_docs_count: 4, max_hops: 3 };
        let with_shallow = compute_confidence(&chunks, None, Some(shallow), &cfg);
        let with_deep = compute_confidence(&chunks, None, Some(deep), &cfg);
        assert!(with_deep.chain_bonus >= with_shallow.chain_bonus);
    }
}
