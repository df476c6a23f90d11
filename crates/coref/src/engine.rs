//! Coreference engines.
//!
//! Engines produce raw mention clusters; all quality control happens in
//! the gating layer afterwards. The trait is deliberately thin so
//! external engines (neural resolvers, per-language toolkits) can be
//! dropped in without touching the pipeline.

use serde::{Deserialize, Serialize};

use crate::config::CorefConfig;

/// One mention inside a cluster, in document coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterMention {
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub sentence_idx: usize,
}

/// A raw cluster as produced by an engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoreferenceCluster {
    pub mentions: Vec<ClusterMention>,
    pub representative_idx: usize,
    pub confidence: f64,
    pub method: String,
}

impl CoreferenceCluster {
    /// Signature used to deduplicate clusters across batch overlaps:
    /// the sorted set of mention spans.
    pub fn signature(&self) -> Vec<(usize, usize)> {
        let mut spans: Vec<(usize, usize)> = self.mentions.iter().map(|m| (m.start, m.end)).collect();
        spans.sort_unstable();
        spans
    }
}

/// A chunk of text handed to the engine alongside the full document.
#[derive(Debug, Clone)]
pub struct EngineChunk {
    pub chunk_id: String,
    pub text: String,
}

/// Engine boundary: resolve clusters for one text in one language.
pub trait CorefEngine: Send + Sync {
    fn engine_name(&self) -> &str;

    fn resolve(
        &self,
        document_text: &str,
        chunks: &[EngineChunk],
        lang: &str,
    ) -> Vec<CoreferenceCluster>;
}

/// Pick an engine for a language. The deterministic rule-based engine
/// covers every language in-tree; deployments register richer engines
/// per language ahead of it.
pub fn engine_for_language(_lang: &str, cfg: &CorefConfig) -> Box<dyn CorefEngine> {
    Box::new(RuleBasedEngine::new(cfg.engine_confidence))
}

/// Deterministic engine: clusters capitalized mention sequences that share
/// a head token, then attaches pronouns to the nearest preceding named
/// mention. Deliberately greedy; the gating layer is responsible for
/// splitting false merges.
pub struct RuleBasedEngine {
    confidence: f64,
}

impl RuleBasedEngine {
    pub fn new(confidence: f64) -> Self {
        Self { confidence }
    }
}

#[derive(Debug)]
struct RawMention {
    start: usize,
    end: usize,
    text: String,
    sentence_idx: usize,
    is_pronoun: bool,
}

impl CorefEngine for RuleBasedEngine {
    fn engine_name(&self) -> &str {
        "rule_based"
    }

    fn resolve(
        &self,
        document_text: &str,
        _chunks: &[EngineChunk],
        lang: &str,
    ) -> Vec<CoreferenceCluster> {
        let mentions = scan_mentions(document_text, lang);

        // Group named mentions by lowercase head token.
        let mut clusters: Vec<(String, Vec<usize>)> = Vec::new();
        for (idx, m) in mentions.iter().enumerate() {
            if m.is_pronoun {
                continue;
            }
            let head = m
                .text
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_lowercase();
            match clusters.iter_mut().find(|(h, _)| *h == head) {
                Some((_, members)) => members.push(idx),
                None => clusters.push((head, vec![idx])),
            }
        }

        // Attach each pronoun to the cluster of the nearest preceding
        // named mention.
        let mut pronoun_home: Vec<(usize, usize)> = Vec::new();
        for (idx, m) in mentions.iter().enumerate() {
            if !m.is_pronoun {
                continue;
            }
            let antecedent = mentions[..idx]
                .iter()
                .enumerate()
                .filter(|(_, cand)| !cand.is_pronoun)
                .max_by_key(|(_, cand)| cand.start);
            if let Some((ante_idx, _)) = antecedent {
                if let Some(cluster_pos) = clusters
                    .iter()
                    .position(|(_, members)| members.contains(&ante_idx))
                {
                    pronoun_home.push((idx, cluster_pos));
                }
            }
        }

        let mut out = Vec::new();
        for (pos, (_, members)) in clusters.iter().enumerate() {
            let mut all: Vec<usize> = members.clone();
            all.extend(
                pronoun_home
                    .iter()
                    .filter(|(_, home)| *home == pos)
                    .map(|(idx, _)| *idx),
            );
            if all.len() < 2 {
                continue;
            }
            all.sort_unstable();
            let cluster_mentions: Vec<ClusterMention> = all
                .iter()
                .map(|&i| ClusterMention {
                    start: mentions[i].start,
                    end: mentions[i].end,
                    text: mentions[i].text.clone(),
                    sentence_idx: mentions[i].sentence_idx,
                })
                .collect();
            let representative_idx = all
                .iter()
                .position(|&i| !mentions[i].is_pronoun)
                .unwrap_or(0);
            out.push(CoreferenceCluster {
                mentions: cluster_mentions,
                representative_idx,
                confidence: self.confidence,
                method: self.engine_name().to_string(),
            });
        }
        out
    }
}

/// Pronoun vocabulary per language, lowercase.
pub fn pronoun_set(lang: &str) -> &'static [&'static str] {
    match lang {
        "fr" => &["il", "elle", "ils", "elles", "celui-ci", "celle-ci", "ceux-ci", "celles-ci"],
        "de" => &["er", "sie", "es", "dieser", "diese", "dieses"],
        _ => &["it", "they", "them", "he", "she", "him", "her", "this", "that", "these", "those"],
    }
}

/// Expletive surfaces that never refer ("there is…").
pub fn expletive_set(lang: &str) -> &'static [&'static str] {
    match lang {
        "fr" => &["ce", "cela"],
        _ => &["there"],
    }
}

const FUNCTION_WORDS: &[&str] = &[
    "the", "a", "an", "in", "on", "at", "for", "to", "by", "of", "and", "or", "but", "with",
    "from", "as", "is", "are", "was", "were", "be", "been", "all", "each", "every", "no", "not",
    "if", "when", "while", "after", "before", "during", "under", "over", "le", "la", "les", "un",
    "une", "des",
];

fn scan_mentions(text: &str, lang: &str) -> Vec<RawMention> {
    let pronouns = pronoun_set(lang);
    let expletives = expletive_set(lang);
    let mut mentions = Vec::new();
    let mut sentence_idx = 0usize;

    let mut token_start: Option<usize> = None;
    let mut chars: Vec<(usize, char)> = text.char_indices().collect();
    chars.push((text.len(), ' '));

    // Collect word tokens with offsets, tracking sentence boundaries.
    let mut tokens: Vec<(usize, usize, usize)> = Vec::new(); // (start, end, sentence)
    for (pos, c) in chars {
        if c.is_alphanumeric() || c == '/' || c == '-' || c == '\'' {
            if token_start.is_none() {
                token_start = Some(pos);
            }
        } else {
            if let Some(start) = token_start.take() {
                tokens.push((start, pos, sentence_idx));
            }
            if matches!(c, '.' | '!' | '?') {
                sentence_idx += 1;
            }
        }
    }

    let word = |span: &(usize, usize, usize)| &text[span.0..span.1];

    let mut i = 0usize;
    while i < tokens.len() {
        let w = word(&tokens[i]);
        let lower = w.to_lowercase();

        if pronouns.contains(&lower.as_str()) || expletives.contains(&lower.as_str()) {
            mentions.push(RawMention {
                start: tokens[i].0,
                end: tokens[i].1,
                text: w.to_string(),
                sentence_idx: tokens[i].2,
                is_pronoun: true,
            });
            i += 1;
            continue;
        }

        // A capitalized run forms one named mention ("SAP S/4HANA Cloud").
        let is_cap = |s: &str| s.chars().next().is_some_and(|c| c.is_uppercase());
        if is_cap(w) && w.len() > 1 {
            let mut j = i;
            while j + 1 < tokens.len()
                && tokens[j + 1].2 == tokens[i].2
                && is_cap(word(&tokens[j + 1]))
            {
                j += 1;
            }
            let start = tokens[i].0;
            let end = tokens[j].1;
            // Single sentence-initial function words are not mentions.
            if j > i || !FUNCTION_WORDS.contains(&lower.as_str()) {
                mentions.push(RawMention {
                    start,
                    end,
                    text: text[start..end].to_string(),
                    sentence_idx: tokens[i].2,
                    is_pronoun: false,
                });
            }
            i = j + 1;
            continue;
        }
        i += 1;
    }
    mentions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clusters_repeat_named_mentions() {
        let engine = RuleBasedEngine::new(0.9);
        let text = "Atlas Gateway handles routing. Atlas Gateway also terminates TLS.";
        let clusters = engine.resolve(text, &[], "en");
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].mentions.len(), 2);
        assert_eq!(clusters[0].mentions[0].text, "Atlas Gateway");
    }

    #[test]
    fn pronouns_attach_to_nearest_named_mention() {
        let engine = RuleBasedEngine::new(0.9);
        let text = "Atlas Gateway handles routing. Atlas Gateway is fast. It scales well.";
        let clusters = engine.resolve(text, &[], "en");
        assert_eq!(clusters.len(), 1);
        let texts: Vec<&str> = clusters[0].mentions.iter().map(|m| m.text.as_str()).collect();
        assert!(texts.contains(&"It"));
    }

    #[test]
    fn head_token_merging_is_greedy() {
        // Same head token "SAP" is deliberately merged; gating must split.
        let engine = RuleBasedEngine::new(0.9);
        let text = "SAP S/4HANA is the successor suite. SAP HANA is the database.";
        let clusters = engine.resolve(text, &[], "en");
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].mentions.len(), 2);
    }

    #[test]
    fn signatures_dedupe_identical_clusters() {
        let a = CoreferenceCluster {
            mentions: vec![
                ClusterMention { start: 10, end: 15, text: "Atlas".into(), sentence_idx: 0 },
                ClusterMention { start: 30, end: 35, text: "Atlas".into(), sentence_idx: 1 },
            ],
            representative_idx: 0,
            confidence: 0.9,
            method: "rule_based".into(),
        };
        let mut b = a.clone();
        b.mentions.reverse();
        assert_eq!(a.signature(), b.signature());
    }
}
