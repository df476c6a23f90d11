//! Assertion extraction, promotion policy and concept linking.
//!
//! Assertions must be verbatim: an LLM-proposed assertion whose text is
//! not a substring of its chunk is discarded as a reformulation. The
//! fallback extractor reads marker-bearing sentences directly, so the
//! pipeline keeps working when the model has nothing usable to say.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use clients::{
    cosine_similarity, ChatMessage, EmbeddingClient, LlmClient, LlmOptions, TaskType,
};
use model::{AssertionKind, Chunk};

use crate::concepts::Concept;
use crate::config::Pass1Config;
use crate::error::AbstainReason;
use crate::json::parse_json_body;

/// An assertion drafted from one chunk, before anchoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssertionDraft {
    pub assertion_id: String,
    pub chunk_id: String,
    pub text: String,
    pub kind: AssertionKind,
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
struct AssertionResponse {
    #[serde(default)]
    assertions: Vec<AssertionEntry>,
}

#[derive(Debug, Deserialize)]
struct AssertionEntry {
    text: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    confidence: Option<f64>,
}

fn parse_kind(raw: Option<&str>) -> AssertionKind {
    match raw {
        Some("DEFINITIONAL") => AssertionKind::Definitional,
        Some("PRESCRIPTIVE") => AssertionKind::Prescriptive,
        Some("CAUSAL") => AssertionKind::Causal,
        Some("COMPARATIVE") => AssertionKind::Comparative,
        Some("CONDITIONAL") => AssertionKind::Conditional,
        Some("PERMISSIVE") => AssertionKind::Permissive,
        Some("PROCEDURAL") => AssertionKind::Procedural,
        _ => AssertionKind::Factual,
    }
}

/// Extract assertions over all chunks.
pub async fn extract_assertions(
    chunks: &[Chunk],
    language: &str,
    llm: &dyn LlmClient,
    cfg: &Pass1Config,
) -> Vec<AssertionDraft> {
    let mut drafts = Vec::new();
    for chunk in chunks {
        let from_llm = extract_from_chunk(chunk, language, llm).await;
        if !from_llm.is_empty() {
            drafts.extend(from_llm);
        } else if cfg.allow_fallback {
            drafts.extend(fallback_assertions(chunk));
        }
    }
    for (i, draft) in drafts.iter_mut().enumerate() {
        draft.assertion_id = format!("asr_{:05}", i + 1);
    }
    drafts
}

async fn extract_from_chunk(
    chunk: &Chunk,
    language: &str,
    llm: &dyn LlmClient,
) -> Vec<AssertionDraft> {
    let user = format!(
        "Extract the claims this passage makes, verbatim.\nLanguage: {language}\n\nPassage:\n{}\n\n\
         Answer with JSON: {{\"assertions\": [{{\"text\": str, \
         \"type\": \"DEFINITIONAL|PRESCRIPTIVE|CAUSAL|COMPARATIVE|FACTUAL|CONDITIONAL|PERMISSIVE|PROCEDURAL\", \
         \"confidence\": 0..1}}]}}.\n\
         The text field MUST be copied exactly from the passage.",
        chunk.text,
    );
    let messages = [
        ChatMessage::system(
            "You extract classified assertions from documents. Never paraphrase: \
             every assertion text must appear verbatim in the passage.",
        ),
        ChatMessage::user(user),
    ];
    let options = LlmOptions {
        temperature: 0.1,
        max_tokens: 1500,
        response_format: Some("json".into()),
    };

    let Some(parsed) = llm
        .complete(TaskType::AssertionExtraction, &messages, &options)
        .await
        .ok()
        .and_then(|body| parse_json_body::<AssertionResponse>(&body))
    else {
        return Vec::new();
    };

    parsed
        .assertions
        .into_iter()
        .filter_map(|entry| {
            if !chunk.text.contains(entry.text.trim()) {
                // Reformulated claims never enter the pipeline.
                warn!(chunk_id = %chunk.chunk_id, "assertion_not_verbatim");
                return None;
            }
            Some(AssertionDraft {
                assertion_id: String::new(),
                chunk_id: chunk.chunk_id.clone(),
                text: entry.text.trim().to_string(),
                kind: parse_kind(entry.kind.as_deref()),
                confidence: entry.confidence.unwrap_or(0.7).clamp(0.0, 1.0),
            })
        })
        .collect()
}

/// Marker-driven heuristic extraction, sentence by sentence.
fn fallback_assertions(chunk: &Chunk) -> Vec<AssertionDraft> {
    let mut out = Vec::new();
    for sentence in split_sentences(&chunk.text) {
        let lower = sentence.to_lowercase();
        let classified = if lower.contains(" must ")
            || lower.contains(" shall ")
            || lower.contains("required")
        {
            Some((AssertionKind::Prescriptive, 0.8))
        } else if lower.contains("seems to") || lower.contains("appears to") {
            Some((AssertionKind::Factual, 0.55))
        } else if lower.contains(" may ") || lower.contains(" can ") {
            Some((AssertionKind::Permissive, 0.6))
        } else if lower.contains(" is a ")
            || lower.contains(" is the ")
            || lower.contains("consists of")
            || lower.contains("defined as")
        {
            Some((AssertionKind::Definitional, 0.7))
        } else if lower.contains("because") || lower.contains("leads to") || lower.contains("causes")
        {
            Some((AssertionKind::Causal, 0.65))
        } else if lower.contains(" if ") || lower.starts_with("if ") {
            Some((AssertionKind::Conditional, 0.6))
        } else if sentence.len() > 60 {
            Some((AssertionKind::Factual, 0.5))
        } else {
            None
        };
        if let Some((kind, confidence)) = classified {
            out.push(AssertionDraft {
                assertion_id: String::new(),
                chunk_id: chunk.chunk_id.clone(),
                text: sentence.trim().to_string(),
                kind,
                confidence,
            });
        }
    }
    out
}

pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    for (idx, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            let end = idx + c.len_utf8();
            let slice = text[start..end].trim_matches(|ch: char| ch == '\n').trim();
            if !slice.is_empty() {
                out.push(slice);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Outcome of the promotion policy filter.
#[derive(Debug, Clone, Default)]
pub struct PolicyOutcome {
    pub promotable: Vec<AssertionDraft>,
    pub abstained: Vec<(AssertionDraft, AbstainReason)>,
}

/// Apply the promotion policy: absolute confidence floor, then (in
/// strict mode) only always-promotable kinds.
pub fn filter_by_promotion_policy(drafts: Vec<AssertionDraft>, cfg: &Pass1Config) -> PolicyOutcome {
    let mut outcome = PolicyOutcome::default();
    for draft in drafts {
        if draft.confidence < cfg.min_assertion_confidence {
            outcome.abstained.push((draft, AbstainReason::LowConfidence));
        } else if cfg.strict_promotion && !draft.kind.always_promotable() {
            outcome.abstained.push((draft, AbstainReason::PolicyRejected));
        } else {
            outcome.promotable.push(draft);
        }
    }
    outcome
}

/// Link each assertion to its best concept, or abstain with
/// `NoConceptMatch`. Triggers give the lexical score; embeddings break
/// the rest of the tie.
pub async fn link_to_concepts(
    drafts: &[AssertionDraft],
    concepts: &[Concept],
    embedder: &dyn EmbeddingClient,
    cfg: &Pass1Config,
) -> Vec<(String, Option<String>)> {
    if concepts.is_empty() {
        return drafts
            .iter()
            .map(|d| (d.assertion_id.clone(), None))
            .collect();
    }

    // One embedding per concept (name + triggers), one per assertion.
    let concept_texts: Vec<String> = concepts
        .iter()
        .map(|c| format!("{} {}", c.name, c.lexical_triggers.join(" ")))
        .collect();
    let assertion_texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
    let concept_vectors = embedder.embed(&concept_texts).await.unwrap_or_default();
    let assertion_vectors = embedder.embed(&assertion_texts).await.unwrap_or_default();

    drafts
        .iter()
        .enumerate()
        .map(|(i, draft)| {
            let lower = draft.text.to_lowercase();
            let mut best: Option<(f64, &Concept)> = None;
            for (j, concept) in concepts.iter().enumerate() {
                let trigger_hits = concept
                    .lexical_triggers
                    .iter()
                    .filter(|t| lower.contains(t.as_str()))
                    .count();
                let lexical = if trigger_hits > 0 { 0.6 } else { 0.0 };
                let semantic = match (assertion_vectors.get(i), concept_vectors.get(j)) {
                    (Some(a), Some(c)) => f64::from(cosine_similarity(a, c)) * 0.4,
                    _ => 0.0,
                };
                let score = lexical + semantic;
                if best.map(|(s, _)| score > s).unwrap_or(true) {
                    best = Some((score, concept));
                }
            }
            match best {
                Some((score, concept)) if score >= cfg.min_link_score => {
                    (draft.assertion_id.clone(), Some(concept.concept_id.clone()))
                }
                _ => {
                    debug!(assertion_id = %draft.assertion_id, "no_concept_match");
                    (draft.assertion_id.clone(), None)
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clients::{HashEmbedder, ScriptedLlm};
    use model::ChunkKind;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            chunk_id: "ch_test_c000".into(),
            doc_version_id: "dv_test".into(),
            tenant_id: "default".into(),
            kind: ChunkKind::Narrative,
            order_start: 0,
            section_path: None,
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn verbatim_guard_drops_reformulations() {
        let llm = ScriptedLlm::new().script(
            TaskType::AssertionExtraction,
            vec![r#"{"assertions": [
                {"text": "The gateway must use TLS 1.2.", "type": "PRESCRIPTIVE", "confidence": 0.9},
                {"text": "Encryption is mandatory for the gateway.", "type": "PRESCRIPTIVE", "confidence": 0.9}
            ]}"#.into()],
        );
        let chunks = [chunk("The gateway must use TLS 1.2. Nothing else applies.")];
        let cfg = Pass1Config { allow_fallback: false, ..Default::default() };
        let drafts = extract_assertions(&chunks, "en", &llm, &cfg).await;
        assert_eq!(drafts.len(), 1, "paraphrase must be dropped");
        assert_eq!(drafts[0].text, "The gateway must use TLS 1.2.");
    }

    #[tokio::test]
    async fn fallback_reads_markers() {
        let llm = ScriptedLlm::new();
        let chunks = [chunk(
            "All backups must be encrypted with customer keys. The exporter may skip empty tables.",
        )];
        let drafts = extract_assertions(&chunks, "en", &llm, &Pass1Config::default()).await;
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].kind, AssertionKind::Prescriptive);
        assert_eq!(drafts[1].kind, AssertionKind::Permissive);
    }

    #[test]
    fn policy_floor_and_strictness() {
        let cfg = Pass1Config::default();
        let drafts = vec![
            AssertionDraft {
                assertion_id: "asr_00001".into(),
                chunk_id: "c".into(),
                text: "kept".into(),
                kind: AssertionKind::Prescriptive,
                confidence: 0.9,
            },
            AssertionDraft {
                assertion_id: "asr_00002".into(),
                chunk_id: "c".into(),
                text: "too weak".into(),
                kind: AssertionKind::Prescriptive,
                confidence: 0.39,
            },
            AssertionDraft {
                assertion_id: "asr_00003".into(),
                chunk_id: "c".into(),
                text: "wrong kind in strict mode".into(),
                kind: AssertionKind::Comparative,
                confidence: 0.9,
            },
        ];
        let outcome = filter_by_promotion_policy(drafts, &cfg);
        assert_eq!(outcome.promotable.len(), 1);
        assert_eq!(outcome.abstained.len(), 2);
        assert!(outcome
            .abstained
            .iter()
            .any(|(_, r)| *r == AbstainReason::LowConfidence));
        assert!(outcome
            .abstained
            .iter()
            .any(|(_, r)| *r == AbstainReason::PolicyRejected));
    }

    #[test]
    fn floor_is_inclusive() {
        let cfg = Pass1Config::default();
        let draft = AssertionDraft {
            assertion_id: "asr_00001".into(),
            chunk_id: "c".into(),
            text: "exactly at floor".into(),
            kind: AssertionKind::Factual,
            confidence: 0.40,
        };
        let outcome = filter_by_promotion_policy(vec![draft], &cfg);
        assert_eq!(outcome.promotable.len(), 1);
    }

    #[tokio::test]
    async fn linking_uses_triggers_and_embeddings() {
        let concepts = vec![
            Concept {
                concept_id: "concept_doc_0".into(),
                theme_id: "th_01".into(),
                name: "Atlas Gateway".into(),
                role: crate::concepts::ConceptRole::Central,
                lexical_triggers: vec!["gateway".into(), "atlas".into()],
            },
            Concept {
                concept_id: "concept_doc_1".into(),
                theme_id: "th_01".into(),
                name: "Zephyr Queue".into(),
                role: crate::concepts::ConceptRole::Standard,
                lexical_triggers: vec!["queue".into(), "zephyr".into()],
            },
        ];
        let drafts = vec![
            AssertionDraft {
                assertion_id: "asr_00001".into(),
                chunk_id: "c".into(),
                text: "The gateway must use TLS 1.2 for all traffic.".into(),
                kind: AssertionKind::Prescriptive,
                confidence: 0.9,
            },
            AssertionDraft {
                assertion_id: "asr_00002".into(),
                chunk_id: "c".into(),
                text: "Completely unrelated marketing copy.".into(),
                kind: AssertionKind::Factual,
                confidence: 0.8,
            },
        ];
        let embedder = HashEmbedder::default();
        let links =
            link_to_concepts(&drafts, &concepts, &embedder, &Pass1Config::default()).await;
        assert_eq!(links[0].1.as_deref(), Some("concept_doc_0"));
        assert_eq!(links[1].1, None, "unrelated text must abstain");
    }
}
