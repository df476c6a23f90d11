//! Typed relation extraction between concepts.
//!
//! Three strategies share one output shape, [`TypedRelation`]. Whatever
//! the strategy, evidence is verbatim and subjects/objects are resolved
//! against the known concept inventory; the extractor never mints
//! concepts of its own.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use clients::{ChatMessage, LlmClient, LlmOptions, TaskType};
use model::{Chunk, ExtractionMethod, RelationKind, SemanticGrade};

use crate::assertions::split_sentences;
use crate::concepts::Concept;
use crate::config::{Pass1Config, RelationStrategy};
use crate::json::parse_json_body;

/// A span of verbatim evidence supporting a relation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceSpan {
    pub chunk_id: String,
    pub text: String,
}

/// One extracted relation candidate between two known concepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypedRelation {
    pub subject_concept_id: String,
    pub kind: RelationKind,
    pub object_concept_id: String,
    pub method: ExtractionMethod,
    pub confidence: f64,
    pub evidence: Vec<EvidenceSpan>,
    /// EXPLICIT when a textual marker is present in the evidence,
    /// DISCURSIVE when the relation was only inferred from prose.
    pub grade_hint: SemanticGrade,
    pub has_marker: bool,
}

struct MarkerPattern {
    kind: RelationKind,
    regex: &'static Lazy<Regex>,
}

macro_rules! marker {
    ($name:ident, $pattern:expr) => {
        static $name: Lazy<Regex> =
            Lazy::new(|| Regex::new($pattern).expect("marker regex"));
    };
}

marker!(REQUIRES_RE, r"(?i)\b(requires?|must use|must run on|depends? on|needs?|doit|n[ée]cessite)\b");
marker!(USES_RE, r"(?i)\b(uses?|leverages?|utilise[nt]?)\b");
marker!(PART_OF_RE, r"(?i)\b(is part of|belongs to|fait partie de)\b");
marker!(SUBTYPE_RE, r"(?i)\b(is a kind of|is a type of|est un type de)\b");
marker!(INTEGRATES_RE, r"(?i)\b(integrates? with|connects? to|s'int[èe]gre)\b");
marker!(EXTENDS_RE, r"(?i)\b(extends?|builds on|[ée]tend)\b");
marker!(ENABLES_RE, r"(?i)\b(enables?|allows?|permet)\b");
marker!(REPLACES_RE, r"(?i)\b(replaces?|supersedes?|remplace)\b");
marker!(DEPRECATES_RE, r"(?i)\b(deprecates?|is deprecated in favor of)\b");
marker!(PRECEDES_RE, r"(?i)\b(precedes?|comes before|pr[ée]c[èe]de)\b");
marker!(ALTERNATIVE_RE, r"(?i)\b(instead of|as an alternative to|au lieu de)\b");
marker!(APPLIES_RE, r"(?i)\b(applies? to|s'applique [àa])\b");
marker!(GOVERNED_RE, r"(?i)\b(is governed by|complies with|est r[ée]gi par)\b");
marker!(CAUSES_RE, r"(?i)\b(causes?|leads? to|results? in|provoque)\b");
marker!(PREVENTS_RE, r"(?i)\b(prevents?|blocks?|emp[êe]che)\b");
marker!(MITIGATES_RE, r"(?i)\b(mitigates?|reduces? the risk|att[ée]nue)\b");
marker!(DEFINES_RE, r"(?i)\b(defines?|d[ée]finit)\b");
marker!(EXAMPLE_RE, r"(?i)\b(is an example of|such as|est un exemple de)\b");
marker!(DISCURSIVE_RE, r"(?i)\b(seems? to|appears? to|might|could|probably|semble)\b");

static MARKER_TABLE: Lazy<Vec<MarkerPattern>> = Lazy::new(|| {
    vec![
        MarkerPattern { kind: RelationKind::Requires, regex: &REQUIRES_RE },
        MarkerPattern { kind: RelationKind::PartOf, regex: &PART_OF_RE },
        MarkerPattern { kind: RelationKind::SubtypeOf, regex: &SUBTYPE_RE },
        MarkerPattern { kind: RelationKind::IntegratesWith, regex: &INTEGRATES_RE },
        MarkerPattern { kind: RelationKind::Extends, regex: &EXTENDS_RE },
        MarkerPattern { kind: RelationKind::Enables, regex: &ENABLES_RE },
        MarkerPattern { kind: RelationKind::Replaces, regex: &REPLACES_RE },
        MarkerPattern { kind: RelationKind::Deprecates, regex: &DEPRECATES_RE },
        MarkerPattern { kind: RelationKind::Precedes, regex: &PRECEDES_RE },
        MarkerPattern { kind: RelationKind::AlternativeTo, regex: &ALTERNATIVE_RE },
        MarkerPattern { kind: RelationKind::AppliesTo, regex: &APPLIES_RE },
        MarkerPattern { kind: RelationKind::GovernedBy, regex: &GOVERNED_RE },
        MarkerPattern { kind: RelationKind::Causes, regex: &CAUSES_RE },
        MarkerPattern { kind: RelationKind::Prevents, regex: &PREVENTS_RE },
        MarkerPattern { kind: RelationKind::Mitigates, regex: &MITIGATES_RE },
        MarkerPattern { kind: RelationKind::Defines, regex: &DEFINES_RE },
        MarkerPattern { kind: RelationKind::ExampleOf, regex: &EXAMPLE_RE },
        // USES is deliberately last: its verbs are common and weak.
        MarkerPattern { kind: RelationKind::Uses, regex: &USES_RE },
    ]
});

/// True when the evidence carries an explicit marker for the kind.
pub fn has_marker_for(kind: RelationKind, evidence: &str) -> bool {
    MARKER_TABLE
        .iter()
        .find(|p| p.kind == kind)
        .map(|p| p.regex.is_match(evidence))
        .unwrap_or(false)
}

fn parse_kind_label(label: &str) -> RelationKind {
    match label {
        "PART_OF" => RelationKind::PartOf,
        "SUBTYPE_OF" => RelationKind::SubtypeOf,
        "REQUIRES" => RelationKind::Requires,
        "USES" => RelationKind::Uses,
        "INTEGRATES_WITH" => RelationKind::IntegratesWith,
        "EXTENDS" => RelationKind::Extends,
        "ENABLES" => RelationKind::Enables,
        "VERSION_OF" => RelationKind::VersionOf,
        "PRECEDES" => RelationKind::Precedes,
        "REPLACES" => RelationKind::Replaces,
        "DEPRECATES" => RelationKind::Deprecates,
        "ALTERNATIVE_TO" => RelationKind::AlternativeTo,
        "CHOICE_BETWEEN" => RelationKind::ChoiceBetween,
        "APPLIES_TO" => RelationKind::AppliesTo,
        "GOVERNED_BY" => RelationKind::GovernedBy,
        "CAUSES" => RelationKind::Causes,
        "PREVENTS" => RelationKind::Prevents,
        "MITIGATES" => RelationKind::Mitigates,
        "DEFINES" => RelationKind::Defines,
        "EXAMPLE_OF" => RelationKind::ExampleOf,
        "ASSOCIATED_WITH" => RelationKind::AssociatedWith,
        "CONFLICTS_WITH" => RelationKind::ConflictsWith,
        _ => RelationKind::Unknown,
    }
}

/// Relation extraction engine over one document's chunks.
pub struct RelationExtractionEngine<'a> {
    llm: &'a dyn LlmClient,
    strategy: RelationStrategy,
}

impl<'a> RelationExtractionEngine<'a> {
    pub fn new(llm: &'a dyn LlmClient, cfg: &Pass1Config) -> Self {
        Self {
            llm,
            strategy: cfg.relation_strategy,
        }
    }

    pub async fn extract(
        &self,
        chunks: &[Chunk],
        concepts: &[Concept],
    ) -> Vec<TypedRelation> {
        if concepts.len() < 2 {
            return Vec::new();
        }
        let mut relations = match self.strategy {
            RelationStrategy::PatternOnly => extract_with_patterns(chunks, concepts),
            RelationStrategy::Hybrid => {
                let mut candidates = extract_with_patterns(chunks, concepts);
                let from_llm = self.extract_with_llm(chunks, concepts).await;
                merge_candidates(&mut candidates, from_llm);
                candidates
            }
            RelationStrategy::LlmFirst => {
                let mut candidates = self.extract_with_llm(chunks, concepts).await;
                if candidates.is_empty() {
                    candidates = extract_with_patterns(chunks, concepts);
                }
                candidates
            }
        };
        // Grade hint from the evidence itself, whatever the strategy said.
        // A hedged sentence ("seems to", "might") never counts as marked.
        for relation in &mut relations {
            let marker = relation.evidence.iter().any(|e| {
                has_marker_for(relation.kind, &e.text) && !DISCURSIVE_RE.is_match(&e.text)
            });
            relation.has_marker = marker;
            relation.grade_hint = if marker {
                SemanticGrade::Explicit
            } else {
                SemanticGrade::Discursive
            };
        }
        info!(count = relations.len(), strategy = ?self.strategy, "relations_extracted");
        relations
    }

    async fn extract_with_llm(
        &self,
        chunks: &[Chunk],
        concepts: &[Concept],
    ) -> Vec<TypedRelation> {
        // Co-occurrence pre-filter: only send chunks naming ≥ 2 concepts.
        let names: Vec<(&Concept, String)> = concepts
            .iter()
            .map(|c| (c, c.name.to_lowercase()))
            .collect();
        let mut out = Vec::new();
        for chunk in chunks {
            let lower = chunk.text.to_lowercase();
            let present: Vec<&Concept> = names
                .iter()
                .filter(|(_, lname)| lower.contains(lname.as_str()))
                .map(|(c, _)| *c)
                .collect();
            if present.len() < 2 {
                continue;
            }
            out.extend(self.extract_chunk_with_llm(chunk, &present).await);
        }
        out
    }

    async fn extract_chunk_with_llm(
        &self,
        chunk: &Chunk,
        concepts: &[&Concept],
    ) -> Vec<TypedRelation> {
        let inventory: Vec<&str> = concepts.iter().map(|c| c.name.as_str()).collect();
        let user = format!(
            "Extract typed relations between these concepts only: {}.\n\nPassage:\n{}\n\n\
             Answer with JSON: {{\"relations\": [{{\"subject\": str, \"type\": \"REQUIRES|USES|PART_OF|…\", \
             \"object\": str, \"evidence\": str, \"confidence\": 0..1}}]}}.\n\
             The evidence MUST be copied verbatim from the passage.",
            inventory.join(", "),
            chunk.text,
        );
        let messages = [
            ChatMessage::system(
                "You extract typed relations between known concepts. Use only the \
                 provided concept names and only the closed relation vocabulary.",
            ),
            ChatMessage::user(user),
        ];
        let options = LlmOptions {
            temperature: 0.1,
            max_tokens: 1500,
            response_format: Some("json".into()),
        };

        #[derive(Deserialize)]
        struct RelationResponse {
            #[serde(default)]
            relations: Vec<RelationEntry>,
        }
        #[derive(Deserialize)]
        struct RelationEntry {
            subject: String,
            #[serde(rename = "type")]
            kind: String,
            object: String,
            evidence: Option<String>,
            confidence: Option<f64>,
        }

        let Some(parsed) = self
            .llm
            .complete(TaskType::RelationExtraction, &messages, &options)
            .await
            .ok()
            .and_then(|body| parse_json_body::<RelationResponse>(&body))
        else {
            return Vec::new();
        };

        parsed
            .relations
            .into_iter()
            .filter_map(|entry| {
                let subject = concepts
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(&entry.subject))?;
                let object = concepts
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(&entry.object))?;
                if subject.concept_id == object.concept_id {
                    return None;
                }
                let evidence_text = entry.evidence.unwrap_or_default();
                if !evidence_text.is_empty() && !chunk.text.contains(evidence_text.trim()) {
                    warn!(chunk_id = %chunk.chunk_id, "relation_evidence_not_verbatim");
                    return None;
                }
                Some(TypedRelation {
                    subject_concept_id: subject.concept_id.clone(),
                    kind: parse_kind_label(&entry.kind),
                    object_concept_id: object.concept_id.clone(),
                    method: ExtractionMethod::Llm,
                    confidence: entry.confidence.unwrap_or(0.7).clamp(0.0, 1.0),
                    evidence: if evidence_text.is_empty() {
                        Vec::new()
                    } else {
                        vec![EvidenceSpan {
                            chunk_id: chunk.chunk_id.clone(),
                            text: evidence_text.trim().to_string(),
                        }]
                    },
                    grade_hint: SemanticGrade::Discursive,
                    has_marker: false,
                })
            })
            .collect()
    }
}

/// Pattern strategy: sentences naming two concepts plus a marker.
fn extract_with_patterns(chunks: &[Chunk], concepts: &[Concept]) -> Vec<TypedRelation> {
    let mut out = Vec::new();
    for chunk in chunks {
        for sentence in split_sentences(&chunk.text) {
            let lower = sentence.to_lowercase();
            let present: Vec<(&Concept, usize)> = concepts
                .iter()
                .filter_map(|c| lower.find(&c.name.to_lowercase()).map(|pos| (c, pos)))
                .collect();
            if present.len() < 2 {
                continue;
            }
            for pattern in MARKER_TABLE.iter() {
                let Some(marker) = pattern.regex.find(&lower) else {
                    continue;
                };
                // Subject before the marker, object after it.
                let subject = present
                    .iter()
                    .filter(|(_, pos)| *pos < marker.start())
                    .max_by_key(|(_, pos)| *pos);
                let object = present
                    .iter()
                    .filter(|(_, pos)| *pos >= marker.end())
                    .min_by_key(|(_, pos)| *pos);
                if let (Some((subject, _)), Some((object, _))) = (subject, object) {
                    if subject.concept_id == object.concept_id {
                        continue;
                    }
                    let discursive = DISCURSIVE_RE.is_match(&lower);
                    out.push(TypedRelation {
                        subject_concept_id: subject.concept_id.clone(),
                        kind: pattern.kind,
                        object_concept_id: object.concept_id.clone(),
                        method: ExtractionMethod::Pattern,
                        confidence: if discursive { 0.5 } else { 0.65 },
                        evidence: vec![EvidenceSpan {
                            chunk_id: chunk.chunk_id.clone(),
                            text: sentence.to_string(),
                        }],
                        grade_hint: SemanticGrade::Discursive,
                        has_marker: false,
                    });
                    break;
                }
            }
        }
    }
    out
}

/// Merge LLM results into pattern candidates, upgrading duplicates to
/// hybrid and keeping the higher confidence.
fn merge_candidates(candidates: &mut Vec<TypedRelation>, from_llm: Vec<TypedRelation>) {
    for llm_rel in from_llm {
        match candidates.iter_mut().find(|c| {
            c.subject_concept_id == llm_rel.subject_concept_id
                && c.object_concept_id == llm_rel.object_concept_id
                && c.kind == llm_rel.kind
        }) {
            Some(existing) => {
                existing.method = ExtractionMethod::Hybrid;
                existing.confidence = existing.confidence.max(llm_rel.confidence);
                existing.evidence.extend(llm_rel.evidence);
            }
            None => candidates.push(llm_rel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concepts::ConceptRole;
    use clients::ScriptedLlm;
    use model::ChunkKind;

    fn concept(id: &str, name: &str) -> Concept {
        Concept {
            concept_id: id.into(),
            theme_id: "th_01".into(),
            name: name.into(),
            role: ConceptRole::Standard,
            lexical_triggers: crate::concepts::tokenize(name),
        }
    }

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
    async fn patterns_find_marked_relations() {
        let concepts = vec![concept("c_a", "Atlas Gateway"), concept("c_b", "Zephyr Queue")];
        let chunks = [chunk("Atlas Gateway requires Zephyr Queue for burst buffering.")];
        let llm = ScriptedLlm::new();
        let cfg = Pass1Config {
            relation_strategy: RelationStrategy::PatternOnly,
            ..Default::default()
        };
        let engine = RelationExtractionEngine::new(&llm, &cfg);
        let relations = engine.extract(&chunks, &concepts).await;

        assert_eq!(relations.len(), 1);
        let rel = &relations[0];
        assert_eq!(rel.kind, RelationKind::Requires);
        assert_eq!(rel.subject_concept_id, "c_a");
        assert_eq!(rel.object_concept_id, "c_b");
        assert!(rel.has_marker);
        assert_eq!(rel.grade_hint, SemanticGrade::Explicit);
    }

    #[tokio::test]
    async fn hedged_prose_is_discursive() {
        let concepts = vec![concept("c_a", "Atlas Gateway"), concept("c_b", "Zephyr Queue")];
        let chunks = [chunk("Atlas Gateway seems to need Zephyr Queue in larger deployments.")];
        let llm = ScriptedLlm::new().script(
            TaskType::RelationExtraction,
            vec![r#"{"relations": [{"subject": "Atlas Gateway", "type": "REQUIRES", "object": "Zephyr Queue",
                 "evidence": "Atlas Gateway seems to need Zephyr Queue in larger deployments.", "confidence": 0.72}]}"#.into()],
        );
        let engine = RelationExtractionEngine::new(&llm, &Pass1Config::default());
        let relations = engine.extract(&chunks, &concepts).await;

        assert_eq!(relations.len(), 1);
        // "seems to need" carries no REQUIRES marker → discursive.
        assert!(!relations[0].has_marker);
        assert_eq!(relations[0].grade_hint, SemanticGrade::Discursive);
        assert_eq!(relations[0].method, ExtractionMethod::Llm);
    }

    #[tokio::test]
    async fn llm_tuples_are_validated_against_inventory_and_evidence() {
        let concepts = vec![concept("c_a", "Atlas Gateway"), concept("c_b", "Zephyr Queue")];
        let chunks = [chunk("Atlas Gateway requires Zephyr Queue. Zephyr Queue buffers events.")];
        let llm = ScriptedLlm::new().script(
            TaskType::RelationExtraction,
            vec![r#"{"relations": [
                {"subject": "Atlas Gateway", "type": "REQUIRES", "object": "Zephyr Queue",
                 "evidence": "Atlas Gateway requires Zephyr Queue.", "confidence": 0.9},
                {"subject": "Atlas Gateway", "type": "USES", "object": "Phantom Service",
                 "evidence": "made up", "confidence": 0.9},
                {"subject": "Atlas Gateway", "type": "ENABLES", "object": "Zephyr Queue",
                 "evidence": "this sentence is not in the passage", "confidence": 0.9}
            ]}"#.into()],
        );
        let engine = RelationExtractionEngine::new(&llm, &Pass1Config::default());
        let relations = engine.extract(&chunks, &concepts).await;

        // Unknown concept and non-verbatim evidence are both dropped.
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].kind, RelationKind::Requires);
        assert!(relations[0].has_marker, "marker present in verbatim evidence");
    }
}
