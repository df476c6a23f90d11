//! Concept identification and iterative refinement.
//!
//! Concepts carry lexical triggers used for assertion linking. The
//! budget adapts to document size; refinement proposes additional
//! concepts from assertions that failed to link, bounded by a
//! marginal-yield check.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use clients::{ChatMessage, LlmClient, LlmOptions, TaskType};
use ingest::Pass0Output;

use crate::analysis::DocumentAnalysis;
use crate::config::Pass1Config;
use crate::json::{clip, parse_json_body};

/// Role a concept plays in the document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConceptRole {
    Central,
    Standard,
    Peripheral,
}

/// A working concept during Pass 1, before canonicalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Concept {
    pub concept_id: String,
    pub theme_id: String,
    pub name: String,
    pub role: ConceptRole,
    pub lexical_triggers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ConceptResponse {
    #[serde(default)]
    concepts: Vec<ConceptEntry>,
    #[serde(default)]
    refused: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ConceptEntry {
    name: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    theme: Option<String>,
    #[serde(default)]
    lexical_triggers: Vec<String>,
}

/// Effective concept budget: base plus two per section, capped.
pub fn concept_budget(cfg: &Pass1Config, n_sections: usize) -> usize {
    (cfg.concept_budget_base + 2 * n_sections).min(cfg.concept_budget_max)
}

/// Identify concepts for a document. Returns `(concepts, refused_terms)`.
pub async fn identify_concepts(
    pass0: &Pass0Output,
    analysis: &DocumentAnalysis,
    content: &str,
    llm: &dyn LlmClient,
    cfg: &Pass1Config,
) -> (Vec<Concept>, Vec<String>) {
    let budget = concept_budget(cfg, pass0.sections.len());
    let themes: Vec<&str> = analysis.themes.iter().map(|t| t.name.as_str()).collect();
    let user = format!(
        "Identify at most {budget} concepts in this document.\n\
         Subject: {}\nThemes: {}\nLanguage: {}\n\nContent:\n{}\n\n\
         Answer with JSON: {{\"concepts\": [{{\"name\": str, \"role\": \"CENTRAL|STANDARD|PERIPHERAL\", \
         \"theme\": str, \"lexical_triggers\": [str]}}], \"refused\": [str]}}",
        analysis.subject,
        themes.join(", "),
        analysis.language,
        clip(content, 6000),
    );
    let messages = [
        ChatMessage::system(
            "You identify the canonical concepts a document is actually about. \
             Concepts are entities and named capabilities, not sentence topics.",
        ),
        ChatMessage::user(user),
    ];
    let options = LlmOptions {
        temperature: 0.2,
        max_tokens: 1500,
        response_format: Some("json".into()),
    };

    let parsed = llm
        .complete(TaskType::ConceptExtraction, &messages, &options)
        .await
        .ok()
        .and_then(|body| parse_json_body::<ConceptResponse>(&body));

    match parsed {
        Some(response) if !response.concepts.is_empty() => {
            let theme_index: HashMap<&str, &str> = analysis
                .themes
                .iter()
                .map(|t| (t.name.as_str(), t.theme_id.as_str()))
                .collect();
            let concepts = response
                .concepts
                .into_iter()
                .take(budget)
                .enumerate()
                .map(|(i, entry)| build_concept(&pass0.document.document_id, i, entry, &theme_index))
                .collect();
            (concepts, response.refused)
        }
        _ if cfg.allow_fallback => {
            warn!("concept identification falling back to lexical heuristics");
            (fallback_concepts(pass0, budget), Vec::new())
        }
        _ => (Vec::new(), Vec::new()),
    }
}

fn build_concept(
    doc_id: &str,
    index: usize,
    entry: ConceptEntry,
    theme_index: &HashMap<&str, &str>,
) -> Concept {
    let role = match entry.role.as_deref() {
        Some("CENTRAL") => ConceptRole::Central,
        Some("PERIPHERAL") => ConceptRole::Peripheral,
        _ => ConceptRole::Standard,
    };
    let theme_id = entry
        .theme
        .as_deref()
        .and_then(|t| theme_index.get(t).copied())
        .unwrap_or("th_01")
        .to_string();
    let mut triggers: Vec<String> = entry
        .lexical_triggers
        .iter()
        .map(|t| t.to_lowercase())
        .collect();
    if triggers.is_empty() {
        triggers = tokenize(&entry.name);
    }
    Concept {
        concept_id: format!("concept_{doc_id}_{index}"),
        theme_id,
        name: entry.name,
        role,
        lexical_triggers: triggers,
    }
}

/// Heuristic identification: repeated capitalized phrases become
/// concepts, most frequent first.
fn fallback_concepts(pass0: &Pass0Output, budget: usize) -> Vec<Concept> {
    let mut counts: HashMap<String, (String, usize)> = HashMap::new();
    for item in &pass0.items {
        for phrase in capitalized_phrases(&item.text) {
            let key = phrase.to_lowercase();
            let entry = counts.entry(key).or_insert_with(|| (phrase.clone(), 0));
            entry.1 += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_values().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ranked
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .take(budget)
        .enumerate()
        .map(|(i, (name, count))| Concept {
            concept_id: format!("concept_{}_{i}", pass0.document.document_id),
            theme_id: "th_01".into(),
            role: if count >= 4 {
                ConceptRole::Central
            } else {
                ConceptRole::Standard
            },
            lexical_triggers: tokenize(&name),
            name,
        })
        .collect()
}

fn capitalized_phrases(text: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in text.split(|c: char| !(c.is_alphanumeric() || c == '/' || c == '-')) {
        let is_cap = word.len() > 1 && word.chars().next().is_some_and(|c| c.is_uppercase());
        if is_cap {
            current.push(word);
        } else {
            if current.iter().map(|w| w.len()).sum::<usize>() > 3 {
                phrases.push(current.join(" "));
            }
            current.clear();
        }
    }
    if current.iter().map(|w| w.len()).sum::<usize>() > 3 {
        phrases.push(current.join(" "));
    }
    phrases
}

pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(String::from)
        .collect()
}

// ── Refinement (saturation-driven) ──────────────────────────────────────

/// Saturation metrics over the assertion log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Saturation {
    pub promoted: usize,
    pub no_concept_match: usize,
    pub total: usize,
}

impl Saturation {
    pub fn no_concept_match_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.no_concept_match as f64 / self.total as f64
    }

    pub fn coverage_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.promoted as f64 / self.total as f64
    }

    /// Iterate only when unlinked assertions are both frequent and many.
    pub fn should_iterate(&self, cfg: &Pass1Config) -> bool {
        self.no_concept_match_rate() > cfg.refinement_rate_threshold
            && self.no_concept_match > cfg.refinement_count_threshold
    }
}

/// Marginal-yield check between refinement iterations: continue only if
/// the last round actually reduced the unlinked pool.
pub fn should_continue_iteration(
    previous: Saturation,
    current: Saturation,
    iteration: usize,
    cfg: &Pass1Config,
) -> bool {
    if iteration >= cfg.refinement_max_iterations {
        return false;
    }
    current.no_concept_match < previous.no_concept_match
}

/// Propose additional concepts from unlinked assertion texts.
pub async fn refine_concepts(
    unlinked_texts: &[String],
    existing: &[Concept],
    llm: &dyn LlmClient,
    doc_id: &str,
) -> Vec<Concept> {
    if unlinked_texts.is_empty() {
        return Vec::new();
    }
    let existing_names: Vec<&str> = existing.iter().map(|c| c.name.as_str()).collect();
    let sample: Vec<&str> = unlinked_texts.iter().take(30).map(String::as_str).collect();
    let user = format!(
        "These assertions did not match any known concept.\n\
         Known concepts: {}\n\nUnlinked assertions:\n- {}\n\n\
         Propose missing concepts as JSON: {{\"concepts\": [{{\"name\": str, \"lexical_triggers\": [str]}}]}}.\n\
         Only propose concepts genuinely present in the assertions.",
        existing_names.join(", "),
        sample.join("\n- "),
    );
    let messages = [
        ChatMessage::system("You refine a document's concept inventory."),
        ChatMessage::user(user),
    ];
    let options = LlmOptions {
        temperature: 0.2,
        max_tokens: 800,
        response_format: Some("json".into()),
    };

    let Some(parsed) = llm
        .complete(TaskType::ConceptExtraction, &messages, &options)
        .await
        .ok()
        .and_then(|body| parse_json_body::<ConceptResponse>(&body))
    else {
        return Vec::new();
    };

    let known: Vec<String> = existing.iter().map(|c| c.name.to_lowercase()).collect();
    let fresh: Vec<Concept> = parsed
        .concepts
        .into_iter()
        .filter(|entry| !known.contains(&entry.name.to_lowercase()))
        .enumerate()
        .map(|(i, entry)| {
            let triggers = if entry.lexical_triggers.is_empty() {
                tokenize(&entry.name)
            } else {
                entry.lexical_triggers.iter().map(|t| t.to_lowercase()).collect()
            };
            Concept {
                concept_id: format!("concept_{doc_id}_{}", existing.len() + i),
                theme_id: "th_01".into(),
                name: entry.name,
                role: ConceptRole::Standard,
                lexical_triggers: triggers,
            }
        })
        .collect();
    info!(proposed = fresh.len(), "concept_refinement");
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use clients::ScriptedLlm;
    use ingest::{DocumentMetadata, Pass0Config, PlainTextParser, RawDocument};

    fn pass0(text: &str) -> Pass0Output {
        ingest::run_pass0(
            RawDocument::from_text(
                DocumentMetadata {
                    tenant_id: "tenant-a".into(),
                    document_id: Some("doc_concepts".into()),
                    title: "Concept Sample".into(),
                    language: Some("en".into()),
                    source_url: None,
                },
                text,
            ),
            &PlainTextParser,
            &Pass0Config::default(),
        )
        .unwrap()
    }

    #[test]
    fn budget_adapts_to_sections() {
        let cfg = Pass1Config::default();
        assert_eq!(concept_budget(&cfg, 0), 8);
        assert_eq!(concept_budget(&cfg, 4), 16);
        assert_eq!(concept_budget(&cfg, 100), 40);
    }

    #[tokio::test]
    async fn fallback_finds_repeated_names() {
        let out = pass0(
            "Atlas Gateway routes requests between regions. Atlas Gateway also shapes traffic. Zephyr Queue buffers events. Zephyr Queue replays them on demand.",
        );
        let llm = ScriptedLlm::new();
        let analysis = crate::analysis::analyze_document(&out, &out.full_text, &llm, true).await;
        let (concepts, _) =
            identify_concepts(&out, &analysis, &out.full_text, &llm, &Pass1Config::default()).await;
        let names: Vec<&str> = concepts.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"Atlas Gateway"), "got {names:?}");
        assert!(names.contains(&"Zephyr Queue"));
        assert!(concepts.iter().all(|c| !c.lexical_triggers.is_empty()));
    }

    #[test]
    fn saturation_gates_iteration() {
        let cfg = Pass1Config::default();
        let low = Saturation { promoted: 90, no_concept_match: 5, total: 100 };
        assert!(!low.should_iterate(&cfg));
        let high = Saturation { promoted: 50, no_concept_match: 30, total: 100 };
        assert!(high.should_iterate(&cfg));
        // High rate but tiny count: no iteration.
        let tiny = Saturation { promoted: 2, no_concept_match: 3, total: 5 };
        assert!(!tiny.should_iterate(&cfg));
    }

    #[test]
    fn marginal_yield_stops_stalled_refinement() {
        let cfg = Pass1Config::default();
        let before = Saturation { promoted: 40, no_concept_match: 30, total: 100 };
        let after_progress = Saturation { promoted: 55, no_concept_match: 15, total: 100 };
        let after_stall = before;
        assert!(should_continue_iteration(before, after_progress, 1, &cfg));
        assert!(!should_continue_iteration(before, after_stall, 1, &cfg));
        assert!(!should_continue_iteration(before, after_progress, 3, &cfg));
    }
}
