//! Document analysis and global view construction.
//!
//! Analysis classifies the document (subject, structural genre, themes)
//! before any extraction runs; the global view builds a compact
//! meta-document (enhanced TOC plus section leads) that replaces raw
//! content for analysis of large documents.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use clients::{ChatMessage, LlmClient, LlmOptions, TaskType};
use ingest::Pass0Output;
use model::DocItemKind;

use crate::json::{clip, parse_json_body};

/// Structural genre of a document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStructure {
    Narrative,
    Spec,
    Catalog,
    Mixed,
}

/// A theme the document develops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Theme {
    pub theme_id: String,
    pub name: String,
}

/// Result of the analysis phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentAnalysis {
    pub subject: String,
    pub structure: DocumentStructure,
    pub themes: Vec<Theme>,
    pub language: String,
}

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    subject: Option<String>,
    structure: Option<String>,
    #[serde(default)]
    themes: Vec<String>,
}

/// Analyze a document, preferring the LLM and falling back to structure
/// heuristics when the response is unusable.
pub async fn analyze_document(
    pass0: &Pass0Output,
    content: &str,
    llm: &dyn LlmClient,
    allow_fallback: bool,
) -> DocumentAnalysis {
    let toc: Vec<&str> = pass0.sections.iter().map(|s| s.path.as_str()).collect();
    let user = format!(
        "Classify this document.\nTitle: {}\nTOC: {}\nContent (truncated):\n{}\n\n\
         Answer with JSON: {{\"subject\": str, \"structure\": \"narrative|spec|catalog|mixed\", \"themes\": [str]}}",
        pass0.document.title,
        toc.join(" | "),
        clip(content, 4000),
    );
    let messages = [
        ChatMessage::system("You classify enterprise documents for a knowledge pipeline."),
        ChatMessage::user(user),
    ];
    let options = LlmOptions {
        temperature: 0.1,
        max_tokens: 500,
        response_format: Some("json".into()),
    };

    match llm
        .complete(TaskType::DocumentAnalysis, &messages, &options)
        .await
        .ok()
        .and_then(|body| parse_json_body::<AnalysisResponse>(&body))
    {
        Some(parsed) if parsed.subject.is_some() => {
            let structure = match parsed.structure.as_deref() {
                Some("spec") => DocumentStructure::Spec,
                Some("catalog") => DocumentStructure::Catalog,
                Some("mixed") => DocumentStructure::Mixed,
                _ => DocumentStructure::Narrative,
            };
            DocumentAnalysis {
                subject: parsed.subject.unwrap_or_else(|| pass0.document.title.clone()),
                structure,
                themes: parsed
                    .themes
                    .into_iter()
                    .enumerate()
                    .map(|(i, name)| Theme {
                        theme_id: format!("th_{:02}", i + 1),
                        name,
                    })
                    .collect(),
                language: pass0.version.language.clone(),
            }
        }
        _ if allow_fallback => {
            warn!("document analysis falling back to structure heuristics");
            fallback_analysis(pass0)
        }
        _ => DocumentAnalysis {
            subject: pass0.document.title.clone(),
            structure: DocumentStructure::Narrative,
            themes: Vec::new(),
            language: pass0.version.language.clone(),
        },
    }
}

fn fallback_analysis(pass0: &Pass0Output) -> DocumentAnalysis {
    let total = pass0.items.len().max(1);
    let tables = pass0
        .items
        .iter()
        .filter(|i| matches!(i.kind, DocItemKind::Table | DocItemKind::KvList))
        .count();
    let ratio = tables as f64 / total as f64;
    let structure = if ratio > 0.6 {
        DocumentStructure::Catalog
    } else if ratio > 0.25 {
        DocumentStructure::Spec
    } else if ratio > 0.0 {
        DocumentStructure::Mixed
    } else {
        DocumentStructure::Narrative
    };
    DocumentAnalysis {
        subject: pass0.document.title.clone(),
        structure,
        themes: pass0
            .sections
            .iter()
            .enumerate()
            .map(|(i, s)| Theme {
                theme_id: format!("th_{:02}", i + 1),
                name: s.path.clone(),
            })
            .collect(),
        language: pass0.version.language.clone(),
    }
}

/// The synthesized meta-document used for analysis of large inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalView {
    pub meta_document: String,
    pub toc_enhanced: String,
    /// Fraction of sections represented in the meta-document.
    pub coverage_ratio: f64,
}

/// Build the global view: enhanced TOC plus the lead unit of each
/// section. Purely structural; no model call.
pub fn build_global_view(pass0: &Pass0Output) -> GlobalView {
    let mut toc_lines = Vec::new();
    let mut body_lines = Vec::new();
    let mut covered = 0usize;

    for section in &pass0.sections {
        let lead = section.docitem_ids.iter().find_map(|id| {
            pass0
                .unit_index
                .item(id)
                .and_then(|units| units.units.first())
                .map(|u| u.text.clone())
        });
        match lead {
            Some(lead) => {
                covered += 1;
                toc_lines.push(format!("{} - {}", section.path, clip(&lead, 100)));
                body_lines.push(format!("## {}\n{}", section.path, lead));
            }
            None => toc_lines.push(section.path.clone()),
        }
    }

    let coverage_ratio = if pass0.sections.is_empty() {
        0.0
    } else {
        covered as f64 / pass0.sections.len() as f64
    };
    let toc_enhanced = toc_lines.join("\n");
    let meta_document = format!(
        "# {}\n\n{}\n\n{}",
        pass0.document.title,
        toc_enhanced,
        body_lines.join("\n\n")
    );
    info!(
        sections = pass0.sections.len(),
        coverage = coverage_ratio,
        chars = meta_document.len(),
        "global_view_built"
    );
    GlobalView {
        meta_document,
        toc_enhanced,
        coverage_ratio,
    }
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
                    document_id: None,
                    title: "Analysis Sample".into(),
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

    const DOC: &str = "# Security\n\nEvery tenant gets an isolated encryption key for data at rest.\n\n# Limits\n\n| Uploads | 10 GB |\n";

    #[tokio::test]
    async fn llm_answer_wins_when_parseable() {
        let llm = ScriptedLlm::new().script(
            TaskType::DocumentAnalysis,
            vec![r#"{"subject": "Platform security overview", "structure": "spec", "themes": ["security", "limits"]}"#.into()],
        );
        let out = pass0(DOC);
        let analysis = analyze_document(&out, &out.full_text, &llm, true).await;
        assert_eq!(analysis.subject, "Platform security overview");
        assert_eq!(analysis.structure, DocumentStructure::Spec);
        assert_eq!(analysis.themes.len(), 2);
    }

    #[tokio::test]
    async fn unusable_answer_falls_back_to_heuristics() {
        let llm = ScriptedLlm::new();
        let out = pass0(DOC);
        let analysis = analyze_document(&out, &out.full_text, &llm, true).await;
        assert_eq!(analysis.subject, "Analysis Sample");
        assert!(!analysis.themes.is_empty(), "themes derived from sections");
    }

    #[test]
    fn global_view_covers_sections() {
        let out = pass0(DOC);
        let view = build_global_view(&out);
        assert!(view.meta_document.contains("Security"));
        assert!(view.coverage_ratio > 0.0);
        assert!(view.toc_enhanced.lines().count() >= 2);
    }
}
