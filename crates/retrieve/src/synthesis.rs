//! Answer synthesis.
//!
//! Composes the grounded prompt (session context, question, formatted
//! source blocks, optional chain narrative) and asks the LLM for an
//! answer under strict citation rules. With no usable sources the
//! synthesizer returns a neutral message instead of inventing content.

use serde::{Deserialize, Serialize};
use tracing::info;

use clients::{ChatMessage, LlmClient, LlmOptions, TaskType};

use crate::confidence::{
    compute_confidence, ChainSignals, ConfidenceBreakdown, ConfidenceConfig, KgSignals,
};
use crate::retriever::RetrievedChunk;
use crate::RetrieveError;

/// How much graph narrative the synthesis prompt carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GraphEnrichmentLevel {
    None,
    Light,
    Standard,
    Deep,
}

impl Default for GraphEnrichmentLevel {
    fn default() -> Self {
        GraphEnrichmentLevel::Standard
    }
}

impl GraphEnrichmentLevel {
    /// Number of reasoning chains included in the prompt.
    pub fn chain_budget(self) -> usize {
        match self {
            GraphEnrichmentLevel::None => 0,
            GraphEnrichmentLevel::Light => 2,
            GraphEnrichmentLevel::Standard => 5,
            GraphEnrichmentLevel::Deep => 10,
        }
    }
}

/// Inputs to one synthesis call beyond the chunks themselves.
#[derive(Debug, Clone, Default)]
pub struct SynthesisContext {
    pub session_context: Option<String>,
    /// Pre-rendered chain narratives ("A requires B (doc X); B …").
    pub graph_chains: Vec<String>,
    pub kg_signals: Option<KgSignals>,
    pub chain_signals: Option<ChainSignals>,
    pub enrichment: GraphEnrichmentLevel,
}

impl SynthesisContext {
    pub fn none() -> Self {
        Self {
            enrichment: GraphEnrichmentLevel::None,
            ..Default::default()
        }
    }
}

/// The synthesized answer with its audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisResult {
    pub synthesized_answer: String,
    pub sources_used: Vec<String>,
    pub confidence: f64,
    pub confidence_breakdown: ConfidenceBreakdown,
}

const NO_RESULTS_MESSAGE: &str =
    "No relevant information was found in the knowledge base for this question.";

/// Format chunks as numbered source blocks with document + slide refs.
pub fn format_chunks_for_synthesis(chunks: &[RetrievedChunk]) -> String {
    let mut unique_docs: Vec<&str> = chunks
        .iter()
        .map(|c| c.document_name.as_str())
        .filter(|name| !name.is_empty())
        .collect();
    unique_docs.sort_unstable();
    unique_docs.dedup();

    let mut blocks = Vec::new();
    if unique_docs.len() > 1 {
        blocks.push(format!("AVAILABLE DOCUMENTS: {}", unique_docs.join(", ")));
        blocks.push("=".repeat(50));
    }

    for (idx, chunk) in chunks.iter().enumerate() {
        let slide_ref = match chunk.slide_index {
            Some(slide) => format!("Slide {slide}"),
            None => match &chunk.section_path {
                Some(path) => format!("Section {path}"),
                None => "Location unspecified".to_string(),
            },
        };
        let document_name = if chunk.document_name.is_empty() {
            "Unknown document"
        } else {
            &chunk.document_name
        };
        blocks.push(format!(
            "### Source {}: {document_name}, {slide_ref}\n\n{}",
            idx + 1,
            chunk.text.trim()
        ));
    }
    blocks.join("\n\n")
}

fn build_prompt(question: &str, chunks: &[RetrievedChunk], context: &SynthesisContext) -> String {
    let session = context
        .session_context
        .as_deref()
        .map(|s| format!("## Previous conversation\n{s}\n\n"))
        .unwrap_or_default();

    let chains: Vec<&str> = context
        .graph_chains
        .iter()
        .take(context.enrichment.chain_budget())
        .map(String::as_str)
        .collect();
    let graph_section = if chains.is_empty() {
        String::new()
    } else {
        format!(
            "\n## Cross-document reasoning\nThese chains connect facts across documents; \
             structure the answer around them and cite every document they touch:\n- {}\n",
            chains.join("\n- ")
        )
    };

    format!(
        "You answer questions from an enterprise knowledge base.\n{session}\
         ## Question\n{question}\n\n\
         ## Available sources\n{}\n{graph_section}\n\
         ## Answer rules\n\
         1. Synthesize the sources into a clear, structured answer.\n\
         2. Cite every important statement as (Source: <document>, <slide/section>).\n\
         3. Cite only documents named in the sources; never invent a source.\n\
         4. If the sources are insufficient, say so plainly.\n\
         5. If sources contradict each other, present both with their citations.\n\
         6. Answer in the language of the question.\n\nAnswer:",
        format_chunks_for_synthesis(chunks),
    )
}

/// Synthesize an answer from reranked chunks.
pub async fn synthesize_response(
    question: &str,
    chunks: &[RetrievedChunk],
    context: &SynthesisContext,
    llm: &dyn LlmClient,
    confidence_cfg: &ConfidenceConfig,
) -> Result<SynthesisResult, RetrieveError> {
    if chunks.is_empty() {
        return Ok(SynthesisResult {
            synthesized_answer: NO_RESULTS_MESSAGE.to_string(),
            sources_used: Vec::new(),
            confidence: 0.0,
            confidence_breakdown: compute_confidence(&[], None, None, confidence_cfg),
        });
    }

    let prompt = build_prompt(question, chunks, context);
    info!(prompt_chars = prompt.len(), chunks = chunks.len(), "synthesis_start");

    let messages = [
        ChatMessage::system(
            "You are a careful assistant that synthesizes grounded answers with citations.",
        ),
        ChatMessage::user(prompt),
    ];
    let options = LlmOptions {
        temperature: 0.3,
        max_tokens: 2000,
        response_format: None,
    };
    let answer = llm
        .complete(TaskType::LongTextSummary, &messages, &options)
        .await
        .map_err(|e| RetrieveError::Synthesis(e.to_string()))?;

    let mut sources_used: Vec<String> = chunks
        .iter()
        .map(|c| c.document_name.clone())
        .filter(|name| !name.is_empty())
        .collect();
    sources_used.dedup();

    let breakdown = compute_confidence(
        chunks,
        context.kg_signals,
        context.chain_signals,
        confidence_cfg,
    );

    Ok(SynthesisResult {
        synthesized_answer: answer.trim().to_string(),
        sources_used,
        confidence: breakdown.final_score,
        confidence_breakdown: breakdown,
    })
}

/// Render chain narratives from a plan's paths for the prompt.
pub fn render_chain_narratives(paths: &[planner::SemanticPath]) -> Vec<String> {
    paths
        .iter()
        .map(|path| {
            let mut narrative = String::new();
            for (i, relation) in path.relations.iter().enumerate() {
                if i > 0 {
                    narrative.push_str("; ");
                }
                let subject = path.node_names.get(i).map(String::as_str).unwrap_or("?");
                let object = path.node_names.get(i + 1).map(String::as_str).unwrap_or("?");
                narrative.push_str(&format!(
                    "{subject} {} {object}",
                    relation.to_lowercase().replace('_', " ")
                ));
            }
            narrative.push_str(&format!(
                " (confidence {:.2}, tier {})",
                path.confidence,
                path.path_tier.label()
            ));
            narrative
        })
        .collect()
}

/// Derive chain signals from a plan's paths.
pub fn chain_signals_from_paths(
    paths: &[planner::SemanticPath],
    distinct_docs: usize,
) -> Option<ChainSignals> {
    if paths.is_empty() {
        return None;
    }
    Some(ChainSignals {
        chain_count: paths.len(),
        distinct_docs_count: distinct_docs,
        max_hops: paths.iter().map(|p| p.length).max().unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clients::ScriptedLlm;

    fn chunk(doc: &str, slide: Option<u32>, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            text: text.into(),
            document_id: "doc_1".into(),
            document_name: doc.into(),
            context_id: None,
            section_path: Some("2.3 Security".into()),
            slide_index: slide,
            score: 0.8,
            rerank_score: 1.0,
        }
    }

    #[tokio::test]
    async fn empty_chunks_return_neutral_message() {
        let llm = ScriptedLlm::new();
        let result = synthesize_response(
            "anything?",
            &[],
            &SynthesisContext::none(),
            &llm,
            &ConfidenceConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.synthesized_answer, NO_RESULTS_MESSAGE);
        assert_eq!(result.confidence, 0.0);
        assert!(result.sources_used.is_empty());
    }

    #[tokio::test]
    async fn answer_carries_sources_and_breakdown() {
        let llm = ScriptedLlm::new().script(
            TaskType::LongTextSummary,
            vec!["TLS 1.2 is required. (Source: Security Guide, Slide 12)".into()],
        );
        let chunks = vec![
            chunk("Security Guide", Some(12), "TLS 1.2 is required for all traffic."),
            chunk("Ops Handbook", None, "Certificates rotate every 90 days."),
        ];
        let result = synthesize_response(
            "Is TLS required?",
            &chunks,
            &SynthesisContext::none(),
            &llm,
            &ConfidenceConfig::default(),
        )
        .await
        .unwrap();

        assert!(result.synthesized_answer.contains("Source"));
        assert_eq!(result.sources_used, vec!["Security Guide", "Ops Handbook"]);
        assert!(result.confidence > 0.0);
        assert!(result.confidence <= 0.90);
        assert_eq!(result.confidence, result.confidence_breakdown.final_score);
    }

    #[test]
    fn source_blocks_carry_document_and_location() {
        let chunks = vec![
            chunk("Security Guide", Some(12), "TLS text"),
            chunk("Ops Handbook", None, "Rotation text"),
        ];
        let formatted = format_chunks_for_synthesis(&chunks);
        assert!(formatted.contains("AVAILABLE DOCUMENTS: Ops Handbook, Security Guide"));
        assert!(formatted.contains("### Source 1: Security Guide, Slide 12"));
        assert!(formatted.contains("### Source 2: Ops Handbook, Section 2.3 Security"));
    }

    #[test]
    fn enrichment_levels_bound_chain_budget() {
        assert_eq!(GraphEnrichmentLevel::None.chain_budget(), 0);
        assert!(GraphEnrichmentLevel::Deep.chain_budget() > GraphEnrichmentLevel::Light.chain_budget());
    }
}
