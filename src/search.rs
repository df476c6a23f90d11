//! The query path: plan → retrieve → synthesize.
//!
//! The graph decides the search mode before any vector work happens.
//! When the plan filters to specific contexts but retrieval comes back
//! empty, the service retries unfiltered rather than answering nothing;
//! graph guidance narrows, it never censors.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::info;

use clients::{CacheConfig, TtlCache};
use planner::{GraphFirstPlanner, SearchMode, TraversalPolicy};
use retrieve::{
    chain_signals_from_paths, render_chain_narratives, synthesize_response, ConfidenceBreakdown,
    GraphEnrichmentLevel, KgSignals, LexicalReranker, RetrievedChunk, Retriever, SynthesisContext,
};

use crate::config::StrataConfig;
use crate::observe::{PipelineStage, StageSpan};
use crate::pipeline::{PipelineError, PipelineServices};

/// One search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub question: String,
    pub language: Option<String>,
    pub session_id: Option<String>,
    pub use_graph_context: bool,
    pub enrichment: GraphEnrichmentLevel,
    pub tier_policy: Option<TraversalPolicy>,
}

impl SearchRequest {
    pub fn question(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            language: None,
            session_id: None,
            use_graph_context: true,
            enrichment: GraphEnrichmentLevel::Standard,
            tier_policy: None,
        }
    }

    pub fn with_policy(mut self, policy: TraversalPolicy) -> Self {
        self.tier_policy = Some(policy);
        self
    }
}

/// One search response with its audit trail.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub chunks: Vec<RetrievedChunk>,
    pub synthesized_answer: String,
    pub sources: Vec<String>,
    pub confidence: f64,
    pub confidence_breakdown: ConfidenceBreakdown,
    pub mode: SearchMode,
    pub plan_audit: Value,
}

/// Search service bound to its services and configuration.
pub struct SearchService {
    services: PipelineServices,
    config: StrataConfig,
    session_contexts: TtlCache<String, String>,
}

impl SearchService {
    pub fn new(services: PipelineServices, config: StrataConfig) -> Self {
        Self {
            services,
            config,
            session_contexts: TtlCache::new(CacheConfig::default()),
        }
    }

    /// Remember conversational context for a session; it expires on its
    /// own and the next search for the session carries it.
    pub fn set_session_context(&self, session_id: &str, context: &str) {
        self.session_contexts
            .put(session_id.to_string(), context.to_string());
    }

    /// Run one grounded search.
    pub async fn search(
        &self,
        tenant_id: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, PipelineError> {
        // ── Plan ────────────────────────────────────────────────────────
        let span = StageSpan::start(PipelineStage::Plan, tenant_id, None);
        let planner = GraphFirstPlanner::new(
            self.services.graph.as_ref(),
            self.services.embedder.as_ref(),
            tenant_id,
            TraversalPolicy::Strict,
        );
        let plan = match planner
            .build_search_plan(&request.question, request.tier_policy)
            .await
        {
            Ok(plan) => {
                span.finish(None);
                plan
            }
            Err(err) => {
                span.finish(Some(err.to_string()));
                return Err(err.into());
            }
        };

        // ── Retrieve ────────────────────────────────────────────────────
        let span = StageSpan::start(PipelineStage::Retrieve, tenant_id, None);
        let reranker = LexicalReranker;
        let retriever = Retriever::new(
            self.services.vectors.as_ref(),
            self.services.embedder.as_ref(),
            &reranker,
            self.config.retrieve.clone(),
        );
        let context_ids = plan.context_ids_for_retrieval();
        let mut chunks = retriever
            .retrieve(tenant_id, &request.question, &context_ids)
            .await?;
        if chunks.is_empty() && !context_ids.is_empty() {
            // Context filter came back dry; widen to the whole tenant.
            info!("context_filtered_retrieval_empty_retrying_unfiltered");
            chunks = retriever.retrieve(tenant_id, &request.question, &[]).await?;
        }
        span.finish(None);

        // ── Synthesize ──────────────────────────────────────────────────
        let span = StageSpan::start(PipelineStage::Synthesize, tenant_id, None);
        let distinct_docs = chunks
            .iter()
            .map(|c| c.document_id.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        let (graph_chains, kg_signals, chain_signals) = if request.use_graph_context
            && plan.mode == SearchMode::Reasoned
        {
            let kg = KgSignals {
                concepts_count: plan.seed_concepts.len(),
                relations_count: plan.paths.iter().map(|p| p.length).sum(),
                sources_count: distinct_docs,
                avg_confidence: if plan.paths.is_empty() {
                    0.0
                } else {
                    plan.paths.iter().map(|p| p.confidence).sum::<f64>()
                        / plan.paths.len() as f64
                },
            };
            (
                render_chain_narratives(&plan.paths),
                Some(kg),
                chain_signals_from_paths(&plan.paths, distinct_docs),
            )
        } else {
            (Vec::new(), None, None)
        };

        let synthesis_context = SynthesisContext {
            session_context: request
                .session_id
                .as_ref()
                .and_then(|id| self.session_contexts.get(id)),
            graph_chains,
            kg_signals,
            chain_signals,
            enrichment: request.enrichment,
        };
        let synthesis = match synthesize_response(
            &request.question,
            &chunks,
            &synthesis_context,
            self.services.llm.as_ref(),
            &self.config.confidence,
        )
        .await
        {
            Ok(result) => {
                span.finish(None);
                result
            }
            Err(err) => {
                span.finish(Some(err.to_string()));
                return Err(err.into());
            }
        };

        Ok(SearchResponse {
            plan_audit: plan.audit(),
            mode: plan.mode,
            chunks,
            synthesized_answer: synthesis.synthesized_answer,
            sources: synthesis.sources_used,
            confidence: synthesis.confidence,
            confidence_breakdown: synthesis.confidence_breakdown,
        })
    }
}
