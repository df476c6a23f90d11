//! The ingestion pipeline: a strictly ordered DAG per document.
//!
//! Structure → coreference → semantics → relations → promotion →
//! navigation → lint. A later pass never starts before the earlier one
//! completed for the document, every write is an idempotent merge, and
//! re-ingesting unchanged content is a no-op detected by content hash.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use clients::{EmbeddingClient, HashEmbedder, LlmClient, ResilientLlm, ScriptedLlm};
use coref::{align_mentions_to_concepts, CorefError, CorefGraphResult, Pass05Pipeline};
use extract::{ExtractError, Pass1Orchestrator, Pass1Result};
use graphnav::{
    concept_key, doc_key, make_document_context_id, make_section_context_id, validate_graph,
    GraphError, GraphStore, InMemoryGraphStore, LintResult, NavigationLayerBuilder,
    NavigationStats, SectionMentions,
};
use ingest::{run_pass0, DocumentParser, IngestError, Pass0Output, PlainTextParser, RawDocument};
use model::DocItem;
use promote::{
    promote_document_relations, NormativeWriteStats, NormativeWriter, PromoteError,
};
use registry::EntityTypeRegistry;
use retrieve::{InMemoryVectorStore, RetrieveError, VectorPoint, VectorStore};

use crate::config::StrataConfig;
use crate::observe::{PipelineStage, StageSpan};

/// Failures of the ingestion pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Coref(#[from] CorefError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Promote(#[from] PromoteError),
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
    #[error("planning failure: {0}")]
    Planner(#[from] planner::PlannerError),
}

/// Shared service handles: the pluggable externals of the pipeline.
#[derive(Clone)]
pub struct PipelineServices {
    pub graph: Arc<dyn GraphStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub llm: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub parser: Arc<dyn DocumentParser>,
    registries: Arc<Mutex<HashMap<String, Arc<EntityTypeRegistry>>>>,
}

impl PipelineServices {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingClient>,
        parser: Arc<dyn DocumentParser>,
    ) -> Self {
        Self {
            graph,
            vectors,
            llm,
            embedder,
            parser,
            registries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fully in-memory services: deterministic stubs, no network. The
    /// configuration every test and the demo binary run on.
    pub fn in_memory() -> Self {
        Self::with_llm(Arc::new(ScriptedLlm::new()))
    }

    /// In-memory services around a caller-supplied LLM, wrapped in the
    /// shared resilience policy like any production provider.
    pub fn with_llm(llm: Arc<dyn LlmClient>) -> Self {
        Self::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(ResilientLlm::new(llm, "in-process")),
            Arc::new(HashEmbedder::default()),
            Arc::new(PlainTextParser),
        )
    }

    /// Entity-type registry for a tenant, created on first use.
    pub fn registry_for(&self, tenant_id: &str) -> Arc<EntityTypeRegistry> {
        let mut registries = self.registries.lock().unwrap_or_else(|p| p.into_inner());
        registries
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(EntityTypeRegistry::new(tenant_id)))
            .clone()
    }
}

/// Terminal report of one ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: String,
    pub doc_version_id: String,
    pub tenant_id: String,
    /// True when the content hash was already ingested.
    pub skipped: bool,
    pub chunks_inserted: usize,
    pub concepts: usize,
    pub informations: usize,
    pub coref_chains: usize,
    pub coref_links: usize,
    pub relations_promoted: usize,
    pub rule_stats: NormativeWriteStats,
    pub navigation: NavigationStats,
    pub lint: LintResult,
}

/// The ingestion pipeline bound to its services and configuration.
pub struct IngestPipeline {
    services: PipelineServices,
    config: StrataConfig,
}

impl IngestPipeline {
    pub fn new(services: PipelineServices, config: StrataConfig) -> Self {
        Self { services, config }
    }

    /// Ingest one document end-to-end.
    pub async fn ingest_document(&self, raw: RawDocument) -> Result<IngestReport, PipelineError> {
        // ── Structure ───────────────────────────────────────────────────
        let span = StageSpan::start(PipelineStage::Structure, &raw.metadata.tenant_id, None);
        let pass0 = match run_pass0(raw, self.services.parser.as_ref(), &self.config.pass0) {
            Ok(out) => {
                span.finish(None);
                out
            }
            Err(err) => {
                span.finish(Some(err.to_string()));
                return Err(err.into());
            }
        };
        let tenant_id = pass0.version.tenant_id.clone();
        let doc_version_id = pass0.version.doc_version_id.clone();
        let graph = self.services.graph.as_ref();

        // Idempotence: an already-ingested version is a no-op.
        let version_key = format!("dv:{tenant_id}:{doc_version_id}");
        if graph.get_node(&version_key)?.is_some() {
            info!(doc_version_id = %doc_version_id, "ingest_skipped_existing_version");
            return Ok(IngestReport {
                document_id: pass0.document.document_id.clone(),
                doc_version_id,
                tenant_id: tenant_id.clone(),
                skipped: true,
                chunks_inserted: 0,
                concepts: 0,
                informations: 0,
                coref_chains: 0,
                coref_links: 0,
                relations_promoted: 0,
                rule_stats: NormativeWriteStats::default(),
                navigation: NavigationStats::default(),
                lint: validate_graph(graph, &tenant_id)?,
            });
        }

        self.persist_structure(&pass0).await?;

        // ── Coreference ─────────────────────────────────────────────────
        let span = StageSpan::start(
            PipelineStage::Coreference,
            &tenant_id,
            Some(&doc_version_id),
        );
        let coref_pipeline =
            Pass05Pipeline::new(self.config.coref.clone(), Some(self.services.llm.as_ref()));
        let coref_result = match coref_pipeline.process_document(&pass0).await {
            Ok(result) => {
                span.finish(None);
                result
            }
            Err(CorefError::EmptyDocument) => {
                span.finish(Some("empty document".into()));
                CorefGraphResult::default()
            }
            Err(err) => {
                span.finish(Some(err.to_string()));
                return Err(err.into());
            }
        };
        self.persist_coref(&tenant_id, &coref_result)?;

        // ── Semantics ───────────────────────────────────────────────────
        let span = StageSpan::start(PipelineStage::Semantics, &tenant_id, Some(&doc_version_id));
        let orchestrator = Pass1Orchestrator::new(
            self.services.llm.as_ref(),
            self.services.embedder.as_ref(),
            self.config.pass1.clone(),
        );
        let pass1 = match orchestrator.process(&pass0).await {
            Ok(result) => {
                span.finish(None);
                result
            }
            Err(err) => {
                span.finish(Some(err.to_string()));
                return Err(err.into());
            }
        };
        self.persist_semantics(&tenant_id, &pass0, &pass1, &coref_result)?;

        // ── Relations: rules and facts ──────────────────────────────────
        let span = StageSpan::start(PipelineStage::Relations, &tenant_id, Some(&doc_version_id));
        let writer = NormativeWriter::new(graph, &tenant_id);
        let mut rule_stats = writer.write_rules(&pass1.rules)?;
        let fact_stats = writer.write_facts(&pass1.facts)?;
        rule_stats.facts_written = fact_stats.facts_written;
        rule_stats.facts_deduplicated = fact_stats.facts_deduplicated;
        span.finish(None);

        // ── Promotion ───────────────────────────────────────────────────
        let span = StageSpan::start(PipelineStage::Promotion, &tenant_id, Some(&doc_version_id));
        let promoted = promote_document_relations(
            graph,
            &tenant_id,
            &pass0.document.document_id,
            &relations_with_canonical_ids(&pass1),
            &self.config.promotion,
            &self.config.tier_matrix,
        )?;
        span.finish(None);

        // ── Navigation ──────────────────────────────────────────────────
        let span = StageSpan::start(PipelineStage::Navigation, &tenant_id, Some(&doc_version_id));
        let navigation = self.build_navigation(&tenant_id, &pass0, &pass1)?;
        span.finish(None);

        // ── Lint ────────────────────────────────────────────────────────
        let span = StageSpan::start(PipelineStage::Lint, &tenant_id, Some(&doc_version_id));
        let lint = validate_graph(graph, &tenant_id)?;
        if lint.success {
            span.finish(None);
        } else {
            span.finish(Some(format!("{} violations", lint.violations.len())));
            warn!(
                doc_version_id = %doc_version_id,
                violations = lint.violations.len(),
                "graph_lint_blocked_release"
            );
        }

        Ok(IngestReport {
            document_id: pass0.document.document_id.clone(),
            doc_version_id,
            tenant_id,
            skipped: false,
            chunks_inserted: pass0.chunks.len(),
            concepts: pass1.canonical_concepts.len(),
            informations: pass1.informations.len(),
            coref_chains: coref_result.chains.len(),
            coref_links: coref_result.links.len(),
            relations_promoted: promoted.len(),
            rule_stats,
            navigation,
            lint,
        })
    }

    /// Persist Pass 0 output: document, version, chunks, vector points.
    async fn persist_structure(&self, pass0: &Pass0Output) -> Result<(), PipelineError> {
        let graph = self.services.graph.as_ref();
        let tenant_id = &pass0.version.tenant_id;
        let document_id = &pass0.document.document_id;

        let mut doc_props = Map::new();
        doc_props.insert("document_id".into(), json!(document_id));
        doc_props.insert("title".into(), json!(pass0.document.title));
        doc_props.insert("language".into(), json!(pass0.document.language));
        graph.merge_node(
            &doc_key(tenant_id, document_id),
            &["Document"],
            tenant_id,
            doc_props,
            &[],
        )?;

        let mut version_props = Map::new();
        version_props.insert("doc_version_id".into(), json!(pass0.version.doc_version_id));
        version_props.insert("content_hash".into(), json!(pass0.version.content_hash));
        version_props.insert("language".into(), json!(pass0.version.language));
        let version_key = format!("dv:{tenant_id}:{}", pass0.version.doc_version_id);
        graph.merge_node(&version_key, &["DocumentVersion"], tenant_id, version_props, &[])?;
        graph.merge_edge(
            &version_key,
            "IN_DOCUMENT",
            &doc_key(tenant_id, document_id),
            Map::new(),
            &[],
        )?;

        // Chunk nodes plus embedded vector points.
        let texts: Vec<String> = pass0.chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .services
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| RetrieveError::Embedding(e.to_string()))?;

        let mut points = Vec::with_capacity(pass0.chunks.len());
        for (chunk, vector) in pass0.chunks.iter().zip(vectors) {
            let chunk_key = format!("chunk:{tenant_id}:{}", chunk.chunk_id);
            let mut chunk_props = Map::new();
            chunk_props.insert("chunk_id".into(), json!(chunk.chunk_id));
            chunk_props.insert("kind".into(), json!(chunk.kind));
            chunk_props.insert("order_start".into(), json!(chunk.order_start));
            graph.merge_node(&chunk_key, &["Chunk"], tenant_id, chunk_props, &[])?;
            graph.merge_edge(
                &chunk_key,
                "IN_DOCUMENT",
                &doc_key(tenant_id, document_id),
                Map::new(),
                &[],
            )?;

            let context_id = match &chunk.section_path {
                Some(path) => make_section_context_id(document_id, path),
                None => make_document_context_id(document_id),
            };
            let mut payload = Map::new();
            payload.insert("tenant_id".into(), json!(tenant_id));
            payload.insert("document_id".into(), json!(document_id));
            payload.insert("context_id".into(), json!(context_id));
            payload.insert(
                "section_path".into(),
                chunk.section_path.as_ref().map(|p| json!(p)).unwrap_or(Value::Null),
            );
            payload.insert("document_name".into(), json!(pass0.document.title));
            payload.insert("text".into(), json!(chunk.text));
            payload.insert("type".into(), json!("chunk"));
            points.push(VectorPoint {
                id: chunk.chunk_id.clone(),
                vector,
                payload,
            });
        }
        self.services
            .vectors
            .upsert(&self.config.retrieve.collection, points)?;
        Ok(())
    }

    /// Persist the coref graph: spans, chains, links, audit decisions.
    fn persist_coref(
        &self,
        tenant_id: &str,
        result: &CorefGraphResult,
    ) -> Result<(), PipelineError> {
        let graph = self.services.graph.as_ref();
        for span in &result.mention_spans {
            let mut props = Map::new();
            props.insert("surface".into(), json!(span.surface));
            props.insert("kind".into(), json!(span.kind));
            props.insert("docitem_id".into(), json!(span.docitem_id));
            props.insert("span_start".into(), json!(span.span_start));
            props.insert("span_end".into(), json!(span.span_end));
            graph.merge_node(
                &format!("men:{tenant_id}:{}", span.mention_id),
                &["MentionSpan"],
                tenant_id,
                props,
                &[],
            )?;
        }
        for chain in &result.chains {
            let mut props = Map::new();
            props.insert("method".into(), json!(chain.method));
            props.insert("confidence".into(), json!(chain.confidence));
            props.insert("mention_ids".into(), json!(chain.mention_ids));
            graph.merge_node(
                &format!("chn:{tenant_id}:{}", chain.chain_id),
                &["CoreferenceChain"],
                tenant_id,
                props,
                &[],
            )?;
        }
        for link in &result.links {
            let mut props = Map::new();
            props.insert("method".into(), json!(link.method));
            props.insert("confidence".into(), json!(link.confidence));
            props.insert("scope".into(), json!(link.scope));
            graph.merge_edge(
                &format!("men:{tenant_id}:{}", link.source_mention_id),
                "COREFERS_TO",
                &format!("men:{tenant_id}:{}", link.target_mention_id),
                props,
                &[],
            )?;
        }
        for decision in &result.decisions {
            let mut props = Map::new();
            props.insert("mention_span_key".into(), json!(decision.mention_span_key));
            props.insert("outcome".into(), json!(decision.outcome));
            props.insert("reason_code".into(), json!(decision.reason_code));
            props.insert("method".into(), json!(decision.method));
            graph.merge_node(
                &format!("cdec:{tenant_id}:{}", decision.decision_id),
                &["CorefDecision"],
                tenant_id,
                props,
                &[],
            )?;
        }
        Ok(())
    }

    /// Persist Pass 1 output: concepts, assertions, mention alignments.
    fn persist_semantics(
        &self,
        tenant_id: &str,
        pass0: &Pass0Output,
        pass1: &Pass1Result,
        coref: &CorefGraphResult,
    ) -> Result<(), PipelineError> {
        let graph = self.services.graph.as_ref();
        let registry = self.services.registry_for(tenant_id);

        for concept in &pass1.canonical_concepts {
            let mut props = Map::new();
            props.insert("canonical_id".into(), json!(concept.canonical_id));
            props.insert("canonical_name".into(), json!(concept.canonical_name));
            props.insert("concept_type".into(), json!(concept.concept_type));
            props.insert("surface_forms".into(), json!(concept.surface_forms));
            props.insert("quality_score".into(), json!(concept.quality_score));
            props.insert("status".into(), json!(concept.status));
            graph.merge_node(
                &concept_key(tenant_id, &concept.canonical_id),
                &["CanonicalConcept"],
                tenant_id,
                props,
                &[graphnav::MergeOp::Increment { key: "support".into(), by: i64::from(concept.support) }],
            )?;
            // Typing is governed; unknown types enter the registry as
            // pending and wait for an admin. A rejected name means an
            // extractor emitted a malformed type; the concept still
            // persists, so log and keep going.
            if let Err(err) = registry.register_sighting(&concept.concept_type) {
                warn!(
                    concept_type = %concept.concept_type,
                    error = %err,
                    "entity_type_sighting_rejected"
                );
            }
        }

        for info in &pass1.informations {
            let mut props = Map::new();
            props.insert("text".into(), json!(info.assertion.text));
            props.insert("kind".into(), json!(info.assertion.kind));
            props.insert("confidence".into(), json!(info.assertion.confidence));
            props.insert("docitem_id".into(), json!(info.assertion.anchor.docitem_id));
            props.insert("unit_id".into(), json!(info.assertion.anchor.unit_id));
            props.insert("char_start".into(), json!(info.assertion.anchor.char_start));
            props.insert("char_end".into(), json!(info.assertion.anchor.char_end));
            let assertion_key = format!("asr:{tenant_id}:{}", info.assertion.assertion_id);
            graph.merge_node(&assertion_key, &["RawAssertion"], tenant_id, props, &[])?;
            graph.merge_edge(
                &assertion_key,
                "EXTRACTED_FROM",
                &doc_key(tenant_id, &pass0.document.document_id),
                Map::new(),
                &[],
            )?;
        }

        // Lexical alignments between coref mentions and concepts. These
        // are alignments, not identity assertions.
        if !self.config.coref.create_concept_alignments {
            return Ok(());
        }
        let alignments = align_mentions_to_concepts(&coref.mention_spans, &pass1.canonical_concepts);
        for alignment in alignments {
            let mut props = Map::new();
            props.insert("method".into(), json!(alignment.method));
            graph.merge_edge(
                &format!("men:{tenant_id}:{}", alignment.mention_id),
                "MATCHES_PROTOCONCEPT",
                &concept_key(tenant_id, &alignment.concept_id),
                props,
                &[],
            )?;
        }
        Ok(())
    }

    /// Build the navigation layer and the topic routing structure.
    fn build_navigation(
        &self,
        tenant_id: &str,
        pass0: &Pass0Output,
        pass1: &Pass1Result,
    ) -> Result<NavigationStats, PipelineError> {
        let graph = self.services.graph.as_ref();
        let document_id = &pass0.document.document_id;
        let items: HashMap<&str, &DocItem> = pass0
            .items
            .iter()
            .map(|i| (i.docitem_id.as_str(), i))
            .collect();

        // Concept id → store key, via the working-concept inventory.
        let concept_store_key: HashMap<&str, String> = pass1
            .concepts
            .iter()
            .zip(&pass1.canonical_concepts)
            .map(|(working, canonical)| {
                (
                    working.concept_id.as_str(),
                    concept_key(tenant_id, &canonical.canonical_id),
                )
            })
            .collect();

        // Mention counts per section and per document.
        let mut doc_counts: HashMap<String, u32> = HashMap::new();
        let mut section_counts: HashMap<String, HashMap<String, u32>> = HashMap::new();
        for info in &pass1.informations {
            let Some(key) = concept_store_key.get(info.concept_id.as_str()) else {
                continue;
            };
            *doc_counts.entry(key.clone()).or_insert(0) += 1;
            if let Some(section) = items
                .get(info.assertion.anchor.docitem_id.as_str())
                .and_then(|item| item.section_id.clone())
            {
                *section_counts
                    .entry(section)
                    .or_default()
                    .entry(key.clone())
                    .or_insert(0) += 1;
            }
        }

        let sections: Vec<SectionMentions> = pass0
            .sections
            .iter()
            .map(|section| SectionMentions {
                path: section.path.clone(),
                level: section.level,
                concept_counts: section_counts.remove(&section.path).unwrap_or_default(),
            })
            .collect();

        let builder =
            NavigationLayerBuilder::new(graph, self.config.navigation.clone(), tenant_id);
        let stats = builder.build_for_document(
            document_id,
            Some(&pass0.document.title),
            &sections,
            &doc_counts,
        )?;

        // Topic structure for anchored routing: one TOPIC concept per
        // theme, covering the concepts assigned to it.
        for theme in &pass1.analysis.themes {
            let topic_id = format!("topic_{}", model::short_hash(&format!("{tenant_id}|{}", theme.name)));
            let topic_key = concept_key(tenant_id, &topic_id);
            let mut props = Map::new();
            props.insert("canonical_id".into(), json!(topic_id));
            props.insert("canonical_name".into(), json!(theme.name));
            props.insert("concept_type".into(), json!("TOPIC"));
            graph.merge_node(&topic_key, &["CanonicalConcept"], tenant_id, props, &[])?;
            graph.merge_edge(
                &doc_key(tenant_id, document_id),
                "HAS_TOPIC",
                &topic_key,
                Map::new(),
                &[],
            )?;

            for (working, canonical) in pass1.concepts.iter().zip(&pass1.canonical_concepts) {
                if working.theme_id != theme.theme_id {
                    continue;
                }
                graph.merge_edge(
                    &topic_key,
                    "COVERS",
                    &concept_key(tenant_id, &canonical.canonical_id),
                    Map::new(),
                    &[],
                )?;
            }
            // The topic inherits its covered concepts' section mentions
            // so anchored routing has contexts to land on.
            for section in &sections {
                if section.concept_counts.is_empty() {
                    continue;
                }
                let context_id = make_section_context_id(document_id, &section.path);
                builder.link_concept_to_context(&topic_key, &context_id, 1)?;
            }
        }
        builder.compute_weights(Some(document_id))?;

        Ok(stats)
    }
}

/// Rewrite working-concept ids in relations to canonical ids so the
/// aggregates and edges live on canonical concepts.
fn relations_with_canonical_ids(pass1: &Pass1Result) -> Vec<extract::TypedRelation> {
    let mapping: HashMap<&str, &str> = pass1
        .concepts
        .iter()
        .zip(&pass1.canonical_concepts)
        .map(|(working, canonical)| {
            (working.concept_id.as_str(), canonical.canonical_id.as_str())
        })
        .collect();
    pass1
        .relations
        .iter()
        .cloned()
        .filter_map(|mut relation| {
            let subject = mapping.get(relation.subject_concept_id.as_str())?;
            let object = mapping.get(relation.object_concept_id.as_str())?;
            relation.subject_concept_id = (*subject).to_string();
            relation.object_concept_id = (*object).to_string();
            Some(relation)
        })
        .collect()
}
