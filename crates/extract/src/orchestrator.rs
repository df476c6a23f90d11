//! Pass 1 orchestrator: the strictly ordered semantic phases.
//!
//! Phase order per document: global view → analysis → concept
//! identification → (pointer extraction) → assertion extraction →
//! promotion policy → concept linking → anchor resolution → refinement
//! loop → typed relations → normative rules and spec facts.
//!
//! Per-item model calls run in a bounded task pool; everything else is
//! sequential because each phase feeds the next.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::info;

use clients::{EmbeddingClient, LlmClient};
use ingest::Pass0Output;
use model::{
    short_hash, AssertionKind, CanonicalConcept, ConceptStatus, NormativeRule, RawAssertion,
    SpecFact,
};

use crate::analysis::{analyze_document, build_global_view, DocumentAnalysis, GlobalView};
use crate::anchor::AnchorResolver;
use crate::assertions::{
    extract_assertions, filter_by_promotion_policy, link_to_concepts, AssertionDraft,
};
use crate::concepts::{
    identify_concepts, refine_concepts, should_continue_iteration, Concept, Saturation,
};
use crate::config::Pass1Config;
use crate::error::{AbstainReason, ExtractError};
use crate::normative::{extract_rules_from_item, extract_spec_facts};
use crate::pointer::{extract_pointers_for_item, ConceptAnchored, PointerValidator};
use crate::relations::{RelationExtractionEngine, TypedRelation};

/// Final status of one assertion in the log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssertionStatus {
    Promoted,
    Abstained,
    Rejected,
}

/// Append-only log entry: every extracted assertion ends up here with
/// its fate, promoted or not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssertionLogEntry {
    pub assertion_id: String,
    pub text: String,
    pub kind: AssertionKind,
    pub confidence: f64,
    pub status: AssertionStatus,
    pub reason: Option<AbstainReason>,
    pub concept_id: Option<String>,
}

/// A promoted assertion bound to its concept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Information {
    pub info_id: String,
    pub concept_id: String,
    pub assertion: RawAssertion,
}

/// Counters of one Pass 1 run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pass1Stats {
    pub themes: usize,
    pub concepts: usize,
    pub assertions_total: usize,
    pub assertions_promoted: usize,
    pub assertions_abstained: usize,
    pub assertions_rejected: usize,
    pub refinement_iterations: usize,
    pub pointer_anchored: usize,
    pub relations: usize,
    pub rules: usize,
    pub facts: usize,
}

/// Everything Pass 1 produces for one document version.
#[derive(Debug, Clone)]
pub struct Pass1Result {
    pub analysis: DocumentAnalysis,
    pub global_view: Option<GlobalView>,
    pub concepts: Vec<Concept>,
    pub canonical_concepts: Vec<CanonicalConcept>,
    pub informations: Vec<Information>,
    pub assertion_log: Vec<AssertionLogEntry>,
    pub anchored_concepts: Vec<ConceptAnchored>,
    pub relations: Vec<TypedRelation>,
    pub rules: Vec<NormativeRule>,
    pub facts: Vec<SpecFact>,
    pub stats: Pass1Stats,
}

/// Pass 1 orchestrator bound to its clients.
pub struct Pass1Orchestrator<'a> {
    llm: &'a dyn LlmClient,
    embedder: &'a dyn EmbeddingClient,
    config: Pass1Config,
}

impl<'a> Pass1Orchestrator<'a> {
    pub fn new(
        llm: &'a dyn LlmClient,
        embedder: &'a dyn EmbeddingClient,
        config: Pass1Config,
    ) -> Self {
        Self {
            llm,
            embedder,
            config,
        }
    }

    /// Run the full pass over a structural output.
    pub async fn process(&self, pass0: &Pass0Output) -> Result<Pass1Result, ExtractError> {
        if pass0.items.is_empty() {
            return Err(ExtractError::EmptyDocument);
        }
        let tenant_id = pass0.version.tenant_id.clone();
        let doc_id = pass0.document.document_id.clone();
        info!(doc_id = %doc_id, "pass1_start");

        // Global view: meta-document replaces raw content for analysis.
        let global_view = self.config.enable_global_view.then(|| build_global_view(pass0));
        let analysis_content = global_view
            .as_ref()
            .map(|v| v.meta_document.as_str())
            .unwrap_or(pass0.full_text.as_str());

        let analysis =
            analyze_document(pass0, analysis_content, self.llm, self.config.allow_fallback).await;

        let (mut concepts, refused) = identify_concepts(
            pass0,
            &analysis,
            analysis_content,
            self.llm,
            &self.config,
        )
        .await;
        info!(
            concepts = concepts.len(),
            refused = refused.len(),
            "pass1_concepts"
        );

        // Pointer-based extraction, bounded fan-out per item.
        let anchored_concepts = if self.config.enable_pointer_mode {
            self.run_pointer_extraction(pass0, &analysis.language).await
        } else {
            Vec::new()
        };

        // Assertions over chunks, then the policy filter.
        let drafts =
            extract_assertions(&pass0.chunks, &analysis.language, self.llm, &self.config).await;
        let total_assertions = drafts.len();
        let policy = filter_by_promotion_policy(drafts, &self.config);

        // Link promotable assertions to concepts, resolve anchors.
        let resolver = AnchorResolver::new(&pass0.chunk_to_items, &pass0.items, &pass0.unit_index);
        let links =
            link_to_concepts(&policy.promotable, &concepts, self.embedder, &self.config).await;

        let mut informations: Vec<Information> = Vec::new();
        let mut assertion_log: Vec<AssertionLogEntry> = Vec::new();
        let mut unlinked: Vec<AssertionDraft> = Vec::new();

        for (draft, (_, concept_id)) in policy.promotable.iter().zip(&links) {
            match concept_id {
                Some(concept_id) => match resolver.resolve(draft) {
                    Ok(anchor) => {
                        let assertion = RawAssertion {
                            assertion_id: draft.assertion_id.clone(),
                            tenant_id: tenant_id.clone(),
                            source_doc_id: doc_id.clone(),
                            text: draft.text.clone(),
                            kind: draft.kind,
                            confidence: draft.confidence,
                            anchor,
                        };
                        assertion_log.push(log_entry(
                            draft,
                            AssertionStatus::Promoted,
                            None,
                            Some(concept_id.clone()),
                        ));
                        informations.push(Information {
                            info_id: format!("info_{}", short_hash(&draft.assertion_id)),
                            concept_id: concept_id.clone(),
                            assertion,
                        });
                    }
                    Err(reason) => {
                        assertion_log.push(log_entry(
                            draft,
                            AssertionStatus::Abstained,
                            Some(reason),
                            None,
                        ));
                    }
                },
                None => {
                    assertion_log.push(log_entry(
                        draft,
                        AssertionStatus::Abstained,
                        Some(AbstainReason::NoConceptMatch),
                        None,
                    ));
                    unlinked.push(draft.clone());
                }
            }
        }
        for (draft, reason) in &policy.abstained {
            assertion_log.push(log_entry(draft, AssertionStatus::Rejected, Some(*reason), None));
        }

        // Refinement loop: grow the concept inventory from the unlinked
        // pool while it pays off.
        let mut iterations = 0usize;
        if self.config.enable_refinement {
            let mut previous: Option<Saturation> = None;
            loop {
                let saturation = saturation_of(&assertion_log);
                if !saturation.should_iterate(&self.config) {
                    break;
                }
                if let Some(prev) = previous {
                    if !should_continue_iteration(prev, saturation, iterations, &self.config) {
                        break;
                    }
                }
                let unlinked_texts: Vec<String> =
                    unlinked.iter().map(|d| d.text.clone()).collect();
                let fresh =
                    refine_concepts(&unlinked_texts, &concepts, self.llm, &doc_id).await;
                if fresh.is_empty() {
                    break;
                }
                concepts.extend(fresh);

                // Re-link only the unlinked pool.
                let relinks =
                    link_to_concepts(&unlinked, &concepts, self.embedder, &self.config).await;
                let mut still_unlinked = Vec::new();
                for (draft, (_, concept_id)) in unlinked.iter().zip(&relinks) {
                    match concept_id {
                        Some(concept_id) => {
                            if let Ok(anchor) = resolver.resolve(draft) {
                                update_log(
                                    &mut assertion_log,
                                    &draft.assertion_id,
                                    concept_id,
                                );
                                informations.push(Information {
                                    info_id: format!("info_{}", short_hash(&draft.assertion_id)),
                                    concept_id: concept_id.clone(),
                                    assertion: RawAssertion {
                                        assertion_id: draft.assertion_id.clone(),
                                        tenant_id: tenant_id.clone(),
                                        source_doc_id: doc_id.clone(),
                                        text: draft.text.clone(),
                                        kind: draft.kind,
                                        confidence: draft.confidence,
                                        anchor,
                                    },
                                });
                            }
                        }
                        None => still_unlinked.push(draft.clone()),
                    }
                }
                unlinked = still_unlinked;
                previous = Some(saturation);
                iterations += 1;
            }
        }

        // Typed relations between the (possibly refined) concepts.
        let engine = RelationExtractionEngine::new(self.llm, &self.config);
        let relations = engine.extract(&pass0.chunks, &concepts).await;

        // Normative rules and spec facts from the items themselves.
        let mut rules = Vec::new();
        for item in &pass0.items {
            let (item_rules, _abstentions) =
                extract_rules_from_item(item, &tenant_id, &doc_id, &analysis.language);
            rules.extend(item_rules);
        }
        let facts = extract_spec_facts(&pass0.items, &tenant_id, &doc_id);

        // Canonicalize the concept inventory for persistence.
        let canonical_concepts =
            canonicalize_concepts(&concepts, &informations, &tenant_id);

        let stats = Pass1Stats {
            themes: analysis.themes.len(),
            concepts: concepts.len(),
            assertions_total: total_assertions,
            assertions_promoted: informations.len(),
            assertions_abstained: assertion_log
                .iter()
                .filter(|e| e.status == AssertionStatus::Abstained)
                .count(),
            assertions_rejected: assertion_log
                .iter()
                .filter(|e| e.status == AssertionStatus::Rejected)
                .count(),
            refinement_iterations: iterations,
            pointer_anchored: anchored_concepts.len(),
            relations: relations.len(),
            rules: rules.len(),
            facts: facts.len(),
        };
        info!(
            doc_id = %doc_id,
            concepts = stats.concepts,
            promoted = stats.assertions_promoted,
            relations = stats.relations,
            rules = stats.rules,
            facts = stats.facts,
            "pass1_complete"
        );

        Ok(Pass1Result {
            analysis,
            global_view,
            concepts,
            canonical_concepts,
            informations,
            assertion_log,
            anchored_concepts,
            relations,
            rules,
            facts,
            stats,
        })
    }

    /// Pointer extraction across items, bounded by the worker budget.
    async fn run_pointer_extraction(
        &self,
        pass0: &Pass0Output,
        language: &str,
    ) -> Vec<ConceptAnchored> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let tasks = pass0.unit_index.items().map(|(docitem_id, units)| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                extract_pointers_for_item(docitem_id, units, language, self.llm).await
            }
        });
        let entries: Vec<_> = join_all(tasks).await.into_iter().flatten().collect();
        if entries.is_empty() {
            return Vec::new();
        }

        let validator = PointerValidator::new(self.config.pointer_min_shared_tokens);
        let (valid, abstained, stats) = validator.validate_batch(&entries, &pass0.unit_index);
        info!(
            total = stats.total,
            valid = stats.valid,
            abstained = abstained.len(),
            abstain_rate = stats.abstain_rate(),
            "pointer_validation"
        );
        valid
    }
}

fn log_entry(
    draft: &AssertionDraft,
    status: AssertionStatus,
    reason: Option<AbstainReason>,
    concept_id: Option<String>,
) -> AssertionLogEntry {
    AssertionLogEntry {
        assertion_id: draft.assertion_id.clone(),
        text: draft.text.clone(),
        kind: draft.kind,
        confidence: draft.confidence,
        status,
        reason,
        concept_id,
    }
}

fn update_log(log: &mut [AssertionLogEntry], assertion_id: &str, concept_id: &str) {
    if let Some(entry) = log.iter_mut().find(|e| e.assertion_id == assertion_id) {
        entry.status = AssertionStatus::Promoted;
        entry.reason = None;
        entry.concept_id = Some(concept_id.to_string());
    }
}

fn saturation_of(log: &[AssertionLogEntry]) -> Saturation {
    Saturation {
        promoted: log
            .iter()
            .filter(|e| e.status == AssertionStatus::Promoted)
            .count(),
        no_concept_match: log
            .iter()
            .filter(|e| e.reason == Some(AbstainReason::NoConceptMatch))
            .count(),
        total: log.len(),
    }
}

fn canonicalize_concepts(
    concepts: &[Concept],
    informations: &[Information],
    tenant_id: &str,
) -> Vec<CanonicalConcept> {
    concepts
        .iter()
        .map(|concept| {
            let support = informations
                .iter()
                .filter(|i| i.concept_id == concept.concept_id)
                .count() as u32;
            CanonicalConcept {
                canonical_id: format!(
                    "con_{}",
                    short_hash(&format!("{tenant_id}|{}", concept.name.to_lowercase()))
                ),
                tenant_id: tenant_id.to_string(),
                canonical_name: concept.name.clone(),
                concept_type: "TERM".to_string(),
                surface_forms: concept.lexical_triggers.clone(),
                quality_score: 0.8,
                support,
                status: ConceptStatus::Pending,
            }
        })
        .collect()
}
