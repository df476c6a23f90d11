//! The graph-first plan builder.
//!
//! The graph decides the MODE of a search before any vector retrieval
//! happens: REASONED when semantic paths connect the query's seed
//! concepts, ANCHORED when only topic structure routes them, TEXT_ONLY
//! when the graph has nothing to say. The resulting context-id set then
//! filters the vector search.

use std::collections::BTreeSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use clients::{cosine_similarity, EmbeddingClient};
use graphnav::GraphStore;
use model::DefensibilityTier;

use crate::paths::{collect_path_evidence, find_paths, SemanticPath};
use crate::policy::{EscalationState, TierFilterConfig, TraversalPolicy};
use crate::PlannerError;

/// Seed extraction bounds.
const MAX_SEEDS: usize = 10;
const MAX_SEED_PAIRS: usize = 10;
const MIN_SEED_SIMILARITY: f32 = 0.25;

/// Search mode decided by the graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Reasoned,
    Anchored,
    TextOnly,
}

/// A structural route via a Topic concept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructuralRoute {
    pub topic_name: String,
    pub topic_key: String,
    pub covered_concept_keys: Vec<String>,
    pub document_ids: Vec<String>,
    pub context_ids: Vec<String>,
}

/// The plan handed to the retriever.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphFirstPlan {
    pub mode: SearchMode,
    pub seed_concepts: Vec<String>,
    pub seed_concept_keys: Vec<String>,
    pub paths: Vec<SemanticPath>,
    pub structural_routes: Vec<StructuralRoute>,
    pub tier_policy: TraversalPolicy,
    pub allowed_tiers: BTreeSet<DefensibilityTier>,
    pub escalation: EscalationState,
    pub fallback_reason: Option<String>,
    pub processing_time_ms: f64,
}

impl GraphFirstPlan {
    /// Context ids for filtering the vector search; empty means no filter.
    pub fn context_ids_for_retrieval(&self) -> Vec<String> {
        match self.mode {
            SearchMode::Reasoned => {
                let mut ids = BTreeSet::new();
                for path in &self.paths {
                    ids.extend(path.evidence_context_ids.iter().cloned());
                }
                ids.into_iter().collect()
            }
            SearchMode::Anchored => {
                let mut ids = BTreeSet::new();
                for route in &self.structural_routes {
                    ids.extend(route.context_ids.iter().cloned());
                }
                ids.into_iter().collect()
            }
            SearchMode::TextOnly => Vec::new(),
        }
    }

    /// Audit payload surfaced in the search response.
    pub fn audit(&self) -> Value {
        json!({
            "mode": self.mode,
            "seed_concepts": self.seed_concepts,
            "paths": self.paths.iter().map(|p| json!({
                "nodes": p.node_names,
                "relations": p.relations,
                "confidence": p.confidence,
                "length": p.length,
                "path_tier": p.path_tier.label(),
                "semantic_integrity_warning": p.semantic_integrity_warning,
                "evidence_count": p.evidence_context_ids.len(),
            })).collect::<Vec<_>>(),
            "structural_routes": self.structural_routes.iter().map(|r| json!({
                "topic": r.topic_name,
                "covered_concepts": r.covered_concept_keys.len(),
                "documents": r.document_ids.len(),
            })).collect::<Vec<_>>(),
            "tier_policy": self.tier_policy,
            "allowed_tiers": self.allowed_tiers.iter().map(|t| t.label()).collect::<Vec<_>>(),
            "escalation_audit": {
                "escalation_steps": self.escalation.escalation_steps,
                "escalation_path": self.escalation.escalation_path,
                "final_mode": self.escalation.final_mode,
            },
            "context_ids_count": self.context_ids_for_retrieval().len(),
            "fallback_reason": self.fallback_reason,
            "processing_time_ms": self.processing_time_ms,
        })
    }
}

/// Plan builder over one tenant's graph.
pub struct GraphFirstPlanner<'a> {
    store: &'a dyn GraphStore,
    embedder: &'a dyn EmbeddingClient,
    tenant_id: String,
    default_policy: TraversalPolicy,
}

impl<'a> GraphFirstPlanner<'a> {
    pub fn new(
        store: &'a dyn GraphStore,
        embedder: &'a dyn EmbeddingClient,
        tenant_id: &str,
        default_policy: TraversalPolicy,
    ) -> Self {
        Self {
            store,
            embedder,
            tenant_id: tenant_id.to_string(),
            default_policy,
        }
    }

    /// Build the search plan for a natural-language query.
    pub async fn build_search_plan(
        &self,
        query: &str,
        tier_policy: Option<TraversalPolicy>,
    ) -> Result<GraphFirstPlan, PlannerError> {
        let start = Instant::now();
        let policy = tier_policy.unwrap_or(self.default_policy);
        let config = TierFilterConfig::from_policy(policy);
        let mut escalation = EscalationState::new(&config);

        // Step 1: seed concepts from the query.
        let seeds = self.extract_seed_concepts(query).await?;
        if seeds.is_empty() {
            escalation.final_mode = Some("TEXT_ONLY".into());
            return Ok(GraphFirstPlan {
                mode: SearchMode::TextOnly,
                seed_concepts: Vec::new(),
                seed_concept_keys: Vec::new(),
                paths: Vec::new(),
                structural_routes: Vec::new(),
                tier_policy: policy,
                allowed_tiers: escalation.current_tiers.clone(),
                escalation,
                fallback_reason: Some("no concepts found in query".into()),
                processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            });
        }
        let seed_names: Vec<String> = seeds.iter().map(|(_, name)| name.clone()).collect();
        let seed_keys: Vec<String> = seeds.into_iter().map(|(key, _)| key).collect();
        info!(seeds = ?seed_names, policy = ?policy, "graph_first_seeds");

        // Step 2: REASONED with tier escalation.
        let mut paths: Vec<SemanticPath>;
        loop {
            paths = self.find_semantic_paths(&seed_keys, &escalation.current_tiers)?;
            if !paths.is_empty() {
                escalation.found_results = true;
                break;
            }
            if config.should_escalate(paths.len(), escalation.escalation_steps) {
                if let Some(next) = config.next_escalation_tier(&escalation.current_tiers) {
                    info!(tier = next.label(), step = escalation.escalation_steps + 1, "tier_escalation");
                    escalation.add_escalation(next);
                    continue;
                }
            }
            break;
        }

        if !paths.is_empty() {
            for path in &mut paths {
                path.evidence_context_ids = collect_path_evidence(self.store, &path.node_keys)?;
            }
            escalation.final_mode = Some("REASONED".into());
            info!(paths = paths.len(), "graph_first_reasoned");
            return Ok(GraphFirstPlan {
                mode: SearchMode::Reasoned,
                seed_concepts: seed_names,
                seed_concept_keys: seed_keys,
                paths,
                structural_routes: Vec::new(),
                tier_policy: policy,
                allowed_tiers: escalation.current_tiers.clone(),
                escalation,
                fallback_reason: None,
                processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            });
        }

        // Step 3: ANCHORED via topic coverage.
        if escalation.should_fallback_to_anchored(&config) {
            let routes = self.find_structural_routes(&seed_keys)?;
            if !routes.is_empty() {
                escalation.final_mode = Some("ANCHORED".into());
                escalation.escalation_path.push("fallback_anchored".into());
                info!(routes = routes.len(), "graph_first_anchored");
                return Ok(GraphFirstPlan {
                    mode: SearchMode::Anchored,
                    seed_concepts: seed_names,
                    seed_concept_keys: seed_keys,
                    paths: Vec::new(),
                    structural_routes: routes,
                    tier_policy: policy,
                    allowed_tiers: escalation.current_tiers.clone(),
                    escalation,
                    fallback_reason: None,
                    processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                });
            }
        }

        // Step 4: TEXT_ONLY.
        escalation.final_mode = Some("TEXT_ONLY".into());
        info!("graph_first_text_only");
        Ok(GraphFirstPlan {
            mode: SearchMode::TextOnly,
            seed_concepts: seed_names,
            seed_concept_keys: seed_keys,
            paths: Vec::new(),
            structural_routes: Vec::new(),
            tier_policy: policy,
            allowed_tiers: escalation.current_tiers.clone(),
            escalation,
            fallback_reason: Some("no semantic paths or structural routes found".into()),
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Lexical + embedding seed extraction over the concept inventory.
    async fn extract_seed_concepts(
        &self,
        query: &str,
    ) -> Result<Vec<(String, String)>, PlannerError> {
        let concepts = self
            .store
            .nodes_with_label("CanonicalConcept", &self.tenant_id)?;
        if concepts.is_empty() {
            return Ok(Vec::new());
        }
        let query_lower = query.to_lowercase();

        let names: Vec<String> = concepts
            .iter()
            .map(|n| {
                n.props
                    .get("canonical_name")
                    .and_then(Value::as_str)
                    .unwrap_or(&n.key)
                    .to_string()
            })
            .collect();
        let mut texts = vec![query.to_string()];
        texts.extend(names.iter().cloned());
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| PlannerError::Embedding(e.to_string()))?;
        let (query_vec, concept_vecs) = vectors.split_first().ok_or_else(|| {
            PlannerError::Embedding("embedder returned no vectors".into())
        })?;

        let mut scored: Vec<(f32, String, String)> = Vec::new();
        for ((node, name), vector) in concepts.iter().zip(&names).zip(concept_vecs) {
            let lexical_hit = query_lower.contains(&name.to_lowercase())
                || node
                    .props
                    .get("surface_forms")
                    .and_then(Value::as_array)
                    .is_some_and(|forms| {
                        forms
                            .iter()
                            .filter_map(Value::as_str)
                            .any(|f| query_lower.contains(&f.to_lowercase()))
                    });
            let similarity = cosine_similarity(query_vec, vector);
            let score = if lexical_hit {
                1.0 + similarity
            } else {
                similarity
            };
            if lexical_hit || similarity >= MIN_SEED_SIMILARITY {
                scored.push((score, node.key.clone(), name.clone()));
            }
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(MAX_SEEDS)
            .map(|(_, key, name)| (key, name))
            .collect())
    }

    fn find_semantic_paths(
        &self,
        seed_keys: &[String],
        allowed_tiers: &BTreeSet<DefensibilityTier>,
    ) -> Result<Vec<SemanticPath>, PlannerError> {
        if seed_keys.len() < 2 {
            return Ok(Vec::new());
        }
        let mut pairs = Vec::new();
        'outer: for (i, src) in seed_keys.iter().enumerate() {
            for tgt in &seed_keys[i + 1..] {
                pairs.push((src.clone(), tgt.clone()));
                if pairs.len() >= MAX_SEED_PAIRS {
                    break 'outer;
                }
            }
        }

        let mut all_paths = Vec::new();
        for (src, tgt) in pairs {
            all_paths.extend(find_paths(self.store, &src, &tgt, allowed_tiers)?);
        }
        all_paths.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        all_paths.truncate(crate::paths::MAX_PATHS);
        Ok(all_paths)
    }

    /// Topic concepts covering the seeds route to their section contexts.
    fn find_structural_routes(
        &self,
        seed_keys: &[String],
    ) -> Result<Vec<StructuralRoute>, PlannerError> {
        let mut routes: Vec<StructuralRoute> = Vec::new();
        for edge in self.store.edges_of_type("COVERS")? {
            if !seed_keys.contains(&edge.target) {
                continue;
            }
            let topic_key = edge.source.clone();
            if let Some(route) = routes.iter_mut().find(|r| r.topic_key == topic_key) {
                route.covered_concept_keys.push(edge.target.clone());
                continue;
            }
            let Some(topic) = self.store.get_node(&topic_key)? else {
                continue;
            };
            if topic.props.get("concept_type").and_then(Value::as_str) != Some("TOPIC") {
                continue;
            }
            let topic_name = topic
                .props
                .get("canonical_name")
                .and_then(Value::as_str)
                .unwrap_or(&topic_key)
                .to_string();

            // Documents carrying the topic.
            let document_ids: Vec<String> = self
                .store
                .edges_to(&topic_key)?
                .into_iter()
                .filter(|e| e.rel_type == "HAS_TOPIC")
                .map(|e| e.source)
                .collect();

            // Section contexts the topic is mentioned in.
            let mut context_ids = Vec::new();
            for mention in self.store.edges_from(&topic_key)? {
                if mention.rel_type != "MENTIONED_IN" {
                    continue;
                }
                let is_section = self
                    .store
                    .get_node(&mention.target)?
                    .map(|n| n.has_label("SectionContext"))
                    .unwrap_or(false);
                if is_section {
                    context_ids.push(mention.target);
                }
            }
            if context_ids.is_empty() {
                continue;
            }
            routes.push(StructuralRoute {
                topic_name,
                topic_key,
                covered_concept_keys: vec![edge.target.clone()],
                document_ids,
                context_ids,
            });
        }
        routes.sort_by(|a, b| b.covered_concept_keys.len().cmp(&a.covered_concept_keys.len()));
        routes.truncate(5);
        Ok(routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clients::HashEmbedder;
    use graphnav::InMemoryGraphStore;
    use serde_json::Map;

    fn concept(store: &InMemoryGraphStore, key: &str, name: &str, concept_type: &str) {
        let mut props = Map::new();
        props.insert("canonical_name".into(), json!(name));
        props.insert("concept_type".into(), json!(concept_type));
        props.insert("surface_forms".into(), json!([name.to_lowercase()]));
        store
            .merge_node(key, &["CanonicalConcept"], "t1", props, &[])
            .unwrap();
    }

    fn semantic_edge(store: &InMemoryGraphStore, src: &str, rel: &str, tgt: &str, tier: &str) {
        let mut props = Map::new();
        props.insert("defensibility_tier".into(), json!(tier));
        props.insert("semantic_grade".into(), json!("EXPLICIT"));
        props.insert("confidence".into(), json!(0.9));
        store.merge_edge(src, rel, tgt, props, &[]).unwrap();
    }

    fn section(store: &InMemoryGraphStore, id: &str) {
        store
            .merge_node(id, &["ContextNode", "SectionContext"], "t1", Map::new(), &[])
            .unwrap();
    }

    fn mention(store: &InMemoryGraphStore, concept: &str, ctx: &str) {
        let mut props = Map::new();
        props.insert("count".into(), json!(2));
        props.insert("weight".into(), json!(1.0));
        props.insert("first_seen".into(), json!("2026-01-01T00:00:00Z"));
        store
            .merge_edge(concept, "MENTIONED_IN", ctx, props, &[])
            .unwrap();
    }

    #[tokio::test]
    async fn reasoned_mode_with_evidence_contexts() {
        let store = InMemoryGraphStore::new();
        concept(&store, "c_a", "Atlas Gateway", "COMPONENT");
        concept(&store, "c_b", "Zephyr Queue", "COMPONENT");
        semantic_edge(&store, "c_a", "REQUIRES", "c_b", "STRICT");
        section(&store, "sec:doc_1:abc");
        mention(&store, "c_a", "sec:doc_1:abc");

        let embedder = HashEmbedder::default();
        let planner = GraphFirstPlanner::new(&store, &embedder, "t1", TraversalPolicy::Strict);
        let plan = planner
            .build_search_plan("How does Atlas Gateway use Zephyr Queue?", None)
            .await
            .unwrap();

        assert_eq!(plan.mode, SearchMode::Reasoned);
        assert_eq!(plan.paths.len(), 1);
        assert_eq!(plan.context_ids_for_retrieval(), vec!["sec:doc_1:abc"]);
        assert_eq!(plan.escalation.escalation_steps, 0);
    }

    #[tokio::test]
    async fn strict_policy_refuses_extended_path_but_exploratory_escalates() {
        let store = InMemoryGraphStore::new();
        concept(&store, "c_a", "Atlas Gateway", "COMPONENT");
        concept(&store, "c_b", "Billing Engine", "COMPONENT");
        concept(&store, "c_c", "Zephyr Queue", "COMPONENT");
        // The only route crosses an EXTENDED edge.
        semantic_edge(&store, "c_a", "USES", "c_b", "EXTENDED");
        semantic_edge(&store, "c_b", "REQUIRES", "c_c", "STRICT");

        let embedder = HashEmbedder::default();
        let planner = GraphFirstPlanner::new(&store, &embedder, "t1", TraversalPolicy::Strict);

        let strict_plan = planner
            .build_search_plan("How does Atlas Gateway reach Zephyr Queue?", None)
            .await
            .unwrap();
        assert_eq!(strict_plan.mode, SearchMode::TextOnly);

        let exploratory_plan = planner
            .build_search_plan(
                "How does Atlas Gateway reach Zephyr Queue?",
                Some(TraversalPolicy::Exploratory),
            )
            .await
            .unwrap();
        assert_eq!(exploratory_plan.mode, SearchMode::Reasoned);
        assert_eq!(exploratory_plan.escalation.escalation_steps, 1);
        assert_eq!(
            exploratory_plan.escalation.escalation_path,
            vec!["escalate_to_EXTENDED"]
        );
    }

    #[tokio::test]
    async fn anchored_fallback_via_topics() {
        let store = InMemoryGraphStore::new();
        concept(&store, "c_a", "Atlas Gateway", "COMPONENT");
        concept(&store, "c_b", "Zephyr Queue", "COMPONENT");
        concept(&store, "t_net", "Networking", "TOPIC");
        // No semantic edges; only topic coverage.
        store
            .merge_edge("t_net", "COVERS", "c_a", Map::new(), &[])
            .unwrap();
        store
            .merge_edge("doc:t1:doc_1", "HAS_TOPIC", "t_net", Map::new(), &[])
            .unwrap();
        section(&store, "sec:doc_1:net");
        mention(&store, "t_net", "sec:doc_1:net");

        let embedder = HashEmbedder::default();
        let planner = GraphFirstPlanner::new(&store, &embedder, "t1", TraversalPolicy::Strict);
        let plan = planner
            .build_search_plan("Atlas Gateway and Zephyr Queue connectivity", None)
            .await
            .unwrap();

        assert_eq!(plan.mode, SearchMode::Anchored);
        assert_eq!(plan.structural_routes.len(), 1);
        assert_eq!(plan.context_ids_for_retrieval(), vec!["sec:doc_1:net"]);
        assert!(plan
            .escalation
            .escalation_path
            .contains(&"fallback_anchored".to_string()));
    }

    #[tokio::test]
    async fn no_seeds_means_text_only() {
        let store = InMemoryGraphStore::new();
        let embedder = HashEmbedder::default();
        let planner = GraphFirstPlanner::new(&store, &embedder, "t1", TraversalPolicy::Strict);
        let plan = planner
            .build_search_plan("completely unrelated question", None)
            .await
            .unwrap();
        assert_eq!(plan.mode, SearchMode::TextOnly);
        assert!(plan.context_ids_for_retrieval().is_empty());
        assert_eq!(plan.fallback_reason.as_deref(), Some("no concepts found in query"));
    }
}
