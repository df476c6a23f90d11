//! Navigation layer builder.
//!
//! Creates context nodes and MENTIONED_IN edges describing where in the
//! corpus each concept appears. This layer is strictly non-semantic: it
//! describes the corpus, never the world, and the lint enforces that no
//! semantic edge ever touches it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use model::ContextKind;

use crate::context_id::{
    make_document_context_id, make_section_context_id, make_section_hash, make_window_context_id,
};
use crate::store::{GraphStore, MergeOp};
use crate::GraphError;

/// Feature flags and budgets of the navigation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NavigationConfig {
    pub enable_document_context: bool,
    pub enable_section_context: bool,
    /// Off by default: window contexts grow linearly with the corpus.
    pub enable_window_context: bool,
    pub max_windows_per_document: usize,
    /// Per-concept mention budget; lowest-weight edges are pruned.
    pub max_mentions_per_concept: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            enable_document_context: true,
            enable_section_context: true,
            enable_window_context: false,
            max_windows_per_document: 50,
            max_mentions_per_concept: 100,
        }
    }
}

/// One section to materialize, with the concepts mentioned in it.
#[derive(Debug, Clone)]
pub struct SectionMentions {
    pub path: String,
    pub level: u8,
    /// concept key → mention count in this section.
    pub concept_counts: HashMap<String, u32>,
}

/// Build statistics for one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigationStats {
    pub document_contexts: usize,
    pub section_contexts: usize,
    pub window_contexts: usize,
    pub mentions_written: usize,
    pub weights_updated: usize,
    pub mentions_pruned: usize,
}

/// Writer for the navigation layer of one tenant.
pub struct NavigationLayerBuilder<'a> {
    store: &'a dyn GraphStore,
    config: NavigationConfig,
    tenant_id: String,
}

impl<'a> NavigationLayerBuilder<'a> {
    pub fn new(store: &'a dyn GraphStore, config: NavigationConfig, tenant_id: &str) -> Self {
        Self {
            store,
            config,
            tenant_id: tenant_id.to_string(),
        }
    }

    /// Create the DocumentContext node and tie it to its document.
    pub fn create_document_context(
        &self,
        document_id: &str,
        document_name: Option<&str>,
    ) -> Result<Option<String>, GraphError> {
        if !self.config.enable_document_context {
            return Ok(None);
        }
        let context_id = make_document_context_id(document_id);
        let mut props = context_props(ContextKind::Document, document_id);
        if let Some(name) = document_name {
            props.insert("document_name".into(), json!(name));
        }
        self.store.merge_node(
            &context_id,
            &["ContextNode", "DocumentContext"],
            &self.tenant_id,
            props,
            &[],
        )?;
        self.store.merge_edge(
            &context_id,
            "IN_DOCUMENT",
            &doc_key(&self.tenant_id, document_id),
            Map::new(),
            &[],
        )?;
        Ok(Some(context_id))
    }

    /// Create one SectionContext node.
    pub fn create_section_context(
        &self,
        document_id: &str,
        section_path: &str,
        section_level: u8,
    ) -> Result<Option<String>, GraphError> {
        if !self.config.enable_section_context {
            return Ok(None);
        }
        let context_id = make_section_context_id(document_id, section_path);
        let mut props = context_props(ContextKind::Section, document_id);
        props.insert("section_path".into(), json!(section_path));
        props.insert(
            "section_hash".into(),
            json!(make_section_hash(document_id, section_path)),
        );
        props.insert("section_level".into(), json!(section_level));
        self.store.merge_node(
            &context_id,
            &["ContextNode", "SectionContext"],
            &self.tenant_id,
            props,
            &[],
        )?;
        self.store.merge_edge(
            &context_id,
            "IN_DOCUMENT",
            &doc_key(&self.tenant_id, document_id),
            Map::new(),
            &[],
        )?;
        Ok(Some(context_id))
    }

    /// Create one WindowContext node, subject to the per-document cap.
    pub fn create_window_context(
        &self,
        chunk_id: &str,
        document_id: &str,
        window_index: usize,
    ) -> Result<Option<String>, GraphError> {
        if !self.config.enable_window_context {
            return Ok(None);
        }
        let existing = self
            .store
            .nodes_with_label("WindowContext", &self.tenant_id)?
            .into_iter()
            .filter(|n| n.props.get("doc_id").and_then(Value::as_str) == Some(document_id))
            .count();
        if existing >= self.config.max_windows_per_document {
            warn!(document_id, cap = self.config.max_windows_per_document, "window_context_capped");
            return Ok(None);
        }
        let context_id = make_window_context_id(chunk_id);
        let mut props = context_props(ContextKind::Window, document_id);
        props.insert("chunk_id".into(), json!(chunk_id));
        props.insert("window_index".into(), json!(window_index));
        self.store.merge_node(
            &context_id,
            &["ContextNode", "WindowContext"],
            &self.tenant_id,
            props,
            &[],
        )?;
        self.store.merge_edge(
            &context_id,
            "CENTERED_ON",
            &format!("chunk:{}:{}", self.tenant_id, chunk_id),
            Map::new(),
            &[],
        )?;
        Ok(Some(context_id))
    }

    /// Merge one MENTIONED_IN edge: increment on repeat, stamp
    /// `first_seen` on creation. Weight is recomputed afterwards.
    pub fn link_concept_to_context(
        &self,
        concept_key: &str,
        context_id: &str,
        count: u32,
    ) -> Result<(), GraphError> {
        let mut on_create = Map::new();
        on_create.insert("count".into(), json!(count));
        on_create.insert("weight".into(), json!(0.0));
        on_create.insert("first_seen".into(), json!(Utc::now().to_rfc3339()));
        self.store.merge_edge(
            concept_key,
            "MENTIONED_IN",
            context_id,
            on_create,
            &[MergeOp::Increment { key: "count".into(), by: i64::from(count) }],
        )?;
        Ok(())
    }

    /// Recompute `weight = count / max_count_in_context` for every
    /// MENTIONED_IN edge of the given document (or all, when `None`).
    pub fn compute_weights(&self, document_id: Option<&str>) -> Result<usize, GraphError> {
        let mentions = self.store.edges_of_type("MENTIONED_IN")?;
        // Group by context, honoring the document filter.
        let mut by_context: HashMap<&str, Vec<&crate::store::EdgeRecord>> = HashMap::new();
        for edge in &mentions {
            if let Some(doc) = document_id {
                let belongs = self
                    .store
                    .get_node(&edge.target)?
                    .and_then(|n| n.props.get("doc_id").and_then(|v| v.as_str().map(String::from)))
                    .is_some_and(|d| d == doc);
                if !belongs {
                    continue;
                }
            }
            by_context.entry(edge.target.as_str()).or_default().push(edge);
        }

        let mut updated = 0usize;
        for (_, edges) in by_context {
            let max_count = edges
                .iter()
                .filter_map(|e| e.props.get("count").and_then(Value::as_i64))
                .max()
                .unwrap_or(1)
                .max(1);
            for edge in edges {
                let count = edge.props.get("count").and_then(Value::as_i64).unwrap_or(0);
                let weight = count as f64 / max_count as f64;
                self.store.set_edge_prop(
                    &edge.source,
                    "MENTIONED_IN",
                    &edge.target,
                    "weight",
                    json!(weight),
                )?;
                updated += 1;
            }
        }
        debug!(updated, "navigation_weights_computed");
        Ok(updated)
    }

    /// Prune each concept's lowest-weight mentions beyond the budget.
    pub fn enforce_mention_budget(&self) -> Result<usize, GraphError> {
        let mentions = self.store.edges_of_type("MENTIONED_IN")?;
        let mut by_concept: HashMap<&str, Vec<&crate::store::EdgeRecord>> = HashMap::new();
        for edge in &mentions {
            by_concept.entry(edge.source.as_str()).or_default().push(edge);
        }

        let mut pruned = 0usize;
        for (_, mut edges) in by_concept {
            if edges.len() <= self.config.max_mentions_per_concept {
                continue;
            }
            edges.sort_by(|a, b| {
                let wa = a.props.get("weight").and_then(Value::as_f64).unwrap_or(0.0);
                let wb = b.props.get("weight").and_then(Value::as_f64).unwrap_or(0.0);
                wa.partial_cmp(&wb).unwrap_or(std::cmp::Ordering::Equal)
            });
            let excess = edges.len() - self.config.max_mentions_per_concept;
            for edge in edges.into_iter().take(excess) {
                self.store.delete_edge(&edge.source, "MENTIONED_IN", &edge.target)?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    /// Build the full navigation layer for one document.
    pub fn build_for_document(
        &self,
        document_id: &str,
        document_name: Option<&str>,
        sections: &[SectionMentions],
        document_concept_counts: &HashMap<String, u32>,
    ) -> Result<NavigationStats, GraphError> {
        let mut stats = NavigationStats::default();

        if let Some(doc_ctx) = self.create_document_context(document_id, document_name)? {
            stats.document_contexts += 1;
            for (concept_key, count) in document_concept_counts {
                self.link_concept_to_context(concept_key, &doc_ctx, *count)?;
                stats.mentions_written += 1;
            }
        }

        for section in sections {
            let Some(sec_ctx) =
                self.create_section_context(document_id, &section.path, section.level)?
            else {
                continue;
            };
            stats.section_contexts += 1;
            for (concept_key, count) in &section.concept_counts {
                self.link_concept_to_context(concept_key, &sec_ctx, *count)?;
                stats.mentions_written += 1;
            }
        }

        stats.weights_updated = self.compute_weights(Some(document_id))?;
        stats.mentions_pruned = self.enforce_mention_budget()?;

        info!(
            document_id,
            sections = stats.section_contexts,
            mentions = stats.mentions_written,
            pruned = stats.mentions_pruned,
            "navigation_layer_built"
        );
        Ok(stats)
    }
}

fn context_props(kind: ContextKind, document_id: &str) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("kind".into(), json!(kind));
    props.insert("doc_id".into(), json!(document_id));
    props.insert("created_at".into(), json!(Utc::now().to_rfc3339()));
    props
}

/// Store key of a document node.
pub fn doc_key(tenant_id: &str, document_id: &str) -> String {
    format!("doc:{tenant_id}:{document_id}")
}

/// Store key of a concept node.
pub fn concept_key(tenant_id: &str, canonical_id: &str) -> String {
    format!("concept:{tenant_id}:{canonical_id}")
}
