//! Graph lint: the navigation/semantics firewall.
//!
//! Four rules that must return zero violations for a releasable graph.
//! Run after every ingestion and in CI; any violation blocks release.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use model::RelationKind;

use crate::store::GraphStore;
use crate::GraphError;

/// Rule identifiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LintRuleId {
    /// No navigation edge between two concepts.
    #[serde(rename = "NAV-001")]
    NoConceptToConceptNavigation,
    /// No semantic edge into a context node.
    #[serde(rename = "NAV-002")]
    NoSemanticToContext,
    /// No semantic edge out of a context node.
    #[serde(rename = "NAV-003")]
    NoContextToConceptSemantic,
    /// MENTIONED_IN carries count, weight and first_seen.
    #[serde(rename = "NAV-004")]
    MentionedInHasProperties,
}

impl LintRuleId {
    pub fn code(self) -> &'static str {
        match self {
            LintRuleId::NoConceptToConceptNavigation => "NAV-001",
            LintRuleId::NoSemanticToContext => "NAV-002",
            LintRuleId::NoContextToConceptSemantic => "NAV-003",
            LintRuleId::MentionedInHasProperties => "NAV-004",
        }
    }
}

/// Severity of a violation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LintSeverity {
    Error,
    Warning,
}

/// One lint violation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LintViolation {
    pub rule_id: LintRuleId,
    pub message: String,
    pub severity: LintSeverity,
    pub details: Value,
}

/// Result of a full lint run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LintResult {
    pub success: bool,
    pub violations: Vec<LintViolation>,
    pub stats: Vec<(String, usize)>,
}

/// Navigation edges that must never connect two concepts directly.
const FORBIDDEN_CONCEPT_TO_CONCEPT: &[&str] = &[
    "CO_OCCURS",
    "CO_OCCURS_IN_CORPUS",
    "CO_OCCURS_IN_DOCUMENT",
    "MENTIONED_TOGETHER",
    "APPEARS_WITH",
];

/// Linter over one tenant's graph.
pub struct GraphLinter<'a> {
    store: &'a dyn GraphStore,
    tenant_id: String,
}

impl<'a> GraphLinter<'a> {
    pub fn new(store: &'a dyn GraphStore, tenant_id: &str) -> Self {
        Self {
            store,
            tenant_id: tenant_id.to_string(),
        }
    }

    /// Run every rule; zero violations means the graph is releasable.
    pub fn run_all_rules(&self) -> Result<LintResult, GraphError> {
        let mut violations = Vec::new();
        let mut stats = Vec::new();

        let nav001 = self.check_nav001()?;
        stats.push(("nav001_violations".to_string(), nav001.len()));
        violations.extend(nav001);

        let nav002 = self.check_nav002()?;
        stats.push(("nav002_violations".to_string(), nav002.len()));
        violations.extend(nav002);

        let nav003 = self.check_nav003()?;
        stats.push(("nav003_violations".to_string(), nav003.len()));
        violations.extend(nav003);

        let nav004 = self.check_nav004()?;
        stats.push(("nav004_violations".to_string(), nav004.len()));
        violations.extend(nav004);

        let success = violations.is_empty();
        if success {
            info!(tenant_id = %self.tenant_id, "graph_lint_clean");
        } else {
            warn!(tenant_id = %self.tenant_id, violations = violations.len(), "graph_lint_failed");
        }
        Ok(LintResult {
            success,
            violations,
            stats,
        })
    }

    fn is_concept(&self, key: &str) -> Result<bool, GraphError> {
        Ok(self
            .store
            .get_node(key)?
            .map(|n| n.tenant_id == self.tenant_id && n.has_label("CanonicalConcept"))
            .unwrap_or(false))
    }

    fn is_context(&self, key: &str) -> Result<bool, GraphError> {
        Ok(self
            .store
            .get_node(key)?
            .map(|n| n.tenant_id == self.tenant_id && n.has_label("ContextNode"))
            .unwrap_or(false))
    }

    fn check_nav001(&self) -> Result<Vec<LintViolation>, GraphError> {
        let mut violations = Vec::new();
        for rel_type in FORBIDDEN_CONCEPT_TO_CONCEPT {
            for edge in self.store.edges_of_type(rel_type)? {
                if self.is_concept(&edge.source)? && self.is_concept(&edge.target)? {
                    violations.push(LintViolation {
                        rule_id: LintRuleId::NoConceptToConceptNavigation,
                        message: format!(
                            "Navigation edge [{rel_type}] found between concepts '{}' and '{}'. \
                             Use a ContextNode intermediary instead.",
                            edge.source, edge.target
                        ),
                        severity: LintSeverity::Error,
                        details: json!({
                            "source": edge.source,
                            "target": edge.target,
                            "relation_type": rel_type,
                        }),
                    });
                }
            }
        }
        Ok(violations)
    }

    fn check_nav002(&self) -> Result<Vec<LintViolation>, GraphError> {
        let mut violations = Vec::new();
        for kind in RelationKind::semantic_set() {
            for edge in self.store.edges_of_type(kind.label())? {
                if self.is_context(&edge.target)? {
                    violations.push(LintViolation {
                        rule_id: LintRuleId::NoSemanticToContext,
                        message: format!(
                            "Semantic relation [{}] points to ContextNode '{}'. \
                             Semantic relations must only connect concepts.",
                            kind.label(),
                            edge.target
                        ),
                        severity: LintSeverity::Error,
                        details: json!({
                            "relation_type": kind.label(),
                            "context_id": edge.target,
                        }),
                    });
                }
            }
        }
        Ok(violations)
    }

    fn check_nav003(&self) -> Result<Vec<LintViolation>, GraphError> {
        let mut violations = Vec::new();
        for kind in RelationKind::semantic_set() {
            for edge in self.store.edges_of_type(kind.label())? {
                if self.is_context(&edge.source)? {
                    violations.push(LintViolation {
                        rule_id: LintRuleId::NoContextToConceptSemantic,
                        message: format!(
                            "ContextNode '{}' is the source of semantic relation [{}]. \
                             ContextNodes must not carry outgoing semantic relations.",
                            edge.source,
                            kind.label()
                        ),
                        severity: LintSeverity::Error,
                        details: json!({
                            "relation_type": kind.label(),
                            "context_id": edge.source,
                        }),
                    });
                }
            }
        }
        Ok(violations)
    }

    fn check_nav004(&self) -> Result<Vec<LintViolation>, GraphError> {
        let mut missing = 0usize;
        for edge in self.store.edges_of_type("MENTIONED_IN")? {
            let has_count = edge.props.get("count").is_some();
            let has_first_seen = edge.props.get("first_seen").is_some();
            let has_weight = edge.props.get("weight").is_some();
            if !(has_count && has_first_seen && has_weight) {
                missing += 1;
            }
        }
        if missing == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![LintViolation {
            rule_id: LintRuleId::MentionedInHasProperties,
            message: format!(
                "{missing} MENTIONED_IN relations are missing required properties \
                 (count, weight, first_seen). Recompute weights to repair."
            ),
            severity: LintSeverity::Warning,
            details: json!({ "count": missing }),
        }])
    }
}

/// Run all lint rules for a tenant.
pub fn validate_graph(store: &dyn GraphStore, tenant_id: &str) -> Result<LintResult, GraphError> {
    GraphLinter::new(store, tenant_id).run_all_rules()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::{concept_key, NavigationConfig, NavigationLayerBuilder};
    use crate::store::InMemoryGraphStore;
    use serde_json::Map;
    use std::collections::HashMap;

    fn seed_concept(store: &InMemoryGraphStore, id: &str) -> String {
        let key = concept_key("t1", id);
        store
            .merge_node(&key, &["CanonicalConcept"], "t1", Map::new(), &[])
            .unwrap();
        key
    }

    #[test]
    fn clean_navigation_layer_passes() {
        let store = InMemoryGraphStore::new();
        let nav = NavigationLayerBuilder::new(&store, NavigationConfig::default(), "t1");
        let c1 = seed_concept(&store, "con_1");
        nav.build_for_document(
            "doc_1",
            Some("Guide"),
            &[],
            &HashMap::from([(c1, 2u32)]),
        )
        .unwrap();

        let result = validate_graph(&store, "t1").unwrap();
        assert!(result.success, "violations: {:?}", result.violations);
    }

    #[test]
    fn co_occurs_between_concepts_is_flagged() {
        let store = InMemoryGraphStore::new();
        let c1 = seed_concept(&store, "con_1");
        let c2 = seed_concept(&store, "con_2");
        store
            .merge_edge(&c1, "CO_OCCURS", &c2, Map::new(), &[])
            .unwrap();

        let result = validate_graph(&store, "t1").unwrap();
        assert!(!result.success);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].rule_id.code(), "NAV-001");
    }

    #[test]
    fn semantic_edge_touching_context_is_flagged_both_ways() {
        let store = InMemoryGraphStore::new();
        let c1 = seed_concept(&store, "con_1");
        store
            .merge_node("doc:doc_1", &["ContextNode", "DocumentContext"], "t1", Map::new(), &[])
            .unwrap();
        store
            .merge_edge(&c1, "REQUIRES", "doc:doc_1", Map::new(), &[])
            .unwrap();
        store
            .merge_edge("doc:doc_1", "ENABLES", &c1, Map::new(), &[])
            .unwrap();

        let result = validate_graph(&store, "t1").unwrap();
        let codes: Vec<&str> = result.violations.iter().map(|v| v.rule_id.code()).collect();
        assert!(codes.contains(&"NAV-002"));
        assert!(codes.contains(&"NAV-003"));
    }

    #[test]
    fn mentioned_in_without_props_is_flagged() {
        let store = InMemoryGraphStore::new();
        let c1 = seed_concept(&store, "con_1");
        store
            .merge_node("doc:doc_1", &["ContextNode", "DocumentContext"], "t1", Map::new(), &[])
            .unwrap();
        // Raw edge bypassing the builder: no count/weight/first_seen.
        store
            .merge_edge(&c1, "MENTIONED_IN", "doc:doc_1", Map::new(), &[])
            .unwrap();

        let result = validate_graph(&store, "t1").unwrap();
        assert!(!result.success);
        assert_eq!(result.violations[0].rule_id.code(), "NAV-004");
        assert_eq!(result.violations[0].severity, LintSeverity::Warning);
    }
}
