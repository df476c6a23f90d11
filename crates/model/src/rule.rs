//! Normative rules and spec facts.
//!
//! Both families are extracted from surface signals alone: modal markers
//! for rules, table/key-value structure for facts. Their predicates are
//! domain-agnostic and they are citable and filterable but never composed
//! into graph paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::relation::ExtractionMethod;

/// Deontic strength of a rule's marker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    Must,
    MustNot,
    Should,
    May,
}

impl Modality {
    pub fn label(self) -> &'static str {
        match self {
            Modality::Must => "MUST",
            Modality::MustNot => "MUST_NOT",
            Modality::Should => "SHOULD",
            Modality::May => "MAY",
        }
    }
}

/// Shape of the constraint a rule imposes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ConstraintKind {
    Requirement,
    Prohibition,
    Recommendation,
    Permission,
    Threshold,
}

/// A modal-marker-derived rule with its verbatim evidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormativeRule {
    pub rule_id: String,
    pub tenant_id: String,
    /// Verbatim subject window taken from before the marker; never invented.
    pub subject_text: String,
    pub subject_concept_id: Option<String>,
    pub modality: Modality,
    pub constraint_kind: ConstraintKind,
    pub constraint_value: String,
    /// Exact sentence containing the marker, quoted from the source item.
    pub evidence_span: String,
    /// Section path of the source item, when known.
    pub evidence_section: Option<String>,
    pub source_doc_id: String,
    pub extraction_method: ExtractionMethod,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Structural origin of a spec fact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum SpecSource {
    TableRow,
    KvList,
    InlineList,
}

/// A literal attribute/value fact lifted from document structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecFact {
    pub fact_id: String,
    pub tenant_id: String,
    pub attribute_name: String,
    pub spec_type: String,
    pub value: String,
    /// Numeric reading of `value` when it parses.
    pub value_numeric: Option<f64>,
    pub unit: Option<String>,
    pub source_structure: SpecSource,
    pub row_header: Option<String>,
    pub column_header: Option<String>,
    pub evidence_text: String,
    pub source_doc_id: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

fn normalize_key_part(part: &str) -> String {
    part.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonical dedup key for a rule: subject + modality + constraint + value.
pub fn rule_dedup_key(rule: &NormativeRule) -> String {
    format!(
        "{}|{}|{:?}|{}",
        normalize_key_part(&rule.subject_text),
        rule.modality.label(),
        rule.constraint_kind,
        normalize_key_part(&rule.constraint_value),
    )
}

/// Canonical dedup key for a fact: attribute + value + unit.
pub fn fact_dedup_key(fact: &SpecFact) -> String {
    format!(
        "{}|{}|{}|{}",
        normalize_key_part(&fact.attribute_name),
        normalize_key_part(&fact.spec_type),
        normalize_key_part(&fact.value),
        fact.unit.as_deref().map(normalize_key_part).unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rule(subject: &str, value: &str) -> NormativeRule {
        NormativeRule {
            rule_id: "rule_000001".into(),
            tenant_id: "default".into(),
            subject_text: subject.into(),
            subject_concept_id: None,
            modality: Modality::Must,
            constraint_kind: ConstraintKind::Requirement,
            constraint_value: value.into(),
            evidence_span: format!("{subject} must {value}"),
            evidence_section: None,
            source_doc_id: "doc_000001".into(),
            extraction_method: ExtractionMethod::Pattern,
            confidence: 0.9,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dedup_key_ignores_case_and_spacing() {
        let a = rule("The gateway", "use TLS 1.2");
        let b = rule("the   Gateway", "use tls 1.2");
        assert_eq!(rule_dedup_key(&a), rule_dedup_key(&b));
    }

    #[test]
    fn dedup_key_distinguishes_values() {
        let a = rule("The gateway", "use TLS 1.2");
        let b = rule("The gateway", "use TLS 1.3");
        assert_ne!(rule_dedup_key(&a), rule_dedup_key(&b));
    }
}
