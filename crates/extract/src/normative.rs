//! Normative rule and spec fact extraction.
//!
//! Both extractors read surface signals only: modal markers for rules,
//! table and key-value structure for facts. Subjects and evidence are
//! verbatim windows of the source text; when the window is empty the
//! extractor abstains rather than inventing a subject.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use model::{
    short_hash, ConstraintKind, DocItem, DocItemKind, ExtractionMethod, Modality, NormativeRule,
    SpecFact, SpecSource,
};

use crate::assertions::split_sentences;
use crate::error::AbstainReason;

static MODAL_EN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(must not|shall not|must|shall|is required to|are required to|required|should not|should|may)\b")
        .expect("modal regex")
});
static MODAL_FR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(ne doit pas|ne doivent pas|doit|doivent|est obligatoire|devrait|peut|peuvent)\b")
        .expect("modal regex")
});

fn modal_regex(lang: &str) -> &'static Regex {
    match lang {
        "fr" => &MODAL_FR,
        _ => &MODAL_EN,
    }
}

fn classify_marker(marker: &str) -> (Modality, ConstraintKind, f64) {
    let lower = marker.to_lowercase();
    match lower.as_str() {
        "must not" | "shall not" | "ne doit pas" | "ne doivent pas" => {
            (Modality::MustNot, ConstraintKind::Prohibition, 0.9)
        }
        "must" | "shall" | "doit" | "doivent" | "required" | "is required to"
        | "are required to" | "est obligatoire" => (Modality::Must, ConstraintKind::Requirement, 0.9),
        "should not" => (Modality::Should, ConstraintKind::Recommendation, 0.75),
        "should" | "devrait" => (Modality::Should, ConstraintKind::Recommendation, 0.75),
        _ => (Modality::May, ConstraintKind::Permission, 0.6),
    }
}

/// Width of the verbatim subject window taken before the marker.
const SUBJECT_WINDOW: usize = 80;

/// Extract normative rules from one item's sentences.
pub fn extract_rules_from_item(
    item: &DocItem,
    tenant_id: &str,
    doc_id: &str,
    lang: &str,
) -> (Vec<NormativeRule>, Vec<(String, AbstainReason)>) {
    let regex = modal_regex(lang);
    let mut rules = Vec::new();
    let mut abstentions = Vec::new();

    for sentence in split_sentences(&item.text) {
        let Some(found) = regex.find(sentence) else {
            continue;
        };
        // Subject: verbatim bounded window before the marker.
        let subject_raw = sentence[..found.start()].trim();
        if subject_raw.is_empty() {
            abstentions.push((sentence.to_string(), AbstainReason::SubjectMissing));
            continue;
        }
        let subject_text = tail_window(subject_raw, SUBJECT_WINDOW);
        let constraint_value = sentence[found.end()..]
            .trim()
            .trim_end_matches('.')
            .to_string();
        if constraint_value.is_empty() {
            abstentions.push((sentence.to_string(), AbstainReason::SubjectMissing));
            continue;
        }
        let (modality, mut constraint_kind, mut confidence) = classify_marker(found.as_str());
        if constraint_value.chars().any(|c| c.is_ascii_digit())
            && constraint_kind == ConstraintKind::Requirement
        {
            constraint_kind = ConstraintKind::Threshold;
        }
        if subject_raw.len() > SUBJECT_WINDOW {
            // Truncated subject window weakens the anchor.
            confidence -= 0.1;
        }
        let rule_id = format!(
            "rule_{}",
            short_hash(&format!("{doc_id}|{}|{sentence}", item.docitem_id))
        );
        rules.push(NormativeRule {
            rule_id,
            tenant_id: tenant_id.to_string(),
            subject_text,
            subject_concept_id: None,
            modality,
            constraint_kind,
            constraint_value,
            evidence_span: sentence.to_string(),
            evidence_section: item.section_id.clone(),
            source_doc_id: doc_id.to_string(),
            extraction_method: ExtractionMethod::Pattern,
            confidence,
            created_at: Utc::now(),
        });
    }
    (rules, abstentions)
}

fn tail_window(text: &str, window: usize) -> String {
    if text.len() <= window {
        return text.to_string();
    }
    let mut start = text.len() - window;
    while start < text.len() && !text.is_char_boundary(start) {
        start += 1;
    }
    // Cut at the next word boundary so the window stays readable.
    match text[start..].find(' ') {
        Some(space) => text[start + space + 1..].to_string(),
        None => text[start..].to_string(),
    }
}

/// Extract spec facts from a document's structural items.
pub fn extract_spec_facts(
    items: &[DocItem],
    tenant_id: &str,
    doc_id: &str,
) -> Vec<SpecFact> {
    let mut facts = Vec::new();
    for item in items {
        match item.kind {
            DocItemKind::Table => facts.extend(facts_from_table_row(item, tenant_id, doc_id)),
            DocItemKind::KvList => facts.extend(facts_from_kv(item, tenant_id, doc_id)),
            _ => {}
        }
    }
    info!(count = facts.len(), "spec_facts_extracted");
    facts
}

fn facts_from_table_row(item: &DocItem, tenant_id: &str, doc_id: &str) -> Vec<SpecFact> {
    let cells: Vec<&str> = item
        .text
        .split('|')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    if cells.len() < 2 {
        return Vec::new();
    }
    // Header-ish rows (no value-looking cell) are skipped.
    let value = cells[1];
    if value.eq_ignore_ascii_case("value") || cells[0].eq_ignore_ascii_case("feature") {
        return Vec::new();
    }
    let (value_numeric, unit) = parse_numeric(value);
    vec![SpecFact {
        fact_id: format!("fact_{}", short_hash(&format!("{doc_id}|{}", item.text))),
        tenant_id: tenant_id.to_string(),
        attribute_name: cells[0].to_string(),
        spec_type: item
            .section_id
            .clone()
            .unwrap_or_else(|| "GENERAL".to_string()),
        value: value.to_string(),
        value_numeric,
        unit,
        source_structure: SpecSource::TableRow,
        row_header: Some(cells[0].to_string()),
        column_header: cells.get(2).map(|c| (*c).to_string()),
        evidence_text: item.text.clone(),
        source_doc_id: doc_id.to_string(),
        confidence: 0.95,
        created_at: Utc::now(),
    }]
}

fn facts_from_kv(item: &DocItem, tenant_id: &str, doc_id: &str) -> Vec<SpecFact> {
    let Some((key, value)) = item.text.split_once(':') else {
        return Vec::new();
    };
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        return Vec::new();
    }
    let (value_numeric, unit) = parse_numeric(value);
    vec![SpecFact {
        fact_id: format!("fact_{}", short_hash(&format!("{doc_id}|{}", item.text))),
        tenant_id: tenant_id.to_string(),
        attribute_name: key.to_string(),
        spec_type: item
            .section_id
            .clone()
            .unwrap_or_else(|| "GENERAL".to_string()),
        value: value.to_string(),
        value_numeric,
        unit,
        source_structure: SpecSource::KvList,
        row_header: None,
        column_header: None,
        evidence_text: item.text.clone(),
        source_doc_id: doc_id.to_string(),
        confidence: 0.85,
        created_at: Utc::now(),
    }]
}

/// Parse "10 GB" → (Some(10.0), Some("GB")); plain text → (None, None).
pub fn parse_numeric(value: &str) -> (Option<f64>, Option<String>) {
    let mut parts = value.split_whitespace();
    let Some(first) = parts.next() else {
        return (None, None);
    };
    let cleaned: String = first
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    match cleaned.parse::<f64>() {
        Ok(n) if !cleaned.is_empty() => {
            let unit = parts.next().map(String::from);
            (Some(n), unit)
        }
        _ => (None, None),
    }
}
