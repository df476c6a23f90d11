//! Pointer-based extraction: the anti-reformulation mode.
//!
//! The model sees enumerated units (`U1: …`) and answers with unit ids
//! only. Quotes are read back from the unit index, never from the model.
//! A three-level validator rejects anything the model made up:
//!
//! 1. the unit id must exist in the index,
//! 2. the label must share enough tokens with the unit text,
//! 3. the value kind is detected from the unit, not declared.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use clients::{ChatMessage, LlmClient, LlmOptions, TaskType};
use ingest::{format_units_for_prompt, DocItemUnits, UnitIndex};
use model::Anchor;

use crate::concepts::tokenize;
use crate::error::AbstainReason;
use crate::json::{clip, parse_json_body};

/// Raw pointer entry as parsed from the model response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointerEntry {
    pub docitem_id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub concept_kind: String,
    pub unit_id: String,
    pub confidence: f64,
}

/// Kind of literal value detected inside a unit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Version,
    Quantity,
    Percentage,
    Duration,
    None,
}

/// A concept anchored to one unit, with its quote read from the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConceptAnchored {
    pub label: String,
    pub concept_kind: String,
    pub exact_quote: String,
    pub anchor: Anchor,
    pub value_kind: ValueKind,
    pub confidence: f64,
}

/// Validation statistics for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerStats {
    pub total: usize,
    pub valid: usize,
    pub abstained: usize,
}

impl PointerStats {
    pub fn abstain_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.abstained as f64 / self.total as f64
    }
}

/// Three-level validator for pointer entries.
#[derive(Debug, Clone)]
pub struct PointerValidator {
    min_shared_tokens: usize,
}

impl PointerValidator {
    pub fn new(min_shared_tokens: usize) -> Self {
        Self { min_shared_tokens }
    }

    /// Validate one entry against the unit index.
    pub fn validate(
        &self,
        entry: &PointerEntry,
        index: &UnitIndex,
    ) -> Result<ConceptAnchored, AbstainReason> {
        let unit = index
            .item(&entry.docitem_id)
            .and_then(|units: &DocItemUnits| units.unit(&entry.unit_id))
            .ok_or(AbstainReason::UnknownUnit)?;

        // Label must be grounded: enough of its tokens present in the unit.
        let unit_tokens = tokenize(&unit.text);
        let shared = tokenize(&entry.label)
            .into_iter()
            .filter(|t| unit_tokens.contains(t))
            .count();
        if shared < self.min_shared_tokens {
            debug!(label = %entry.label, unit = %entry.unit_id, shared, "pointer_label_rejected");
            return Err(AbstainReason::LabelNotGrounded);
        }

        Ok(ConceptAnchored {
            label: entry.label.clone(),
            concept_kind: entry.concept_kind.clone(),
            // Verbatim from the index; the model's text is never stored.
            exact_quote: unit.text.clone(),
            anchor: Anchor {
                docitem_id: unit.docitem_id.clone(),
                unit_id: Some(unit.local_id.clone()),
                char_start: unit.char_start,
                char_end: unit.char_end,
            },
            value_kind: detect_value_kind(&unit.text),
            confidence: entry.confidence.clamp(0.0, 1.0),
        })
    }

    /// Validate a batch; returns anchored concepts, abstentions, stats.
    pub fn validate_batch(
        &self,
        entries: &[PointerEntry],
        index: &UnitIndex,
    ) -> (Vec<ConceptAnchored>, Vec<(PointerEntry, AbstainReason)>, PointerStats) {
        let mut valid = Vec::new();
        let mut abstained = Vec::new();
        for entry in entries {
            match self.validate(entry, index) {
                Ok(anchored) => valid.push(anchored),
                Err(reason) => abstained.push((entry.clone(), reason)),
            }
        }
        let stats = PointerStats {
            total: entries.len(),
            valid: valid.len(),
            abstained: abstained.len(),
        };
        (valid, abstained, stats)
    }
}

/// Auto-detect the value kind from the unit text itself.
pub fn detect_value_kind(text: &str) -> ValueKind {
    let lower = text.to_lowercase();
    if lower.contains('%') {
        return ValueKind::Percentage;
    }
    let has_digit = lower.chars().any(|c| c.is_ascii_digit());
    if !has_digit {
        return ValueKind::None;
    }
    if lower
        .split_whitespace()
        .any(|t| t.contains('.') && t.chars().any(|c| c.is_ascii_digit()) && t.len() <= 8)
        || lower.contains("version")
        || lower.contains(" v")
    {
        return ValueKind::Version;
    }
    for unit in ["ms", "seconds", "minutes", "hours", "days", "months"] {
        if lower.contains(unit) {
            return ValueKind::Duration;
        }
    }
    ValueKind::Quantity
}

#[derive(Debug, Deserialize)]
struct PointerResponse {
    #[serde(default)]
    concepts: Vec<RawPointer>,
}

#[derive(Debug, Deserialize)]
struct RawPointer {
    label: String,
    #[serde(rename = "type")]
    concept_kind: Option<String>,
    unit_id: String,
    confidence: Option<f64>,
}

/// Query the model for pointer entries over one item's units.
pub async fn extract_pointers_for_item(
    docitem_id: &str,
    units: &DocItemUnits,
    language: &str,
    llm: &dyn LlmClient,
) -> Vec<PointerEntry> {
    let units_text = format_units_for_prompt(&units.units);
    let system = "You extract concepts by POINTING at numbered units. \
         Rules: answer with unit ids only; only propose a concept when a unit \
         contains it; the label must reuse words that appear in the unit text; \
         abstract rewordings are forbidden.";
    let user = format!(
        "ITEM: {docitem_id}\nLANGUAGE: {language}\n\nUNITS:\n{}\n\n\
         Answer with JSON: {{\"concepts\": [{{\"label\": str, \
         \"type\": \"PRESCRIPTIVE|DEFINITIONAL|FACTUAL|PERMISSIVE\", \
         \"unit_id\": \"U1\", \"confidence\": 0..1}}]}}",
        clip(&units_text, 3000),
    );
    let messages = [ChatMessage::system(system), ChatMessage::user(user)];
    let options = LlmOptions {
        temperature: 0.1,
        max_tokens: 2000,
        response_format: Some("json".into()),
    };

    let Some(parsed) = llm
        .complete(TaskType::PointerExtraction, &messages, &options)
        .await
        .ok()
        .and_then(|body| parse_json_body::<PointerResponse>(&body))
    else {
        return Vec::new();
    };

    let entries: Vec<PointerEntry> = parsed
        .concepts
        .into_iter()
        .filter(|c| {
            c.unit_id.starts_with('U') && c.unit_id[1..].chars().all(|ch| ch.is_ascii_digit())
        })
        .map(|c| PointerEntry {
            docitem_id: docitem_id.to_string(),
            label: c.label,
            concept_kind: c.concept_kind.unwrap_or_else(|| "FACTUAL".into()),
            unit_id: c.unit_id,
            confidence: c.confidence.unwrap_or(0.8),
        })
        .collect();
    info!(docitem_id, entries = entries.len(), "pointer_extraction");
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::{DocumentMetadata, Pass0Config, PlainTextParser, RawDocument};

    fn index_for(text: &str) -> (UnitIndex, String) {
        let out = ingest::run_pass0(
            RawDocument::from_text(
                DocumentMetadata {
                    tenant_id: "tenant-a".into(),
                    document_id: None,
                    title: "Pointer Sample".into(),
                    language: Some("en".into()),
                    source_url: None,
                },
                text,
            ),
            &PlainTextParser,
            &Pass0Config::default(),
        )
        .unwrap();
        let docitem_id = out.items[0].docitem_id.clone();
        (out.unit_index, docitem_id)
    }

    #[test]
    fn grounded_label_is_anchored_with_index_quote() {
        let (index, item_id) = index_for("TLS 1.2 is required for every connection handled by the gateway.\n");
        let validator = PointerValidator::new(2);
        let entry = PointerEntry {
            docitem_id: item_id.clone(),
            label: "TLS 1.2 required".into(),
            concept_kind: "PRESCRIPTIVE".into(),
            unit_id: "U1".into(),
            confidence: 0.9,
        };
        let anchored = validator.validate(&entry, &index).expect("valid");
        assert!(anchored.exact_quote.starts_with("TLS 1.2 is required"));
        assert_eq!(anchored.anchor.unit_id.as_deref(), Some("U1"));
        assert_eq!(anchored.value_kind, ValueKind::Version);
    }

    #[test]
    fn paraphrased_label_abstains() {
        let (index, item_id) = index_for("TLS 1.2 is required for every connection handled by the gateway.\n");
        let validator = PointerValidator::new(2);
        let entry = PointerEntry {
            docitem_id: item_id,
            label: "encryption requirement".into(),
            concept_kind: "PRESCRIPTIVE".into(),
            unit_id: "U3".into(),
            confidence: 0.9,
        };
        // Unknown unit is caught first…
        assert_eq!(validator.validate(&entry, &index), Err(AbstainReason::UnknownUnit));
        // …and a real unit with a rewritten label is caught second.
        let entry = PointerEntry { unit_id: "U1".into(), ..entry };
        assert_eq!(
            validator.validate(&entry, &index),
            Err(AbstainReason::LabelNotGrounded)
        );
    }

    #[test]
    fn value_kinds_are_detected_not_declared() {
        assert_eq!(detect_value_kind("supports TLS 1.2 and 1.3"), ValueKind::Version);
        assert_eq!(detect_value_kind("uptime of 99.9%"), ValueKind::Percentage);
        assert_eq!(detect_value_kind("retention of 30 days"), ValueKind::Duration);
        assert_eq!(detect_value_kind("limit of 10 concurrent jobs"), ValueKind::Quantity);
        assert_eq!(detect_value_kind("no numbers at all"), ValueKind::None);
    }
}
