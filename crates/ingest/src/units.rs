//! Unit indexer: splits DocItems into short, stable anchor targets.
//!
//! Units are the atomic granularity of evidence. They are addressable as
//! `index.item(docitem_id).unit("U3")` and their spans are relative to the
//! owning item's text, so a unit can always be re-read verbatim.

use std::collections::HashMap;

use model::{DocItem, DocItemKind, Unit, UnitKind};

use crate::config::Pass0Config;

/// Units of one DocItem, in order, with `U1…Un` local ids.
#[derive(Debug, Clone, Default)]
pub struct DocItemUnits {
    pub units: Vec<Unit>,
}

impl DocItemUnits {
    pub fn unit(&self, local_id: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.local_id == local_id)
    }
}

/// Index of all units produced for a document version.
#[derive(Debug, Clone, Default)]
pub struct UnitIndex {
    by_item: HashMap<String, DocItemUnits>,
}

impl UnitIndex {
    pub fn item(&self, docitem_id: &str) -> Option<&DocItemUnits> {
        self.by_item.get(docitem_id)
    }

    pub fn insert(&mut self, docitem_id: String, units: DocItemUnits) {
        self.by_item.insert(docitem_id, units);
    }

    pub fn items(&self) -> impl Iterator<Item = (&String, &DocItemUnits)> {
        self.by_item.iter()
    }

    pub fn len(&self) -> usize {
        self.by_item.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_item.is_empty()
    }
}

/// Splits one DocItem into units along strong boundaries.
#[derive(Debug, Clone)]
pub struct UnitIndexer {
    min_unit_chars: usize,
}

impl UnitIndexer {
    pub fn new(cfg: &Pass0Config) -> Self {
        Self {
            min_unit_chars: cfg.min_unit_chars,
        }
    }

    /// Index a DocItem. Short fragments are dropped unless the item is
    /// structural (table cells and headings anchor facts of any length).
    pub fn index_item(&self, item: &DocItem) -> DocItemUnits {
        let structural = item.kind.is_structural();
        let raw_spans = match item.kind {
            DocItemKind::Table => split_cells(&item.text),
            DocItemKind::List => split_bullets(&item.text),
            _ => split_sentences(&item.text),
        };

        let mut units = Vec::new();
        for (start, end) in raw_spans {
            let text = item.text[start..end].trim();
            if text.is_empty() {
                continue;
            }
            if !structural && text.len() < self.min_unit_chars {
                continue;
            }
            // Re-locate the trimmed text inside the raw span.
            let lead = item.text[start..end].len() - item.text[start..end].trim_start().len();
            let unit_start = start + lead;
            let unit_end = unit_start + text.len();
            units.push(Unit {
                docitem_id: item.docitem_id.clone(),
                local_id: format!("U{}", units.len() + 1),
                kind: unit_kind_for(item.kind),
                char_start: unit_start,
                char_end: unit_end,
                text: text.to_string(),
            });
        }
        DocItemUnits { units }
    }
}

fn unit_kind_for(kind: DocItemKind) -> UnitKind {
    match kind {
        DocItemKind::Table => UnitKind::Cell,
        DocItemKind::List => UnitKind::Bullet,
        DocItemKind::Heading => UnitKind::Heading,
        _ => UnitKind::Sentence,
    }
}

/// Sentence spans: terminator followed by whitespace, or end of text.
fn split_sentences(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0usize;
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if matches!(c, '.' | '!' | '?') {
            let at_end = i + 1 >= bytes.len();
            let next_is_space = !at_end && (bytes[i + 1] as char).is_whitespace();
            if at_end || next_is_space {
                spans.push((start, i + 1));
                start = i + 1;
            }
        }
        i += 1;
    }
    if start < text.len() {
        spans.push((start, text.len()));
    }
    spans
}

/// Bullet spans: one per line, marker stripped by the caller's trim.
fn split_bullets(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let body = line.trim_end_matches('\n');
        let trimmed = body.trim_start_matches(['-', '*']).trim_start();
        if !trimmed.is_empty() {
            let lead = body.len() - trimmed.len();
            spans.push((offset + lead, offset + body.len()));
        }
        offset += line.len();
    }
    spans
}

/// Cell spans: `|`-delimited fields of a table row.
fn split_cells(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0usize;
    for (idx, c) in text.char_indices() {
        if c == '|' {
            if idx > start {
                spans.push((start, idx));
            }
            start = idx + 1;
        }
    }
    if start < text.len() {
        spans.push((start, text.len()));
    }
    spans
}

/// Render units as `U1: <text>` lines for pointer-based extraction
/// prompts. The model must answer with unit ids only; text is always
/// reconstructed from the index, never from the model.
pub fn format_units_for_prompt(units: &[Unit]) -> String {
    units
        .iter()
        .map(|u| format!("{}: {}", u.local_id, u.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narrative_item(text: &str) -> DocItem {
        DocItem {
            docitem_id: "di_test_001".into(),
            doc_version_id: "dv_test".into(),
            tenant_id: "default".into(),
            kind: DocItemKind::Narrative,
            reading_order_index: 0,
            page: None,
            section_id: None,
            char_start: 0,
            char_end: text.len(),
            text: text.into(),
        }
    }

    fn indexer() -> UnitIndexer {
        UnitIndexer::new(&Pass0Config::default())
    }

    #[test]
    fn sentences_get_local_ids_in_order() {
        let item = narrative_item(
            "The platform encrypts all data at rest. Backups run every night without exception. Ok.",
        );
        let units = indexer().index_item(&item);
        assert_eq!(units.units.len(), 2, "trailing 'Ok.' is below the floor");
        assert_eq!(units.units[0].local_id, "U1");
        assert_eq!(units.units[1].local_id, "U2");
        assert_eq!(units.unit("U2").unwrap().text, "Backups run every night without exception.");
    }

    #[test]
    fn unit_spans_are_verbatim() {
        let item = narrative_item("  Access tokens expire after fifteen minutes of idle time.  ");
        let units = indexer().index_item(&item);
        let unit = &units.units[0];
        assert_eq!(&item.text[unit.char_start..unit.char_end], unit.text);
    }

    #[test]
    fn table_cells_are_kept_despite_length() {
        let mut item = narrative_item("| TLS | 1.2 |");
        item.kind = DocItemKind::Table;
        let units = indexer().index_item(&item);
        let texts: Vec<&str> = units.units.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["TLS", "1.2"]);
        assert_eq!(units.units[0].kind, UnitKind::Cell);
    }

    #[test]
    fn bullets_split_per_line() {
        let mut item = narrative_item("- single sign-on with SAML identity providers\n- granular audit logging");
        item.kind = DocItemKind::List;
        let units = indexer().index_item(&item);
        // Lists are not structural, so the short second bullet is dropped.
        assert_eq!(units.units.len(), 1);
        assert_eq!(units.units[0].kind, UnitKind::Bullet);
    }

    #[test]
    fn prompt_format_enumerates_units() {
        let item = narrative_item("First sentence long enough to keep around. Second sentence also long enough here.");
        let units = indexer().index_item(&item);
        let prompt = format_units_for_prompt(&units.units);
        assert!(prompt.starts_with("U1: First sentence"));
        assert!(prompt.contains("\nU2: Second sentence"));
    }
}
