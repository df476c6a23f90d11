//! Inbound document shapes and the parser boundary.

use serde::{Deserialize, Serialize};

use model::DocItemKind;

use crate::error::IngestError;

/// Metadata accompanying a document at ingest time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub tenant_id: String,
    /// Stable external id; a deterministic one is derived when empty.
    pub document_id: Option<String>,
    pub title: String,
    /// Lowercase language tag; overrides the parser's hint when set.
    pub language: Option<String>,
    pub source_url: Option<String>,
}

/// A raw document handed to the pipeline: bytes plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawDocument {
    pub metadata: DocumentMetadata,
    pub payload: Vec<u8>,
}

impl RawDocument {
    pub fn from_text(metadata: DocumentMetadata, text: impl Into<String>) -> Self {
        Self {
            metadata,
            payload: text.into().into_bytes(),
        }
    }
}

/// One structural item as produced by a parser, before ids are assigned.
/// Spans are into the parser's reconstructed full text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedItem {
    pub kind: DocItemKind,
    pub page: Option<u32>,
    /// Heading path in effect at this item ("2.3 Security"), if any.
    pub section_path: Option<String>,
    pub char_start: usize,
    pub char_end: usize,
    pub text: String,
}

/// Output of a parser: reading-order items plus the full text they index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedDocument {
    pub full_text: String,
    pub items: Vec<ParsedItem>,
    pub language_hint: Option<String>,
}

/// External parser boundary (PDF/PPT/XLSX readers, OCR). The core ships
/// only [`PlainTextParser`]; production parsers live with their formats.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, payload: &[u8]) -> Result<ParsedDocument, IngestError>;
}

/// Line-oriented parser for UTF-8 text, used by tests and demos.
///
/// Recognizes markdown-ish structure: `#`-prefixed or numbered headings,
/// `|`-delimited table rows, `-`/`*` bullets, `key: value` pairs, and
/// blank-line-separated narrative paragraphs.
#[derive(Debug, Default)]
pub struct PlainTextParser;

impl PlainTextParser {
    fn classify(line: &str) -> DocItemKind {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            DocItemKind::Heading
        } else if looks_like_numbered_heading(trimmed) {
            DocItemKind::Heading
        } else if trimmed.starts_with('|') && trimmed.matches('|').count() >= 2 {
            DocItemKind::Table
        } else if trimmed.starts_with("- ") || trimmed.starts_with("* ") {
            DocItemKind::List
        } else if is_kv_line(trimmed) {
            DocItemKind::KvList
        } else {
            DocItemKind::Narrative
        }
    }
}

fn looks_like_numbered_heading(line: &str) -> bool {
    // "2.3 Security Architecture": short line opening with a dotted number.
    let mut chars = line.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_digit()
        && line.len() < 80
        && line
            .split_whitespace()
            .next()
            .is_some_and(|head| head.chars().all(|c| c.is_ascii_digit() || c == '.'))
        && line.split_whitespace().count() >= 2
        && !line.trim_end().ends_with('.')
}

fn is_kv_line(line: &str) -> bool {
    match line.split_once(':') {
        Some((key, value)) => {
            !key.trim().is_empty()
                && key.len() <= 40
                && !key.contains('.')
                && !value.trim().is_empty()
        }
        None => false,
    }
}

impl DocumentParser for PlainTextParser {
    fn parse(&self, payload: &[u8]) -> Result<ParsedDocument, IngestError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| IngestError::InvalidUtf8(e.to_string()))?
            .to_string();

        let mut items: Vec<ParsedItem> = Vec::new();
        let mut section_path: Option<String> = None;
        let mut paragraph: Vec<(usize, &str)> = Vec::new();
        let mut offset = 0usize;

        let mut flush_paragraph = |buf: &mut Vec<(usize, &str)>, section: &Option<String>,
                                   items: &mut Vec<ParsedItem>| {
            if buf.is_empty() {
                return;
            }
            let start = buf[0].0;
            let joined: String = buf
                .iter()
                .map(|(_, l)| *l)
                .collect::<Vec<_>>()
                .join("\n");
            let end = start + joined.len();
            items.push(ParsedItem {
                kind: DocItemKind::Narrative,
                page: None,
                section_path: section.clone(),
                char_start: start,
                char_end: end,
                text: joined,
            });
            buf.clear();
        };

        for line in text.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();
            let content = line.trim_end_matches('\n');
            let trimmed = content.trim();

            if trimmed.is_empty() {
                flush_paragraph(&mut paragraph, &section_path, &mut items);
                continue;
            }

            let kind = Self::classify(trimmed);
            match kind {
                DocItemKind::Narrative => {
                    let lead = content.len() - content.trim_start().len();
                    paragraph.push((line_start + lead, content.trim_start()));
                }
                other => {
                    flush_paragraph(&mut paragraph, &section_path, &mut items);
                    let lead = content.len() - content.trim_start().len();
                    let start = line_start + lead;
                    let body = content.trim_start();
                    if other == DocItemKind::Heading {
                        section_path = Some(body.trim_start_matches('#').trim().to_string());
                    }
                    items.push(ParsedItem {
                        kind: other,
                        page: None,
                        section_path: section_path.clone(),
                        char_start: start,
                        char_end: start + body.len(),
                        text: body.to_string(),
                    });
                }
            }
        }
        flush_paragraph(&mut paragraph, &section_path, &mut items);

        if items.is_empty() {
            return Err(IngestError::EmptyDocument);
        }

        Ok(ParsedDocument {
            full_text: text,
            items,
            language_hint: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_classifies_structure() {
        let text = "# Security\n\nAll traffic is encrypted in transit.\n\n| Feature | Limit |\n| Uploads | 10 GB |\n\n- supports SSO\nRetention: 30 days\n";
        let parsed = PlainTextParser.parse(text.as_bytes()).expect("parse");

        let kinds: Vec<DocItemKind> = parsed.items.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DocItemKind::Heading,
                DocItemKind::Narrative,
                DocItemKind::Table,
                DocItemKind::Table,
                DocItemKind::List,
                DocItemKind::KvList,
            ]
        );

        // Spans index into the original text verbatim.
        for item in &parsed.items {
            assert_eq!(&parsed.full_text[item.char_start..item.char_end], item.text);
        }

        // Items inherit the active section path.
        assert_eq!(parsed.items[1].section_path.as_deref(), Some("Security"));
    }

    #[test]
    fn numbered_headings_recognized() {
        let text = "2.3 Security Architecture\n\nBody text follows here.\n";
        let parsed = PlainTextParser.parse(text.as_bytes()).expect("parse");
        assert_eq!(parsed.items[0].kind, DocItemKind::Heading);
        assert_eq!(
            parsed.items[1].section_path.as_deref(),
            Some("2.3 Security Architecture")
        );
    }

    #[test]
    fn empty_document_rejected() {
        let result = PlainTextParser.parse(b"  \n \n");
        assert!(matches!(result, Err(IngestError::EmptyDocument)));
    }

    #[test]
    fn invalid_utf8_rejected() {
        let result = PlainTextParser.parse(&[0xff, 0xfe]);
        assert!(matches!(result, Err(IngestError::InvalidUtf8(_))));
    }
}
