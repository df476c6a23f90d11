//! Pass 0 structural records: documents, items, units, chunks.
//!
//! These types are written once by the structural pass and never mutated;
//! every later pass anchors into them by id and character span.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A logical document known to the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub document_id: String,
    pub tenant_id: String,
    pub title: String,
    /// BCP-47-ish lowercase language tag ("en", "fr", …).
    pub language: String,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An immutable version of a document's content.
///
/// The `content_hash` pins all downstream passes: re-ingesting the same
/// bytes is a no-op, a changed hash produces a new version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentVersion {
    pub doc_version_id: String,
    pub document_id: String,
    pub tenant_id: String,
    pub content_hash: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

/// Structural kind of a [`DocItem`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum DocItemKind {
    Narrative,
    Heading,
    Table,
    List,
    KvList,
    Caption,
    Code,
}

impl DocItemKind {
    /// Structural items are exempt from the minimum-unit-length rule and
    /// feed the spec-fact parser rather than the narrative extractors.
    pub fn is_structural(self) -> bool {
        matches!(self, DocItemKind::Table | DocItemKind::Heading | DocItemKind::KvList)
    }
}

/// One structural item of a document version, in reading order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocItem {
    pub docitem_id: String,
    pub doc_version_id: String,
    pub tenant_id: String,
    pub kind: DocItemKind,
    pub reading_order_index: usize,
    pub page: Option<u32>,
    /// Section this item belongs to (heading path), if known.
    pub section_id: Option<String>,
    /// Character span of this item inside the full document text.
    pub char_start: usize,
    pub char_end: usize,
    pub text: String,
}

/// Kind of an anchored [`Unit`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum UnitKind {
    Sentence,
    Bullet,
    Cell,
    Heading,
    Fragment,
}

/// Atomic anchor target: a short, stable substring of one [`DocItem`].
///
/// `local_id` is `U1…Un` within the item; spans are relative to the item's
/// own text so a unit can be re-read verbatim from the item at any time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    pub docitem_id: String,
    pub local_id: String,
    pub kind: UnitKind,
    pub char_start: usize,
    pub char_end: usize,
    pub text: String,
}

/// Chunk kind, mirroring the item mix the chunk was cut from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ChunkKind {
    Narrative,
    Table,
    Mixed,
}

/// A retrieval chunk: the embedding-sized slice of a document version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_version_id: String,
    pub tenant_id: String,
    pub kind: ChunkKind,
    /// Reading-order index of the first item covered by this chunk.
    pub order_start: usize,
    /// Section path of the dominant section, when available.
    pub section_path: Option<String>,
    pub text: String,
}

/// A section discovered from headings, used for batching and navigation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionInfo {
    pub section_id: String,
    /// Human path, e.g. "2.3 Security Architecture".
    pub path: String,
    pub level: u8,
    pub docitem_ids: Vec<String>,
}

/// Proof of where a claim lives: item, unit, and the exact character range
/// inside the item whose substring contains the claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Anchor {
    pub docitem_id: String,
    pub unit_id: Option<String>,
    pub char_start: usize,
    pub char_end: usize,
}

impl Anchor {
    /// Read the anchored substring back out of the item, or `None` when the
    /// span does not lie on char boundaries inside the item text.
    pub fn quote<'a>(&self, item_text: &'a str) -> Option<&'a str> {
        item_text.get(self.char_start..self.char_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_quotes_verbatim() {
        let anchor = Anchor {
            docitem_id: "di_000001".into(),
            unit_id: Some("U1".into()),
            char_start: 4,
            char_end: 9,
        };
        assert_eq!(anchor.quote("the quick fox"), Some("quick"));
        assert_eq!(anchor.quote("abc"), None);
    }

    #[test]
    fn structural_kinds() {
        assert!(DocItemKind::Table.is_structural());
        assert!(!DocItemKind::Narrative.is_structural());
    }
}
