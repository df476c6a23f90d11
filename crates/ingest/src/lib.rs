//! Pass 0: the structural layer.
//!
//! This is where documents enter the pipeline. A [`DocumentParser`] turns
//! raw bytes into reading-order items; this pass then assigns stable ids,
//! builds the unit index that anchors all later evidence, cuts retrieval
//! chunks, and derives the section map used for batching and navigation.
//!
//! Identifiers are derived from the content hash, so ingesting the same
//! bytes twice yields byte-identical structures; the idempotence
//! guarantee every later merge relies on.
//!
//! ## Entry point
//!
//! Call [`run_pass0`] with a [`RawDocument`], a parser, and a
//! [`Pass0Config`]; get back a [`Pass0Output`] carrying the document
//! version, items, unit index, chunks, sections and the chunk → item map.

use std::collections::HashMap;

use chrono::Utc;
use tracing::info;

use model::{
    content_hash, short_hash, validate::validate_plain_id, DocItem, Document, DocumentVersion,
    SectionInfo,
};

mod chunker;
mod config;
mod error;
mod types;
mod units;

pub use crate::chunker::build_chunks;
pub use crate::config::Pass0Config;
pub use crate::error::IngestError;
pub use crate::types::{
    DocumentMetadata, DocumentParser, ParsedDocument, ParsedItem, PlainTextParser, RawDocument,
};
pub use crate::units::{format_units_for_prompt, DocItemUnits, UnitIndex, UnitIndexer};

/// Everything the structural pass produces for one document version.
#[derive(Debug, Clone)]
pub struct Pass0Output {
    pub document: Document,
    pub version: DocumentVersion,
    pub items: Vec<DocItem>,
    pub unit_index: UnitIndex,
    pub chunks: Vec<model::Chunk>,
    pub sections: Vec<SectionInfo>,
    /// chunk_id → ids of the DocItems the chunk was cut from.
    pub chunk_to_items: HashMap<String, Vec<String>>,
    pub full_text: String,
}

/// Run Pass 0 over a raw document.
pub fn run_pass0(
    raw: RawDocument,
    parser: &dyn DocumentParser,
    cfg: &Pass0Config,
) -> Result<Pass0Output, IngestError> {
    let parsed = parser.parse(&raw.payload)?;

    let tenant_id = if raw.metadata.tenant_id.trim().is_empty() {
        cfg.default_tenant_id.clone()
    } else {
        raw.metadata.tenant_id.clone()
    };

    let hash = content_hash(&parsed.full_text);
    let document_id = match &raw.metadata.document_id {
        Some(id) if !id.trim().is_empty() => {
            validate_plain_id(id).map_err(|e| IngestError::InvalidMetadata(e.to_string()))?;
            id.clone()
        }
        // Deterministic derivation: same tenant + title + content, same id.
        _ => format!(
            "doc_{}",
            short_hash(&format!("{tenant_id}|{}|{hash}", raw.metadata.title))
        ),
    };
    let doc_version_id = format!("dv_{}", short_hash(&format!("{document_id}|{hash}")));
    let stem = short_hash(&doc_version_id);

    let language = raw
        .metadata
        .language
        .clone()
        .or_else(|| parsed.language_hint.clone())
        .unwrap_or_else(|| cfg.default_language.clone())
        .to_lowercase();

    let now = Utc::now();
    let document = Document {
        document_id: document_id.clone(),
        tenant_id: tenant_id.clone(),
        title: raw.metadata.title.clone(),
        language: language.clone(),
        source_url: raw.metadata.source_url.clone(),
        created_at: now,
    };
    let version = DocumentVersion {
        doc_version_id: doc_version_id.clone(),
        document_id,
        tenant_id: tenant_id.clone(),
        content_hash: hash,
        language,
        created_at: now,
    };

    // Items, with ids derived from the version so re-ingest is a no-op.
    let items: Vec<DocItem> = parsed
        .items
        .iter()
        .enumerate()
        .map(|(idx, p)| DocItem {
            docitem_id: format!("di_{}_{idx:03}", &stem[..8]),
            doc_version_id: doc_version_id.clone(),
            tenant_id: tenant_id.clone(),
            kind: p.kind,
            reading_order_index: idx,
            page: p.page,
            section_id: p.section_path.clone(),
            char_start: p.char_start,
            char_end: p.char_end,
            text: p.text.clone(),
        })
        .collect();

    // Unit index over every item.
    let indexer = UnitIndexer::new(cfg);
    let mut unit_index = UnitIndex::default();
    for item in &items {
        let units = indexer.index_item(item);
        if !units.units.is_empty() {
            unit_index.insert(item.docitem_id.clone(), units);
        }
    }

    // Chunks + chunk→item map.
    let (chunks, chunk_to_items) = build_chunks(&doc_version_id, &tenant_id, &items, cfg);

    // Sections from the heading paths in effect.
    let sections = collect_sections(&items);

    info!(
        tenant_id = %tenant_id,
        doc_version_id = %doc_version_id,
        items = items.len(),
        units = unit_index.len(),
        chunks = chunks.len(),
        sections = sections.len(),
        "pass0_complete"
    );

    Ok(Pass0Output {
        document,
        version,
        items,
        unit_index,
        chunks,
        sections,
        chunk_to_items,
        full_text: parsed.full_text,
    })
}

fn collect_sections(items: &[DocItem]) -> Vec<SectionInfo> {
    let mut sections: Vec<SectionInfo> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for item in items {
        let Some(path) = &item.section_id else {
            continue;
        };
        let pos = *index.entry(path.clone()).or_insert_with(|| {
            sections.push(SectionInfo {
                section_id: format!("sec_{}", short_hash(path)),
                path: path.clone(),
                level: path.chars().filter(|c| *c == '.').count() as u8,
                docitem_ids: Vec::new(),
            });
            sections.len() - 1
        });
        sections[pos].docitem_ids.push(item.docitem_id.clone());
    }
    sections
}
