//! Shared context-id helpers.
//!
//! The same ids address contexts in the graph store and in vector-store
//! payloads, so both sides must derive them identically.

use model::short_hash;

/// Hash identifying a section within a document.
pub fn make_section_hash(document_id: &str, section_path: &str) -> String {
    let mut h = short_hash(&format!("{document_id}|{section_path}"));
    h.truncate(12);
    h
}

/// Context id for a whole document: `doc:{id}`.
pub fn make_document_context_id(document_id: &str) -> String {
    format!("doc:{document_id}")
}

/// Context id for a section: `sec:{doc}:{hash}`.
pub fn make_section_context_id(document_id: &str, section_path: &str) -> String {
    format!("sec:{document_id}:{}", make_section_hash(document_id, section_path))
}

/// Context id for a chunk window: `win:{chunk}`.
pub fn make_window_context_id(chunk_id: &str) -> String {
    format!("win:{chunk_id}")
}
