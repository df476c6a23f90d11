//! Navigation-layer records: context nodes and MENTIONED_IN edges.
//!
//! Context nodes describe the CORPUS, not the world. They carry no
//! semantic claims and no semantic relation may touch them; the graph
//! lint enforces that separation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Granularity of a context node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// One per document.
    Document,
    /// Roughly 5–20 per document, from headings.
    Section,
    /// One per chunk; off by default and capped per document.
    Window,
}

/// A purely structural node addressing a slice of the corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextNode {
    /// "doc:{doc}" | "sec:{doc}:{hash}" | "win:{chunk}".
    pub context_id: String,
    pub kind: ContextKind,
    pub tenant_id: String,
    pub doc_id: String,
    pub section_path: Option<String>,
    pub section_hash: Option<String>,
    pub chunk_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Corpus-anatomy edge from a concept to a context.
///
/// `weight` is the per-context normalized frequency; it is recomputed
/// after every ingestion and always lies in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MentionedIn {
    pub concept_id: String,
    pub context_id: String,
    pub count: u32,
    pub weight: f64,
    pub first_seen: DateTime<Utc>,
}
