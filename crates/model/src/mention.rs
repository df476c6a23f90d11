//! Pass 0.5 coreference records.
//!
//! The coreference layer is strictly linguistic: it records what the text
//! says about mention identity and never invents entities. Unresolved
//! mentions abstain, and every gating decision is kept as an append-only
//! audit record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Surface classification of a mention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MentionKind {
    Pronoun,
    Proper,
    Np,
}

/// One mention occurrence inside a document version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MentionSpan {
    pub mention_id: String,
    pub tenant_id: String,
    pub doc_version_id: String,
    pub docitem_id: String,
    pub chunk_id: Option<String>,
    /// Span in full-document coordinates.
    pub span_start: usize,
    pub span_end: usize,
    pub surface: String,
    pub kind: MentionKind,
    pub lang: String,
    pub sentence_index: Option<usize>,
}

impl MentionSpan {
    /// Stable audit key for this span, independent of the generated id.
    pub fn span_key(&self) -> String {
        format!("{}:{}:{}", self.doc_version_id, self.span_start, self.span_end)
    }
}

/// A cluster of mentions the engine believes corefer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoreferenceChain {
    pub chain_id: String,
    pub tenant_id: String,
    pub doc_version_id: String,
    /// Engine that produced the chain ("rule_based", "fastcoref", …).
    pub method: String,
    pub confidence: f64,
    pub mention_ids: Vec<String>,
    pub representative_mention_id: Option<String>,
}

/// Outcome of one gating decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorefOutcome {
    Resolved,
    Abstain,
    NonReferential,
}

/// Why a gating decision came out the way it did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum CorefReasonCode {
    GatePassed,
    LowEngineConfidence,
    SentenceDistanceExceeded,
    CharDistanceExceeded,
    NonReferentialPronoun,
    NoCandidate,
    NamedNamedRejected,
    LlmRejected,
    LlmValidated,
    LlmAbstained,
    CacheHit,
}

/// Append-only audit record of one gating evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorefDecision {
    pub decision_id: String,
    pub tenant_id: String,
    pub doc_version_id: String,
    pub mention_span_key: String,
    /// Candidate antecedent surfaces considered, in evaluation order.
    pub candidates: Vec<String>,
    pub outcome: CorefOutcome,
    pub reason_code: CorefReasonCode,
    pub method: String,
    pub created_at: DateTime<Utc>,
}

/// Scope within which a link was admitted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorefScope {
    Sentence,
    Window,
    Document,
}

/// A gated COREFERS_TO edge between two mentions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorefLink {
    pub source_mention_id: String,
    pub target_mention_id: String,
    pub method: String,
    pub confidence: f64,
    pub scope: CorefScope,
    /// Character distance between the two spans.
    pub window_chars: usize,
}
