//! Retrieval and synthesis.
//!
//! The last leg of a search: plan-filtered vector retrieval, reranking
//! with a score floor, prompt assembly with strict citation rules, and
//! an auditable confidence breakdown capped at 0.90; the system never
//! claims certainty.

mod confidence;
mod config;
mod error;
mod rerank;
mod retriever;
mod synthesis;
mod vector;

pub use confidence::{
    compute_confidence, ChainSignals, ConfidenceBreakdown, ConfidenceConfig, KgSignals,
};
pub use config::RetrieveConfig;
pub use error::RetrieveError;
pub use rerank::{LexicalReranker, Reranker};
pub use retriever::{RetrievedChunk, Retriever};
pub use synthesis::{
    chain_signals_from_paths, format_chunks_for_synthesis, render_chain_narratives,
    synthesize_response, GraphEnrichmentLevel, SynthesisContext, SynthesisResult,
};
pub use vector::{
    Filter, FilterCondition, InMemoryVectorStore, ScoredPoint, VectorPoint, VectorStore,
};
