//! Pass 0.5: the linguistic coreference layer.
//!
//! Runs after the structural pass and before semantic extraction.
//! Responsibilities:
//!
//! 1. select a [`CorefEngine`] for the document language,
//! 2. resolve mention clusters, batching very large documents,
//! 3. gate aggressively: pronoun links must be close and confident,
//!    named↔named merges must survive surface-similarity checks and,
//!    in the review band, LLM arbitration,
//! 4. emit the coref graph (spans, chains, links) plus an append-only
//!    audit trail of every gating decision.
//!
//! The layer is strictly linguistic. It records what the text says about
//! mention identity and abstains whenever the evidence is thin; it never
//! invents entities and its concept alignments are lexical only.

mod arbiter;
mod batching;
mod config;
mod engine;
mod error;
mod gating;
mod named;
mod pipeline;
mod similarity;

pub use arbiter::{ArbiterDecision, ArbiterPair, CorefArbiter};
pub use batching::{
    create_section_batches, deduplicate_overlap_clusters, resolve_with_section_batching,
    SectionBatch,
};
pub use config::CorefConfig;
pub use engine::{
    engine_for_language, expletive_set, pronoun_set, ClusterMention, CorefEngine,
    CoreferenceCluster, EngineChunk, RuleBasedEngine,
};
pub use error::CorefError;
pub use gating::{GatingCandidate, GatingResult, PronounGate};
pub use named::{NamedGateDecision, NamedGatePolicy, NamedGateResult};
pub use pipeline::{
    align_mentions_to_concepts, ConceptAlignment, CorefGraphResult, Pass05Pipeline,
};
pub use similarity::{jaro_winkler, token_jaccard};
