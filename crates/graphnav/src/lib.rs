//! Graph layer of the strata pipeline.
//!
//! Three pieces live here:
//!
//! - the [`GraphStore`] trait and its in-memory implementation, the
//!   seam behind which a production graph database sits,
//! - the [`NavigationLayerBuilder`], context nodes and MENTIONED_IN
//!   edges describing corpus anatomy, with weights and budgets,
//! - the [`GraphLinter`], the firewall guaranteeing navigation and
//!   semantics never mix.

mod context_id;
mod error;
mod lint;
mod navigation;
mod store;

pub use context_id::{
    make_document_context_id, make_section_context_id, make_section_hash, make_window_context_id,
};
pub use error::GraphError;
pub use lint::{
    validate_graph, GraphLinter, LintResult, LintRuleId, LintSeverity, LintViolation,
};
pub use navigation::{
    concept_key, doc_key, NavigationConfig, NavigationLayerBuilder, NavigationStats,
    SectionMentions,
};
pub use store::{EdgeRecord, GraphStore, InMemoryGraphStore, MergeOp, MergeOutcome, NodeRecord};
