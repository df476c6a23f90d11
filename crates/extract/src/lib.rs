//! Pass 1: semantic extraction.
//!
//! Turns structural output into grounded semantics: document analysis,
//! canonical concepts, classified assertions with exact anchors, typed
//! relations between concepts, and the normative rules and spec facts
//! read straight from modal markers and document structure.
//!
//! Two disciplines hold everywhere in this crate:
//!
//! - **Verbatim or nothing.** Assertion texts, relation evidence, rule
//!   subjects and spec values are substrings of the source. Anything the
//!   model reformulated is rejected, and pointer mode goes further by
//!   only ever accepting unit ids.
//! - **Abstain loudly.** Every non-emission lands in a log with a typed
//!   reason; abstention is never an error and never silent.

mod analysis;
mod anchor;
mod assertions;
mod concepts;
mod config;
mod error;
mod json;
mod normative;
mod orchestrator;
mod pointer;
mod relations;

pub use analysis::{
    analyze_document, build_global_view, DocumentAnalysis, DocumentStructure, GlobalView, Theme,
};
pub use anchor::AnchorResolver;
pub use assertions::{
    extract_assertions, filter_by_promotion_policy, link_to_concepts, AssertionDraft,
    PolicyOutcome,
};
pub use concepts::{
    concept_budget, identify_concepts, refine_concepts, should_continue_iteration, Concept,
    ConceptRole, Saturation,
};
pub use config::{Pass1Config, RelationStrategy};
pub use error::{AbstainReason, ExtractError};
pub use normative::{extract_rules_from_item, extract_spec_facts, parse_numeric};
pub use orchestrator::{
    AssertionLogEntry, AssertionStatus, Information, Pass1Orchestrator, Pass1Result, Pass1Stats,
};
pub use pointer::{
    detect_value_kind, extract_pointers_for_item, ConceptAnchored, PointerEntry, PointerStats,
    PointerValidator, ValueKind,
};
pub use relations::{
    has_marker_for, EvidenceSpan, RelationExtractionEngine, TypedRelation,
};
