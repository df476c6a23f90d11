//! Shared data model for the strata pipeline.
//!
//! Every persisted record of the knowledge substrate lives here: document
//! structure (Pass 0), coreference records (Pass 0.5), concepts and
//! assertions (Pass 1), typed relations and their promoted semantic form,
//! normative rules and spec facts, and the purely navigational context
//! nodes. Downstream crates depend on this one and nothing else in the
//! workspace, so the model is the contract between passes.
//!
//! Two rules shape everything in this crate:
//!
//! - **Evidence first.** Claims carry an [`Anchor`] pointing at an exact
//!   character range inside a [`DocItem`]. The anchored substring must
//!   contain the claim verbatim; evidence text is never paraphrased.
//! - **Tenant scoping.** Every record carries a `tenant_id` and all
//!   uniqueness keys include it.
//!
//! Closed vocabularies are tagged enums, not strings; record-shape checks
//! are explicit functions in [`validate`] invoked at construction time.

mod context;
mod document;
mod error;
mod id;
mod mention;
mod relation;
mod rule;
pub mod validate;

pub use context::{ContextKind, ContextNode, MentionedIn};
pub use document::{
    Anchor, Chunk, ChunkKind, DocItem, DocItemKind, Document, DocumentVersion, SectionInfo, Unit,
    UnitKind,
};
pub use error::ModelError;
pub use id::{content_hash, short_hash, IdGen};
pub use mention::{
    CorefDecision, CorefLink, CorefOutcome, CorefReasonCode, CorefScope, CoreferenceChain,
    MentionKind, MentionSpan,
};
pub use relation::{
    compute_bundle_diversity, compute_path_tier, compute_semantic_grade, AssertionKind,
    CanonicalConcept, CanonicalRelation, ConceptStatus, DefensibilityTier, DiscursiveBasis,
    ExtractionMethod, PromotionDecision, RawAssertion, RelationKind, SemanticGrade,
    SemanticRelation, SupportStrength,
};
pub use rule::{
    fact_dedup_key, rule_dedup_key, ConstraintKind, Modality, NormativeRule, SpecFact, SpecSource,
};
