//! Graph-first search planning.
//!
//! Instead of enriching vector hits after the fact, the planner asks the
//! graph first: which concepts does the query seed, which tier-admissible
//! semantic paths connect them, and which corpus contexts carry the
//! evidence. Only then does retrieval run, filtered to those contexts.
//! Tier policies bound what the planner may traverse; escalation widens
//! the set step by step with a full audit trail.

mod error;
mod paths;
mod plan;
mod policy;

pub use error::PlannerError;
pub use paths::{
    collect_path_evidence, find_paths, validate_path_semantic_integrity, SemanticPath,
    MAX_PATHS, MAX_PATH_HOPS, MIN_PATH_CONFIDENCE,
};
pub use plan::{GraphFirstPlan, GraphFirstPlanner, SearchMode, StructuralRoute};
pub use policy::{EscalationState, TierFilterConfig, TraversalPolicy};
