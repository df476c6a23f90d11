//! Umbrella crate for the strata knowledge pipeline.
//!
//! `strata` re-exports the stage crates and drives them end-to-end: the
//! ingestion DAG (structure → coreference → semantics → relations →
//! promotion → navigation → lint) and the query path (plan → retrieve →
//! synthesize). Stores and model providers are traits throughout, so the
//! whole pipeline runs against in-memory implementations in tests and
//! demos and against real backends in production.
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use strata::{
//!     IngestPipeline, PipelineServices, SearchRequest, SearchService, StrataConfig,
//! };
//! use ingest::{DocumentMetadata, RawDocument};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let services = PipelineServices::in_memory();
//! let config = StrataConfig::default();
//! let pipeline = IngestPipeline::new(services.clone(), config.clone());
//!
//! let report = pipeline
//!     .ingest_document(RawDocument::from_text(
//!         DocumentMetadata {
//!             tenant_id: "tenant-a".into(),
//!             document_id: None,
//!             title: "Security Guide".into(),
//!             language: Some("en".into()),
//!             source_url: None,
//!         },
//!         "The gateway must use TLS 1.2 for all traffic.",
//!     ))
//!     .await?;
//! assert!(report.lint.success);
//!
//! let search = SearchService::new(services, config);
//! let response = search
//!     .search("tenant-a", &SearchRequest::question("Is TLS required?"))
//!     .await?;
//! println!("{}", response.synthesized_answer);
//! # Ok(())
//! # }
//! ```
//!
//! ## Observability
//!
//! Every stage reports its latency and outcome through [`PipelineStage`]
//! events. Install a [`PipelineEventLogger`] with [`set_pipeline_logger`]
//! to receive structured events; `tracing` spans cover the interior of
//! each stage independently.

pub mod config;
mod jobs;
mod observe;
mod pipeline;
mod search;

pub use config::{ConfigLoadError, StrataConfig};
pub use jobs::{IngestJob, JobStatus, JobTracker};
pub use observe::{
    set_pipeline_logger, PipelineEvent, PipelineEventLogger, PipelineEventStatus, PipelineStage,
};
pub use pipeline::{IngestPipeline, IngestReport, PipelineError, PipelineServices};
pub use search::{SearchRequest, SearchResponse, SearchService};
