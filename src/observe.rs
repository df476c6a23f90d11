//! Stage-level observability hooks.
//!
//! Deployments install a [`PipelineEventLogger`] once at startup; every
//! pipeline stage then emits one structured event with its latency and
//! outcome, correlated by tenant and document version.

use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

/// Stage of the ingestion or query pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Structure,
    Coreference,
    Semantics,
    Relations,
    Promotion,
    Navigation,
    Lint,
    Plan,
    Retrieve,
    Synthesize,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Structure => "structure",
            PipelineStage::Coreference => "coreference",
            PipelineStage::Semantics => "semantics",
            PipelineStage::Relations => "relations",
            PipelineStage::Promotion => "promotion",
            PipelineStage::Navigation => "navigation",
            PipelineStage::Lint => "lint",
            PipelineStage::Plan => "plan",
            PipelineStage::Retrieve => "retrieve",
            PipelineStage::Synthesize => "synthesize",
        };
        f.write_str(name)
    }
}

/// Outcome of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEventStatus {
    Success,
    Failure,
}

/// One structured stage observation.
#[derive(Debug, Clone)]
pub struct PipelineEvent {
    pub stage: PipelineStage,
    pub status: PipelineEventStatus,
    pub latency: Duration,
    pub tenant_id: String,
    pub doc_version_id: Option<String>,
    pub error: Option<String>,
}

/// Hook receiving stage events.
pub trait PipelineEventLogger: Send + Sync {
    fn log(&self, event: &PipelineEvent);
}

fn logger_lock() -> &'static RwLock<Option<Arc<dyn PipelineEventLogger>>> {
    static LOGGER: OnceLock<RwLock<Option<Arc<dyn PipelineEventLogger>>>> = OnceLock::new();
    LOGGER.get_or_init(|| RwLock::new(None))
}

/// Install or clear the process-wide stage event logger.
pub fn set_pipeline_logger(logger: Option<Arc<dyn PipelineEventLogger>>) {
    let mut guard = logger_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = logger;
}

fn pipeline_logger() -> Option<Arc<dyn PipelineEventLogger>> {
    logger_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// RAII-ish span: created at stage start, finished with the outcome.
pub(crate) struct StageSpan {
    stage: PipelineStage,
    tenant_id: String,
    doc_version_id: Option<String>,
    start: Instant,
}

impl StageSpan {
    pub(crate) fn start(stage: PipelineStage, tenant_id: &str, doc_version_id: Option<&str>) -> Self {
        Self {
            stage,
            tenant_id: tenant_id.to_string(),
            doc_version_id: doc_version_id.map(String::from),
            start: Instant::now(),
        }
    }

    pub(crate) fn finish(self, error: Option<String>) {
        let Some(logger) = pipeline_logger() else {
            return;
        };
        let status = if error.is_some() {
            PipelineEventStatus::Failure
        } else {
            PipelineEventStatus::Success
        };
        logger.log(&PipelineEvent {
            stage: self.stage,
            status,
            latency: self.start.elapsed(),
            tenant_id: self.tenant_id,
            doc_version_id: self.doc_version_id,
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLogger {
        events: Mutex<Vec<PipelineEvent>>,
    }

    impl PipelineEventLogger for RecordingLogger {
        fn log(&self, event: &PipelineEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn spans_reach_the_installed_logger() {
        let logger = Arc::new(RecordingLogger::default());
        set_pipeline_logger(Some(logger.clone()));

        let span = StageSpan::start(PipelineStage::Structure, "t1", Some("dv_1"));
        span.finish(None);
        let span = StageSpan::start(PipelineStage::Lint, "t1", Some("dv_1"));
        span.finish(Some("boom".into()));

        let events = logger.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, PipelineEventStatus::Success);
        assert_eq!(events[1].status, PipelineEventStatus::Failure);
        assert_eq!(events[1].error.as_deref(), Some("boom"));
        drop(events);

        set_pipeline_logger(None);
    }
}
