//! In-process ingest job tracking.
//!
//! The HTTP surface and queue plumbing live outside this core; what the
//! core guarantees is a job id per ingestion, a terminal status, and the
//! full report (or error) attached to it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;
use uuid::Uuid;

use ingest::RawDocument;

use crate::pipeline::{IngestPipeline, IngestReport};

/// Terminal and transient job states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    /// The pipeline finished but the graph lint found violations; the
    /// document's release is blocked until a re-run converges.
    Degraded,
    Failed,
}

/// One tracked job.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub job_id: String,
    pub tenant_id: String,
    pub status: JobStatus,
    pub report: Option<IngestReport>,
    pub error: Option<String>,
}

/// Tracker owning job records for one process.
#[derive(Default, Clone)]
pub struct JobTracker {
    jobs: Arc<Mutex<HashMap<String, IngestJob>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run an ingestion under a fresh job id and record the outcome.
    pub async fn run_ingest(&self, pipeline: &IngestPipeline, raw: RawDocument) -> String {
        let job_id = Uuid::new_v4().to_string();
        let tenant_id = raw.metadata.tenant_id.clone();
        self.set(IngestJob {
            job_id: job_id.clone(),
            tenant_id: tenant_id.clone(),
            status: JobStatus::Running,
            report: None,
            error: None,
        });

        match pipeline.ingest_document(raw).await {
            Ok(report) => {
                let status = if report.lint.success {
                    JobStatus::Completed
                } else {
                    JobStatus::Degraded
                };
                info!(job_id = %job_id, ?status, "ingest_job_finished");
                self.set(IngestJob {
                    job_id: job_id.clone(),
                    tenant_id,
                    status,
                    report: Some(report),
                    error: None,
                });
            }
            Err(err) => {
                info!(job_id = %job_id, error = %err, "ingest_job_failed");
                self.set(IngestJob {
                    job_id: job_id.clone(),
                    tenant_id,
                    status: JobStatus::Failed,
                    report: None,
                    error: Some(err.to_string()),
                });
            }
        }
        job_id
    }

    pub fn get(&self, job_id: &str) -> Option<IngestJob> {
        self.jobs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(job_id)
            .cloned()
    }

    fn set(&self, job: IngestJob) {
        self.jobs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(job.job_id.clone(), job);
    }
}
