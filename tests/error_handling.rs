//! Boundary rejections surface as typed errors; the job tracker records
//! failures without leaking internals.

use ingest::{DocumentMetadata, RawDocument};
use strata::{IngestPipeline, JobStatus, JobTracker, PipelineError, PipelineServices, StrataConfig};

fn metadata() -> DocumentMetadata {
    DocumentMetadata {
        tenant_id: "tenant-a".into(),
        document_id: None,
        title: "Broken".into(),
        language: Some("en".into()),
        source_url: None,
    }
}

#[tokio::test]
async fn empty_documents_are_rejected_at_the_boundary() {
    let pipeline = IngestPipeline::new(PipelineServices::in_memory(), StrataConfig::default());
    let result = pipeline
        .ingest_document(RawDocument::from_text(metadata(), "   \n  \n"))
        .await;
    assert!(matches!(result, Err(PipelineError::Ingest(_))));
}

#[tokio::test]
async fn traversal_in_document_ids_is_rejected() {
    let pipeline = IngestPipeline::new(PipelineServices::in_memory(), StrataConfig::default());
    let mut meta = metadata();
    meta.document_id = Some("../../etc/passwd".into());
    let result = pipeline
        .ingest_document(RawDocument::from_text(meta, "Some perfectly fine text here."))
        .await;
    assert!(matches!(result, Err(PipelineError::Ingest(_))));
}

#[tokio::test]
async fn failed_jobs_carry_an_error_and_no_report() {
    let pipeline = IngestPipeline::new(PipelineServices::in_memory(), StrataConfig::default());
    let tracker = JobTracker::new();
    let job_id = tracker
        .run_ingest(&pipeline, RawDocument::from_text(metadata(), " "))
        .await;

    let job = tracker.get(&job_id).expect("job recorded");
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.report.is_none());
    assert!(job.error.is_some());

    assert!(tracker.get("missing-job").is_none());
}
