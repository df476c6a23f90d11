//! Re-ingestion of identical content must be a no-op at the store level.

use ingest::{DocumentMetadata, RawDocument};
use strata::{IngestPipeline, PipelineServices, StrataConfig};

const GUIDE: &str = "# Platform\n\nAtlas Gateway requires Zephyr Queue for burst buffering under load. \
Atlas Gateway terminates TLS for tenants. Zephyr Queue replays events nightly.\n\n\
# Limits\n\n| Upload size | 10 GB |\n";

fn raw(text: &str) -> RawDocument {
    RawDocument::from_text(
        DocumentMetadata {
            tenant_id: "tenant-a".into(),
            document_id: None,
            title: "Platform Guide".into(),
            language: Some("en".into()),
            source_url: None,
        },
        text,
    )
}

#[tokio::test]
async fn reingesting_same_content_hash_is_a_noop() {
    let services = PipelineServices::in_memory();
    let pipeline = IngestPipeline::new(services.clone(), StrataConfig::default());

    let first = pipeline.ingest_document(raw(GUIDE)).await.expect("first ingest");
    assert!(!first.skipped);

    let nodes_before = services.graph.node_count().unwrap();
    let edges_before = services.graph.edge_count().unwrap();
    let points_before = services.vectors.point_count("knowbase").unwrap();

    let second = pipeline.ingest_document(raw(GUIDE)).await.expect("second ingest");
    assert!(second.skipped);
    assert_eq!(second.doc_version_id, first.doc_version_id);
    assert_eq!(second.chunks_inserted, 0);

    assert_eq!(services.graph.node_count().unwrap(), nodes_before);
    assert_eq!(services.graph.edge_count().unwrap(), edges_before);
    assert_eq!(services.vectors.point_count("knowbase").unwrap(), points_before);
    assert!(second.lint.success);
}

#[tokio::test]
async fn changed_content_creates_a_new_version() {
    let services = PipelineServices::in_memory();
    let pipeline = IngestPipeline::new(services.clone(), StrataConfig::default());

    let first = pipeline.ingest_document(raw(GUIDE)).await.expect("first ingest");
    let second = pipeline
        .ingest_document(raw(
            "# Platform\n\nAtlas Gateway now also signs requests. Atlas Gateway stays the entry point.\n",
        ))
        .await
        .expect("revised ingest");

    assert!(!second.skipped);
    assert_ne!(second.doc_version_id, first.doc_version_id);
}
