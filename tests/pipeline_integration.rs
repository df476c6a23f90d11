//! Cross-pass behaviors: discursive discipline across documents, lint
//! enforcement through the job tracker, and registry governance.

use serde_json::Map;

use graphnav::validate_graph;
use ingest::{DocumentMetadata, RawDocument};
use registry::EntityTypeStatus;
use strata::{IngestPipeline, JobStatus, JobTracker, PipelineServices, StrataConfig};

fn raw(title: &str, text: &str) -> RawDocument {
    RawDocument::from_text(
        DocumentMetadata {
            tenant_id: "tenant-a".into(),
            document_id: None,
            title: title.into(),
            language: Some("en".into()),
            source_url: None,
        },
        text,
    )
}

/// A hedged claim alone must not become a traversable relation; an
/// explicit second witness promotes the pair to MIXED at STRICT.
#[tokio::test]
async fn discursive_only_claims_wait_for_explicit_support() {
    let services = PipelineServices::in_memory();
    let pipeline = IngestPipeline::new(services.clone(), StrataConfig::default());

    let hedged = "# Overview\n\nAtlas Gateway seems to require Zephyr Queue in larger fleets. \
Atlas Gateway is the entry point for tenants. Zephyr Queue absorbs bursts for every region.\n";
    let report = pipeline
        .ingest_document(raw("Field Notes", hedged))
        .await
        .expect("first ingest succeeds");
    assert_eq!(
        report.relations_promoted, 0,
        "a single hedged claim must not promote"
    );
    // The aggregate exists, waiting for corroboration.
    assert_eq!(
        services
            .graph
            .nodes_with_label("CanonicalRelation", "tenant-a")
            .unwrap()
            .len(),
        1
    );
    assert!(services
        .graph
        .edges_of_type("REQUIRES")
        .unwrap()
        .is_empty());

    let explicit = "# Deployment\n\nAtlas Gateway must use Zephyr Queue for buffering. \
Atlas Gateway fronts all tenant traffic. Zephyr Queue stores bursts durably.\n";
    let report = pipeline
        .ingest_document(raw("Deployment Guide", explicit))
        .await
        .expect("second ingest succeeds");
    assert!(report.relations_promoted >= 1, "explicit witness promotes");

    let edges = services.graph.edges_of_type("REQUIRES").unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].props["semantic_grade"], serde_json::json!("MIXED"));
    assert_eq!(edges[0].props["defensibility_tier"], serde_json::json!("STRICT"));
}

/// A navigation edge between two concepts fails the lint and degrades
/// the job instead of releasing a polluted graph.
#[tokio::test]
async fn injected_navigation_leak_degrades_the_job() {
    let services = PipelineServices::in_memory();
    let config = StrataConfig::default();
    let pipeline = IngestPipeline::new(services.clone(), config);

    let text = "# Platform\n\nAtlas Gateway requires Zephyr Queue for burst buffering under load. \
Atlas Gateway terminates TLS. Zephyr Queue replays events nightly.\n";
    pipeline
        .ingest_document(raw("Platform Guide", text))
        .await
        .expect("clean ingest");
    assert!(validate_graph(services.graph.as_ref(), "tenant-a").unwrap().success);

    // Inject the forbidden edge directly, as a buggy writer would.
    let concepts = services
        .graph
        .nodes_with_label("CanonicalConcept", "tenant-a")
        .unwrap();
    assert!(concepts.len() >= 2);
    services
        .graph
        .merge_edge(&concepts[0].key, "CO_OCCURS", &concepts[1].key, Map::new(), &[])
        .unwrap();

    let lint = validate_graph(services.graph.as_ref(), "tenant-a").unwrap();
    assert!(!lint.success);
    assert_eq!(lint.violations[0].rule_id.code(), "NAV-001");

    // A subsequent ingest of new content reports the degraded graph.
    let tracker = JobTracker::new();
    let job_id = tracker
        .run_ingest(
            &pipeline,
            raw(
                "Second Guide",
                "# More\n\nAtlas Gateway routes requests. Atlas Gateway shapes traffic too.\n",
            ),
        )
        .await;
    let job = tracker.get(&job_id).expect("job recorded");
    assert_eq!(job.status, JobStatus::Degraded);
    assert!(!job.report.unwrap().lint.success);
}

/// Concept types sighted during extraction enter the registry as
/// pending and only admins move them on.
#[tokio::test]
async fn concept_types_are_governed_by_the_registry() {
    let services = PipelineServices::in_memory();
    let pipeline = IngestPipeline::new(services.clone(), StrataConfig::default());

    pipeline
        .ingest_document(raw(
            "Platform Guide",
            "# Platform\n\nAtlas Gateway requires Zephyr Queue for burst buffering. \
Atlas Gateway terminates TLS. Zephyr Queue replays events.\n",
        ))
        .await
        .expect("ingest succeeds");

    let registry = services.registry_for("tenant-a");
    let pending = registry.list(Some(EntityTypeStatus::Pending));
    assert!(
        pending.iter().any(|row| row.type_name == "TERM"),
        "sighted type is pending: {pending:?}"
    );

    registry.approve("TERM", "admin").unwrap();
    assert_eq!(
        registry.get("TERM").unwrap().status,
        EntityTypeStatus::Approved
    );
}
