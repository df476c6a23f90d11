//! Demo binary: ingest a small document with the in-memory services and
//! answer one question against it.

use std::error::Error;
use std::sync::Arc;

use clients::{ScriptedLlm, TaskType};
use ingest::{DocumentMetadata, RawDocument};
use strata::{IngestPipeline, PipelineServices, SearchRequest, SearchService, StrataConfig};

const SAMPLE: &str = "# Platform\n\nAtlas Gateway requires Zephyr Queue for burst buffering under load. \
Atlas Gateway must use TLS 1.2 for all external traffic.\n\n\
# Limits\n\n| Upload size | 10 GB |\nRetention: 30 days\n";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let llm = ScriptedLlm::new().script(
        TaskType::LongTextSummary,
        vec![
            "Yes. Atlas Gateway requires Zephyr Queue for burst buffering. \
             (Source: Platform Guide, Section Platform)"
                .into(),
        ],
    );
    let services = PipelineServices::with_llm(Arc::new(llm));
    let config = StrataConfig::default();
    let pipeline = IngestPipeline::new(services.clone(), config.clone());

    let report = pipeline
        .ingest_document(RawDocument::from_text(
            DocumentMetadata {
                tenant_id: "demo".into(),
                document_id: None,
                title: "Platform Guide".into(),
                language: Some("en".into()),
                source_url: None,
            },
            SAMPLE,
        ))
        .await?;

    println!(
        "ingested {}: {} chunks, {} concepts, {} promoted relations, lint ok: {}",
        report.document_id,
        report.chunks_inserted,
        report.concepts,
        report.relations_promoted,
        report.lint.success,
    );

    let search = SearchService::new(services, config);
    let response = search
        .search("demo", &SearchRequest::question("Does Atlas Gateway require Zephyr Queue?"))
        .await?;

    println!("mode: {:?}, confidence: {:.2}", response.mode, response.confidence);
    println!("{}", response.synthesized_answer);
    Ok(())
}
