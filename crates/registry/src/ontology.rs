//! Ontology proposals.
//!
//! Given a sample of extracted concept names, ask the LLM which registry
//! types they suggest. Proposals come back UPPERCASE and validated;
//! anything else is dropped, not fixed up.

use serde::Deserialize;
use tracing::info;

use clients::{ChatMessage, LlmClient, LlmOptions, TaskType};
use model::validate::validate_entity_type_name;

#[derive(Debug, Deserialize)]
struct ProposalResponse {
    #[serde(default)]
    types: Vec<Proposal>,
}

#[derive(Debug, Deserialize)]
struct Proposal {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

/// Propose entity types for a sample of concept names. Returns
/// `(name, description)` pairs that pass validation.
pub async fn propose_entity_types(
    llm: &dyn LlmClient,
    concept_names: &[String],
) -> Vec<(String, Option<String>)> {
    if concept_names.is_empty() {
        return Vec::new();
    }
    let sample: Vec<&str> = concept_names.iter().take(50).map(String::as_str).collect();
    let user = format!(
        "Propose registry entity types for these extracted concepts:\n- {}\n\n\
         Answer with JSON: {{\"types\": [{{\"name\": \"UPPERCASE_NAME\", \"description\": str}}]}}.\n\
         Type names are UPPERCASE with underscores and describe a category, not an instance.",
        sample.join("\n- "),
    );
    let messages = [
        ChatMessage::system("You design small, reviewable ontologies for enterprise knowledge bases."),
        ChatMessage::user(user),
    ];
    let options = LlmOptions {
        temperature: 0.2,
        max_tokens: 800,
        response_format: Some("json".into()),
    };

    let Ok(body) = llm
        .complete(TaskType::OntologyProposal, &messages, &options)
        .await
    else {
        return Vec::new();
    };
    let Ok(parsed) = serde_json::from_str::<ProposalResponse>(body.trim()) else {
        return Vec::new();
    };

    let proposals: Vec<(String, Option<String>)> = parsed
        .types
        .into_iter()
        .filter(|p| validate_entity_type_name(&p.name).is_ok())
        .map(|p| (p.name, p.description))
        .collect();
    info!(proposed = proposals.len(), "ontology_proposals");
    proposals
}
