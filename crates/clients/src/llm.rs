//! The chat-LLM boundary.
//!
//! Every extractor that consults a language model goes through
//! [`LlmClient`]. Calls are tagged with a [`TaskType`] so deployments can
//! route heavy synthesis and cheap classification to different models;
//! this crate only carries the tag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::ClientError;

/// What the call is for. Gates which model a deployment routes to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TaskType {
    DocumentAnalysis,
    ConceptExtraction,
    AssertionExtraction,
    PointerExtraction,
    RelationExtraction,
    CorefArbitration,
    LongTextSummary,
    OntologyProposal,
}

/// Message author role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Sampling and shaping options for one completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    /// "json" requests a machine-parseable body; providers that cannot
    /// honor it still answer and the caller validates.
    pub response_format: Option<String>,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2000,
            response_format: None,
        }
    }
}

/// Pluggable chat-LLM provider. Implementations must be thread-safe; the
/// pipeline shares one client across its worker pool.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        task: TaskType,
        messages: &[ChatMessage],
        options: &LlmOptions,
    ) -> Result<String, ClientError>;
}

/// Deterministic in-process LLM used by tests and demos.
///
/// Responses are scripted per task type and consumed in order; when a
/// script runs dry the last response repeats. With no script for a task
/// the client answers with an empty JSON object, which extractors treat
/// as "nothing found".
#[derive(Default)]
pub struct ScriptedLlm {
    scripts: Mutex<HashMap<TaskType, Vec<String>>>,
    cursor: Mutex<HashMap<TaskType, usize>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue responses for a task type, replayed in order.
    pub fn script(self, task: TaskType, responses: Vec<String>) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(task, responses);
        self
    }

    pub fn push_response(&self, task: TaskType, response: impl Into<String>) {
        self.scripts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(task)
            .or_default()
            .push(response.into());
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(
        &self,
        task: TaskType,
        _messages: &[ChatMessage],
        _options: &LlmOptions,
    ) -> Result<String, ClientError> {
        let scripts = self.scripts.lock().unwrap_or_else(|p| p.into_inner());
        let Some(responses) = scripts.get(&task) else {
            return Ok("{}".to_string());
        };
        if responses.is_empty() {
            return Ok("{}".to_string());
        }
        let mut cursors = self.cursor.lock().unwrap_or_else(|p| p.into_inner());
        let idx = cursors.entry(task).or_insert(0);
        let response = responses[(*idx).min(responses.len() - 1)].clone();
        *idx += 1;
        Ok(response)
    }
}
