//! LLM arbitration for named pairs in the review band.
//!
//! The arbiter asks the model whether two surfaces denote the same
//! entity, given a little local context. Abstention keeps the link, the
//! conservative default, and every answer is cached by lowercased
//! surface pair so repeated corpora never pay twice.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use clients::{CacheConfig, ChatMessage, ClientError, LlmClient, LlmOptions, TaskType, TtlCache};

/// One pair submitted for arbitration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArbiterPair {
    pub surface_a: String,
    pub surface_b: String,
    pub context_a: String,
    pub context_b: String,
}

/// The arbiter's verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArbiterDecision {
    pub same_entity: bool,
    pub confidence: f64,
    pub reason: String,
    #[serde(default)]
    pub abstain: bool,
}

impl ArbiterDecision {
    fn abstained(reason: impl Into<String>) -> Self {
        Self {
            same_entity: true,
            confidence: 0.0,
            reason: reason.into(),
            abstain: true,
        }
    }
}

fn cache_key(surface_a: &str, surface_b: &str) -> (String, String) {
    let a = surface_a.to_lowercase();
    let b = surface_b.to_lowercase();
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// LLM-backed arbiter with a per-process decision cache.
pub struct CorefArbiter<'a> {
    llm: &'a dyn LlmClient,
    cache: TtlCache<(String, String), ArbiterDecision>,
    domain_context: Option<String>,
}

impl<'a> CorefArbiter<'a> {
    pub fn new(llm: &'a dyn LlmClient, domain_context: Option<String>) -> Self {
        Self {
            llm,
            cache: TtlCache::new(CacheConfig::default()),
            domain_context,
        }
    }

    /// Arbitrate a batch of pairs, consulting the cache first.
    pub async fn arbitrate(&self, pairs: &[ArbiterPair]) -> Vec<ArbiterDecision> {
        let mut decisions = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let key = cache_key(&pair.surface_a, &pair.surface_b);
            if let Some(hit) = self.cache.get(&key) {
                debug!(a = %pair.surface_a, b = %pair.surface_b, "arbiter_cache_hit");
                decisions.push(hit);
                continue;
            }
            let decision = match self.ask(pair).await {
                Ok(d) => d,
                Err(err) => {
                    warn!(error = %err, a = %pair.surface_a, b = %pair.surface_b, "arbiter_failed");
                    ArbiterDecision::abstained(format!("arbiter unavailable: {err}"))
                }
            };
            self.cache.put(key, decision.clone());
            decisions.push(decision);
        }
        decisions
    }

    async fn ask(&self, pair: &ArbiterPair) -> Result<ArbiterDecision, ClientError> {
        let domain = self
            .domain_context
            .as_deref()
            .map(|d| format!("Domain context: {d}\n"))
            .unwrap_or_default();
        let user = format!(
            "{domain}Do these two surface forms denote the same entity?\n\
             A: \"{}\"\n   context: …{}…\n\
             B: \"{}\"\n   context: …{}…\n\
             Answer with JSON: {{\"same_entity\": bool, \"confidence\": 0..1, \"reason\": str, \"abstain\": bool}}.\n\
             Set abstain=true if the contexts are insufficient to decide.",
            pair.surface_a, pair.context_a, pair.surface_b, pair.context_b,
        );
        let messages = [
            ChatMessage::system(
                "You validate coreference links between named mentions. \
                 Be conservative: distinct products, versions or editions are distinct entities.",
            ),
            ChatMessage::user(user),
        ];
        let options = LlmOptions {
            temperature: 0.0,
            max_tokens: 300,
            response_format: Some("json".into()),
        };
        let body = self
            .llm
            .complete(TaskType::CorefArbitration, &messages, &options)
            .await?;

        match serde_json::from_str::<ArbiterDecision>(strip_fences(&body)) {
            Ok(decision) => Ok(decision),
            Err(err) => Ok(ArbiterDecision::abstained(format!(
                "unparseable arbiter response: {err}"
            ))),
        }
    }
}

fn strip_fences(body: &str) -> &str {
    let trimmed = body.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
