//! Plan-filtered retrieval.
//!
//! Applies the tenant filter, the plan's context-id filter when present,
//! and the default exclusion of question-bank payloads; then reranks and
//! keeps hits above the score floor.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use clients::EmbeddingClient;

use crate::config::RetrieveConfig;
use crate::rerank::Reranker;
use crate::vector::{Filter, FilterCondition, VectorStore};
use crate::RetrieveError;

/// One retrieved chunk with both scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub document_id: String,
    pub document_name: String,
    pub context_id: Option<String>,
    pub section_path: Option<String>,
    pub slide_index: Option<u32>,
    /// Vector similarity score.
    pub score: f64,
    /// Reranker score, filled after reranking.
    pub rerank_score: f64,
}

/// Retriever bound to its store, embedder and reranker.
pub struct Retriever<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn EmbeddingClient,
    reranker: &'a dyn Reranker,
    config: RetrieveConfig,
}

impl<'a> Retriever<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        embedder: &'a dyn EmbeddingClient,
        reranker: &'a dyn Reranker,
        config: RetrieveConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            config,
        }
    }

    /// Run the filtered search for one query.
    pub async fn retrieve(
        &self,
        tenant_id: &str,
        query: &str,
        context_ids: &[String],
    ) -> Result<Vec<RetrievedChunk>, RetrieveError> {
        let vectors = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| RetrieveError::Embedding(e.to_string()))?;
        let query_vector = vectors
            .first()
            .ok_or_else(|| RetrieveError::Embedding("embedder returned no vector".into()))?;

        let mut filter = Filter {
            must: vec![FilterCondition::MatchValue {
                key: "tenant_id".into(),
                value: json!(tenant_id),
            }],
            must_not: vec![FilterCondition::MatchValue {
                key: "type".into(),
                value: json!("rfp_qa"),
            }],
        };
        if !context_ids.is_empty() {
            filter.must.push(FilterCondition::MatchAny {
                key: "context_id".into(),
                values: context_ids.iter().map(|id| json!(id)).collect(),
            });
        }

        let hits = self.store.search(
            &self.config.collection,
            query_vector,
            &filter,
            self.config.top_k,
        )?;
        let mut chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter(|hit| f64::from(hit.score) >= self.config.score_floor)
            .map(|hit| {
                let payload = &hit.payload;
                let get = |key: &str| {
                    payload
                        .get(key)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                RetrievedChunk {
                    text: get("text"),
                    document_id: get("document_id"),
                    document_name: get("document_name"),
                    context_id: payload
                        .get("context_id")
                        .and_then(Value::as_str)
                        .map(String::from),
                    section_path: payload
                        .get("section_path")
                        .and_then(Value::as_str)
                        .map(String::from),
                    slide_index: payload
                        .get("slide_index")
                        .and_then(Value::as_u64)
                        .map(|v| v as u32),
                    score: f64::from(hit.score),
                    rerank_score: 0.0,
                }
            })
            .collect();

        self.reranker.rerank(query, &mut chunks);
        info!(
            tenant_id,
            hits = chunks.len(),
            filtered_contexts = context_ids.len(),
            "retrieval_complete"
        );
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rerank::LexicalReranker;
    use crate::vector::{InMemoryVectorStore, VectorPoint};
    use clients::HashEmbedder;
    use serde_json::Map;

    async fn seed(store: &InMemoryVectorStore, embedder: &HashEmbedder) {
        let texts = [
            ("p1", "the gateway requires TLS encryption for all traffic", "sec:d1:a", "chunk"),
            ("p2", "quarterly menu planning for the cafeteria", "sec:d1:b", "chunk"),
            ("p3", "the gateway requires TLS encryption for all traffic", "sec:d1:a", "rfp_qa"),
        ];
        let vectors = embedder
            .embed(&texts.iter().map(|(_, t, _, _)| (*t).to_string()).collect::<Vec<_>>())
            .await
            .unwrap();
        let points = texts
            .iter()
            .zip(vectors)
            .map(|((id, text, ctx, kind), vector)| {
                let mut payload = Map::new();
                payload.insert("tenant_id".into(), json!("t1"));
                payload.insert("document_id".into(), json!("doc_1"));
                payload.insert("document_name".into(), json!("Guide"));
                payload.insert("context_id".into(), json!(ctx));
                payload.insert("text".into(), json!(text));
                payload.insert("type".into(), json!(kind));
                VectorPoint {
                    id: (*id).into(),
                    vector,
                    payload,
                }
            })
            .collect();
        store.upsert("knowbase", points).unwrap();
    }

    #[tokio::test]
    async fn tenant_and_type_filters_apply() {
        let store = InMemoryVectorStore::new();
        let embedder = HashEmbedder::default();
        seed(&store, &embedder).await;
        let reranker = LexicalReranker;
        let retriever = Retriever::new(&store, &embedder, &reranker, RetrieveConfig::default());

        let chunks = retriever
            .retrieve("t1", "gateway TLS encryption traffic requires all the for", &[])
            .await
            .unwrap();
        // The rfp_qa twin is excluded even though it matches perfectly.
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
        assert_eq!(
            chunks
                .iter()
                .filter(|c| c.text.contains("gateway"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn context_filter_restricts_results() {
        let store = InMemoryVectorStore::new();
        let embedder = HashEmbedder::default();
        seed(&store, &embedder).await;
        let reranker = LexicalReranker;
        let retriever = Retriever::new(&store, &embedder, &reranker, RetrieveConfig::default());

        let chunks = retriever
            .retrieve(
                "t1",
                "gateway TLS encryption traffic requires all the for",
                &["sec:d1:b".to_string()],
            )
            .await
            .unwrap();
        assert!(chunks.iter().all(|c| c.context_id.as_deref() == Some("sec:d1:b")));
    }
}
