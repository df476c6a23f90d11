//! Reranking boundary.
//!
//! Production deployments put a cross-encoder here; the in-tree
//! implementation scores lexical overlap, which is deterministic and
//! good enough to order test corpora sensibly.

use crate::retriever::RetrievedChunk;

/// Rerank retrieved chunks against the query, filling `rerank_score`
/// and reordering best-first.
pub trait Reranker: Send + Sync {
    fn rerank(&self, query: &str, chunks: &mut Vec<RetrievedChunk>);
}

/// Token-overlap reranker. Scores are centered so the sigmoid transform
/// in the confidence computation behaves like a cross-encoder's output.
#[derive(Debug, Default)]
pub struct LexicalReranker;

impl LexicalReranker {
    fn overlap(query: &str, text: &str) -> f64 {
        let query_tokens: Vec<String> = tokenize(query);
        if query_tokens.is_empty() {
            return 0.0;
        }
        let text_tokens: Vec<String> = tokenize(text);
        let hits = query_tokens
            .iter()
            .filter(|t| text_tokens.contains(t))
            .count();
        hits as f64 / query_tokens.len() as f64
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(String::from)
        .collect()
}

impl Reranker for LexicalReranker {
    fn rerank(&self, query: &str, chunks: &mut Vec<RetrievedChunk>) {
        for chunk in chunks.iter_mut() {
            // Map overlap [0,1] onto a cross-encoder-like range [-2,2].
            chunk.rerank_score = Self::overlap(query, &chunk.text) * 4.0 - 2.0;
        }
        chunks.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            text: text.into(),
            document_id: "doc_1".into(),
            document_name: "Guide".into(),
            context_id: None,
            section_path: None,
            slide_index: None,
            score: 0.8,
            rerank_score: 0.0,
        }
    }

    #[test]
    fn overlapping_chunks_rank_first() {
        let reranker = LexicalReranker;
        let mut chunks = vec![
            chunk("totally unrelated content about lunch menus"),
            chunk("the gateway requires TLS encryption for traffic"),
        ];
        reranker.rerank("does the gateway require TLS encryption", &mut chunks);
        assert!(chunks[0].text.contains("gateway"));
        assert!(chunks[0].rerank_score > chunks[1].rerank_score);
    }
}
