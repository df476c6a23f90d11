//! The embedding-model boundary.
//!
//! Vectors are L2-normalized on the way out so cosine similarity is a
//! plain dot product everywhere downstream.

use async_trait::async_trait;

use crate::ClientError;

/// Pluggable embedding provider.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a batch of texts into normalized vectors of [`Self::dimension`].
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ClientError>;

    fn dimension(&self) -> usize;
}

/// Cosine similarity of two vectors; 0.0 when either is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

/// Deterministic bag-of-tokens embedder for tests and demos.
///
/// Each lowercase token hashes into one bucket of the vector, so texts
/// sharing vocabulary land near each other under cosine similarity,
/// enough signal for concept linking and seed extraction in tests, with
/// zero model cost.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn fnv1a(token: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x100_0000_01b3);
        }
        hash
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 1)
        {
            let bucket = (Self::fnv1a(token) % self.dim as u64) as usize;
            v[bucket] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ClientError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeddings_are_deterministic_and_normalized() {
        let embedder = HashEmbedder::default();
        let vectors = embedder
            .embed(&["TLS encryption required".into(), "TLS encryption required".into()])
            .await
            .unwrap();
        assert_eq!(vectors[0], vectors[1]);
        let norm: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher() {
        let embedder = HashEmbedder::default();
        let vectors = embedder
            .embed(&[
                "database encryption at rest".into(),
                "encryption of the database".into(),
                "quarterly revenue forecast".into(),
            ])
            .await
            .unwrap();
        let close = cosine_similarity(&vectors[0], &vectors[1]);
        let far = cosine_similarity(&vectors[0], &vectors[2]);
        assert!(close > far, "close={close} far={far}");
    }

    #[test]
    fn cosine_handles_degenerate_input() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
