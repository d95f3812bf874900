//! Deterministic local embedding provider
//!
//! Feature-hashing embedder used as the free fallback tier: each word of
//! the input is hashed into a bucket of the output vector with a hash-derived
//! sign, and the accumulated vector is L2-normalized. Two texts sharing
//! vocabulary land near each other, which is enough signal to keep retrieval
//! functional when the remote tier is unreachable or over quota.
//!
//! Properties relied on elsewhere: zero network, zero neuron cost, stable
//! output for a given input across processes.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{Result, SearchError};

use super::provider::{EmbeddingProvider, ProviderKind, ProviderStatus};

/// Deterministic hashed bag-of-words embedder.
pub struct LocalProvider {
    dimension: usize,
}

impl LocalProvider {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(SearchError::InvalidQuery(
                "embedding dimension must be >= 1".into(),
            ));
        }
        Ok(Self { dimension })
    }

    /// Embed one text: hash each token into a signed bucket, normalize.
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimension;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for x in &mut vector {
                *x /= magnitude;
            }
        }
        vector
    }
}

/// Lowercased alphanumeric words, underscores included so identifiers
/// survive as single tokens.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn check_status(&self) -> Result<ProviderStatus> {
        Ok(ProviderStatus::healthy(ProviderKind::Local).with_latency(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> LocalProvider {
        LocalProvider::new(64).unwrap()
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(LocalProvider::new(0).is_err());
    }

    #[tokio::test]
    async fn test_output_shape() {
        let vecs = provider()
            .embed_batch(vec!["hello world".into(), "goodbye".into()])
            .await
            .unwrap();
        assert_eq!(vecs.len(), 2);
        assert!(vecs.iter().all(|v| v.len() == 64));
    }

    #[tokio::test]
    async fn test_deterministic() {
        let p = provider();
        let a = p.embed_batch(vec!["fn login(user)".into()]).await.unwrap();
        let b = p.embed_batch(vec!["fn login(user)".into()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_normalized_output() {
        let vecs = provider()
            .embed_batch(vec!["authentication logic in the login module".into()])
            .await
            .unwrap();
        let magnitude: f32 = vecs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_shared_vocabulary_scores_higher() {
        let p = LocalProvider::new(256).unwrap();
        let vecs = p
            .embed_batch(vec![
                "user login authentication".into(),
                "user login session".into(),
                "matrix multiplication kernel".into(),
            ])
            .await
            .unwrap();

        let sim = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(sim(&vecs[0], &vecs[1]) > sim(&vecs[0], &vecs[2]));
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let vecs = provider().embed_batch(vec!["".into()]).await.unwrap();
        assert!(vecs[0].iter().all(|x| *x == 0.0));
    }
}
