use crate::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// External embedding provider. Deterministic for identical input and
/// expected to return L2-normalized vectors (the backend scores with
/// cosine similarity). Shared read-only across concurrent callers.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;
}

pub fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left
        .iter()
        .zip(right.iter())
        .map(|(a, b)| a * b)
        .sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}

/// Hashed character-trigram embedder. Deterministic and dependency-free;
/// used for tests and offline runs where no embedding sidecar is up.
#[derive(Debug, Clone, Copy)]
pub struct HashedNgramEmbedder {
    pub dimensions: usize,
}

impl Default for HashedNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

#[async_trait]
impl Embedder for HashedNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return Ok(vector);
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }
}

#[derive(Debug, Deserialize)]
struct RemoteEmbedResponse {
    embedding: Vec<f32>,
}

/// Embedding sidecar client. Sends `{"text": ...}` and expects
/// `{"embedding": [...]}` back.
pub struct RemoteEmbedder {
    client: Client,
    endpoint: String,
    dimensions: usize,
}

impl RemoteEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|error| ModelError::Unavailable {
                model: "embedder".to_string(),
                details: error.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ModelError::Unavailable {
                model: "embedder".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: RemoteEmbedResponse = response.json().await?;
        if payload.embedding.len() != self.dimensions {
            return Err(ModelError::InvalidResponse {
                model: "embedder".to_string(),
                details: format!(
                    "embedding dimension {} is not {}",
                    payload.embedding.len(),
                    self.dimensions
                ),
            });
        }

        let mut vector = payload.embedding;
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::{cosine_similarity, Embedder, HashedNgramEmbedder};

    #[tokio::test]
    async fn embedder_is_deterministic() {
        let embedder = HashedNgramEmbedder::default();
        let first = embedder.embed("धर्मक्षेत्रे कुरुक्षेत्रे").await.expect("embed");
        let second = embedder.embed("धर्मक्षेत्रे कुरुक्षेत्रे").await.expect("embed");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn embedder_output_is_normalized() {
        let embedder = HashedNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("सत्यमेव जयते").await.expect("embed");
        assert_eq!(vector.len(), 32);
        let magnitude = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.2f32, 0.5, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
