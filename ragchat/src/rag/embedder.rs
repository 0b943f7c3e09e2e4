//! Text embedding backends.
//!
//! `FastEmbedder` runs all-MiniLM-L6-v2 locally through fastembed on the
//! blocking pool. `HashingEmbedder` is a deterministic bag-of-words feature
//! hasher that needs no model download, used offline and in tests.

use crate::error::ChatError;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Embedding dimension of all-MiniLM-L6-v2
pub const MINILM_EMBEDDING_DIM: usize = 384;

/// Default dimension of the hashing embedder
pub const HASHING_EMBEDDING_DIM: usize = 256;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier mixed into cache keys so vectors from different models never collide
    fn model_name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Embed a batch, returning one vector per input in the same order
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ChatError>;
}

pub struct FastEmbedder {
    model: Arc<TextEmbedding>,
}

impl FastEmbedder {
    /// Load the local embedding model (downloads on first use)
    pub async fn load() -> Result<Self, ChatError> {
        tracing::info!("Initializing local embedding model (all-MiniLM-L6-v2)...");
        let model = tokio::task::spawn_blocking(|| {
            let mut options = InitOptions::default();
            options.model_name = EmbeddingModel::AllMiniLML6V2;
            options.show_download_progress = true;
            TextEmbedding::try_new(options)
        })
        .await
        .map_err(|e| ChatError::embedding(format!("Embedding model initialization task panicked: {}", e)))?
        .map_err(|e| ChatError::embedding(format!("Failed to load embedding model: {}", e)))?;
        tracing::info!("Embedding model loaded successfully");
        Ok(Self {
            model: Arc::new(model),
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    fn model_name(&self) -> &str {
        "all-MiniLM-L6-v2"
    }

    fn dimension(&self) -> usize {
        MINILM_EMBEDDING_DIM
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ChatError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let count = texts.len();
        let vectors = tokio::task::spawn_blocking(move || model.embed(texts, None))
            .await
            .map_err(|e| ChatError::embedding(format!("Embedding task panicked: {}", e)))?
            .map_err(|e| ChatError::embedding(format!("Embedding generation failed: {}", e)))?;
        if vectors.len() != count {
            return Err(ChatError::embedding(format!(
                "Expected {} embeddings, got {}",
                count,
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

/// Signed feature hashing over lowercase word tokens, L2-normalised
pub struct HashingEmbedder {
    dimension: usize,
    name: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            name: format!("hashing-{}", dimension),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimension;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(HASHING_EMBEDDING_DIM)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ChatError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic_and_normalised() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed(vec!["The sky is blue".to_string()]).await.unwrap();
        let b = embedder.embed(vec!["the SKY is blue".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), HASHING_EMBEDDING_DIM);
        let norm: f32 = a[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_embedder_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert_eq!(embedder.embed_text("  ... "), vec![0.0; 8]);
        assert_eq!(embedder.model_name(), "hashing-8");
    }
}
