//! Vector index over document chunks.
//!
//! A `DocumentIndex` is immutable once built. Rebuilding produces a new index
//! that callers swap in wholesale behind an `Arc`.

use super::cache_manager::EmbeddingCache;
use super::embedder::Embedder;
use crate::error::ChatError;
use crate::protocol::{DocumentChunk, IndexReport, ScoredChunk};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Chunks per embedding call
pub const EMBEDDING_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct DocumentIndex {
    chunks: Vec<DocumentChunk>,
    vectors: Vec<Vec<f32>>,
    dimension: usize,
}

impl DocumentIndex {
    pub fn new(chunks: Vec<DocumentChunk>, vectors: Vec<Vec<f32>>) -> Result<Self, ChatError> {
        if chunks.len() != vectors.len() {
            return Err(ChatError::embedding(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        if let Some(bad) = vectors.iter().position(|v| v.len() != dimension) {
            return Err(ChatError::embedding(format!(
                "vector {} has dimension {}, expected {}",
                bad,
                vectors[bad].len(),
                dimension
            )));
        }
        Ok(Self {
            chunks,
            vectors,
            dimension,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    /// Top-k chunks by cosine similarity, descending; ties keep chunk order.
    pub fn query(&self, vector: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(vector, v)))
            .collect();
        // sort_by is stable, so equal scores stay in insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
            .into_iter()
            .take(k)
            .map(|(position, score)| ScoredChunk {
                chunk: self.chunks[position].clone(),
                score,
                position,
            })
            .collect()
    }
}

/// Cosine similarity; zero vectors and mismatched lengths score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Embeds chunks (through the cache) and builds indexes
#[derive(Clone)]
pub struct IndexService {
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    concurrency: usize,
}

impl IndexService {
    pub fn new(embedder: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>, concurrency: usize) -> Self {
        Self {
            embedder,
            cache,
            concurrency: concurrency.max(1),
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        self.embedder
            .embed(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::embedding("No embedding returned"))
    }

    /// Embed every chunk and assemble a new index in chunk order.
    pub async fn build_index(
        &self,
        chunks: Vec<DocumentChunk>,
    ) -> Result<(DocumentIndex, IndexReport), ChatError> {
        let started = Instant::now();
        let keys: Vec<String> = chunks.iter().map(|c| self.cache.key_for(&c.text)).collect();
        let cached = self.cache.get_many(&keys).await;

        // First position of each distinct uncached key; repeats reuse its vector
        let mut seen = HashSet::new();
        let missing: Vec<usize> = (0..chunks.len())
            .filter(|&i| !cached.contains_key(&keys[i]) && seen.insert(keys[i].as_str()))
            .collect();
        let cache_hits = keys.iter().filter(|k| cached.contains_key(*k)).count();
        tracing::info!(
            chunks = chunks.len(),
            cache_hits,
            to_embed = missing.len(),
            model = self.embedder.model_name(),
            "Building document index"
        );

        // Batches run concurrently; buffered() yields them back in order
        let embedded: Vec<(Vec<usize>, Vec<Vec<f32>>)> = stream::iter(
            missing
                .chunks(EMBEDDING_BATCH_SIZE)
                .map(|batch| batch.to_vec())
                .collect::<Vec<_>>(),
        )
        .map(|batch| {
            let embedder = Arc::clone(&self.embedder);
            let texts: Vec<String> = batch.iter().map(|&i| chunks[i].text.clone()).collect();
            async move {
                let vectors = embedder.embed(texts).await?;
                if vectors.len() != batch.len() {
                    return Err(ChatError::embedding(format!(
                        "Expected {} embeddings, got {}",
                        batch.len(),
                        vectors.len()
                    )));
                }
                Ok::<_, ChatError>((batch, vectors))
            }
        })
        .buffered(self.concurrency)
        .try_collect()
        .await?;

        let mut fresh: HashMap<String, Vec<f32>> = HashMap::with_capacity(missing.len());
        for (batch, batch_vectors) in embedded {
            for (i, vector) in batch.into_iter().zip(batch_vectors) {
                fresh.insert(keys[i].clone(), vector);
            }
        }
        let vectors: Vec<Option<Vec<f32>>> = keys
            .iter()
            .map(|k| cached.get(k).or_else(|| fresh.get(k)).cloned())
            .collect();
        self.cache.put_many(fresh.into_iter().collect()).await;

        let vectors = vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.ok_or_else(|| ChatError::embedding(format!("chunk {} was not embedded", i))))
            .collect::<Result<Vec<_>, _>>()?;

        let documents_processed = {
            let mut ids: Vec<&str> = chunks.iter().map(|c| c.source_id.as_str()).collect();
            ids.dedup();
            ids.len()
        };
        let index = DocumentIndex::new(chunks, vectors)?;
        let report = IndexReport {
            total_chunks: index.len(),
            documents_processed,
            cache_hits,
            skipped: Vec::new(),
        };
        tracing::info!(
            total_chunks = report.total_chunks,
            cache_hits = report.cache_hits,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Document index built"
        );
        Ok((index, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::embedder::HashingEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunk(text: &str, source: &str) -> DocumentChunk {
        DocumentChunk {
            text: text.to_string(),
            source_id: source.to_string(),
            offset: 0,
        }
    }

    /// Counts how many texts reach the embedder
    struct CountingEmbedder {
        inner: HashingEmbedder,
        embedded: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ChatError> {
            self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed(texts).await
        }
    }

    fn service_with(embedder: Arc<dyn Embedder>) -> IndexService {
        let cache = Arc::new(EmbeddingCache::in_memory(embedder.model_name(), embedder.dimension(), 100));
        IndexService::new(embedder, cache, 4)
    }

    #[tokio::test]
    async fn test_single_chunk_corpus_returns_that_chunk() {
        let service = service_with(Arc::new(HashingEmbedder::default()));
        let (index, report) = service
            .build_index(vec![chunk("The sky is blue.", "sky.txt")])
            .await
            .unwrap();
        assert_eq!(report.total_chunks, 1);
        let query = service.embed_query("completely unrelated words").await.unwrap();
        let results = index.query(&query, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "The sky is blue.");
    }

    #[tokio::test]
    async fn test_index_preserves_chunk_order_across_batches() {
        let service = service_with(Arc::new(HashingEmbedder::default()));
        let chunks: Vec<DocumentChunk> = (0..100)
            .map(|i| chunk(&format!("chunk number {}", i), "many.txt"))
            .collect();
        let (index, _) = service.build_index(chunks.clone()).await.unwrap();
        assert_eq!(index.chunks(), chunks.as_slice());
        assert_eq!(index.dimension(), service.embedder().dimension());
    }

    #[tokio::test]
    async fn test_rebuild_uses_cache() {
        let embedder = Arc::new(CountingEmbedder {
            inner: HashingEmbedder::default(),
            embedded: AtomicUsize::new(0),
        });
        let service = service_with(embedder.clone());
        let chunks = vec![chunk("alpha", "a"), chunk("beta", "b")];
        service.build_index(chunks.clone()).await.unwrap();
        let (_, report) = service.build_index(chunks).await.unwrap();
        assert_eq!(report.cache_hits, 2);
        assert_eq!(embedder.embedded.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_chunk_text_is_embedded_once() {
        let embedder = Arc::new(CountingEmbedder {
            inner: HashingEmbedder::default(),
            embedded: AtomicUsize::new(0),
        });
        let service = service_with(embedder.clone());
        let chunks = vec![
            chunk("boilerplate footer", "a.pdf#page=1"),
            chunk("unique body", "a.pdf#page=1"),
            chunk("boilerplate footer", "a.pdf#page=2"),
        ];
        let (index, report) = service.build_index(chunks).await.unwrap();
        assert_eq!(embedder.embedded.load(Ordering::SeqCst), 2);
        assert_eq!(report.total_chunks, 3);
        assert_eq!(report.cache_hits, 0);

        let query = service.embed_query("boilerplate footer").await.unwrap();
        let results = index.query(&query, 3);
        assert_eq!(results[0].position, 0);
        assert_eq!(results[1].position, 2);
        assert!((results[0].score - results[1].score).abs() < 1e-6);
    }

    #[test]
    fn test_query_ties_keep_insertion_order() {
        let index = DocumentIndex::new(
            vec![chunk("first", "a"), chunk("second", "b"), chunk("third", "c")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]],
        )
        .unwrap();
        let results = index.query(&[1.0, 0.0], 3);
        let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "third", "second"]);
        assert_eq!(results[0].position, 0);
        assert_eq!(results[1].position, 2);
    }

    #[test]
    fn test_query_returns_fewer_when_index_is_small() {
        let index = DocumentIndex::new(vec![chunk("only", "a")], vec![vec![1.0]]).unwrap();
        assert_eq!(index.query(&[1.0], 5).len(), 1);
    }

    #[test]
    fn test_mismatched_vectors_are_rejected() {
        assert!(DocumentIndex::new(vec![chunk("a", "a")], vec![]).is_err());
        assert!(DocumentIndex::new(
            vec![chunk("a", "a"), chunk("b", "b")],
            vec![vec![1.0, 0.0], vec![1.0]]
        )
        .is_err());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
