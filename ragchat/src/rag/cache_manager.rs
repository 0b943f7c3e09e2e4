//! Embedding cache.
//!
//! This module handles:
//! - Content-hash keys (SHA-256 over embedder model + chunk text)
//! - An in-memory LRU in front of everything
//! - Optional LanceDB persistence so unchanged documents skip re-embedding
//!   across runs

use crate::error::ChatError;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{ArrowError, DataType, Field, Schema};
use futures::{Stream, StreamExt};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, Table};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// LRU cache capacity for embeddings (~15MB for 384-dim vectors at 10k entries)
pub const EMBEDDING_LRU_CAPACITY: usize = 10_000;

/// Hashes per LanceDB lookup query
const LOOKUP_BATCH: usize = 100;

/// Compute SHA-256 cache key of a chunk for a given embedder model
pub fn compute_content_hash(model_name: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Table name for one embedder model; non-alphanumerics become underscores
pub fn embedding_table_name(model_name: &str) -> String {
    let sanitized: String = model_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("embeddings_{}", sanitized)
}

/// Schema for a persisted embedding table
pub fn get_embedding_cache_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("hash", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension as i32,
            ),
            true,
        ),
    ]))
}

/// Build a `(hash, vector)` record batch for the cache table
pub fn embedding_record_batch(
    entries: &[(String, Vec<f32>)],
    dimension: usize,
) -> Result<RecordBatch, ArrowError> {
    let hash_arr = Arc::new(StringArray::from(
        entries.iter().map(|(h, _)| h.clone()).collect::<Vec<_>>(),
    ));
    let vector_arr = Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
        entries
            .iter()
            .map(|(_, v)| Some(v.iter().copied().map(Some).collect::<Vec<_>>())),
        dimension as i32,
    ));
    RecordBatch::try_new(get_embedding_cache_schema(dimension), vec![hash_arr, vector_arr])
}

/// Drain a lookup stream into `result`, stopping at the first failed batch
async fn collect_cached_vectors<S, E>(stream: &mut S, result: &mut HashMap<String, Vec<f32>>) -> Result<(), E>
where
    S: Stream<Item = Result<RecordBatch, E>> + Unpin,
{
    while let Some(batch) = stream.next().await {
        let batch = batch?;
        let hashes_col = batch
            .column_by_name("hash")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let vectors_col = batch
            .column_by_name("vector")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());
        if let (Some(hashes_arr), Some(vectors_arr)) = (hashes_col, vectors_col) {
            for i in 0..batch.num_rows() {
                let values = vectors_arr.value(i);
                if let Some(vector) = values.as_any().downcast_ref::<Float32Array>() {
                    result.insert(hashes_arr.value(i).to_string(), vector.values().to_vec());
                }
            }
        }
    }
    Ok(())
}

/// LanceDB-backed persistent half of the cache
pub struct LanceEmbeddingStore {
    /// LanceDB connection (kept alive for the table handle)
    #[allow(dead_code)]
    db: Connection,
    table: Table,
    dimension: usize,
}

impl LanceEmbeddingStore {
    pub async fn open(dir: &Path, model_name: &str, dimension: usize) -> Result<Self, ChatError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| ChatError::persistence(format!("Failed to create {}: {}", dir.display(), e)))?;
        let db_path_str = dir.to_string_lossy().to_string();
        let db = connect(&db_path_str).execute().await.map_err(|e| {
            ChatError::persistence(format!("Failed to connect to LanceDB at {}: {}", db_path_str, e))
        })?;
        let table = ensure_lancedb_table_exists(
            &db,
            &embedding_table_name(model_name),
            get_embedding_cache_schema(dimension),
        )
        .await
        .map_err(ChatError::persistence)?;
        Ok(Self { db, table, dimension })
    }

    async fn lookup(&self, hashes: &[String]) -> HashMap<String, Vec<f32>> {
        let mut result = HashMap::new();
        for batch_hashes in hashes.chunks(LOOKUP_BATCH) {
            let filter = batch_hashes
                .iter()
                .map(|h| format!("hash = '{}'", h.replace('\'', "''")))
                .collect::<Vec<_>>()
                .join(" OR ");
            let mut stream = match self.table.query().only_if(filter).execute().await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "Embedding cache lookup failed");
                    continue;
                }
            };
            if let Err(e) = collect_cached_vectors(&mut stream, &mut result).await {
                tracing::warn!(error = %e, "Embedding cache lookup stream failed, keeping partial results");
            }
        }
        result
    }

    async fn save(&self, entries: &[(String, Vec<f32>)]) -> Result<(), ChatError> {
        if entries.is_empty() {
            return Ok(());
        }
        let schema = get_embedding_cache_schema(self.dimension);
        let batch = embedding_record_batch(entries, self.dimension)
            .map_err(|e| ChatError::persistence(format!("Failed to create record batch: {}", e)))?;

        self.table
            .add(Box::new(RecordBatchIterator::new(vec![Ok(batch)], schema)))
            .execute()
            .await
            .map_err(|e| ChatError::persistence(format!("Failed to add embeddings to LanceDB: {}", e)))?;
        Ok(())
    }
}

/// Ensure a table exists in the LanceDB connection with correct schema
pub async fn ensure_lancedb_table_exists(
    db: &Connection,
    table_name: &str,
    schema: Arc<Schema>,
) -> Result<Table, String> {
    let table_names = db.table_names().execute().await.map_err(|e| e.to_string())?;

    if table_names.contains(&table_name.to_string()) {
        let table = db
            .open_table(table_name)
            .execute()
            .await
            .map_err(|e| e.to_string())?;

        let existing_schema = table.schema().await.map_err(|e| e.to_string())?;
        let vector_dim = |s: &Schema| {
            s.field_with_name("vector").ok().and_then(|f| match f.data_type() {
                DataType::FixedSizeList(_, dim) => Some(*dim),
                _ => None,
            })
        };
        let existing_dim = vector_dim(&existing_schema);
        let expected_dim = vector_dim(&schema);

        if existing_schema.fields().len() == schema.fields().len() && existing_dim == expected_dim {
            return Ok(table);
        }
        tracing::warn!(
            table = table_name,
            ?existing_dim,
            ?expected_dim,
            "Schema mismatch, recreating table"
        );
        let _ = db.drop_table(table_name, &[]).await;
    }

    let batch = RecordBatch::new_empty(schema.clone());
    db.create_table(
        table_name,
        RecordBatchIterator::new(vec![batch].into_iter().map(Ok), schema),
    )
    .execute()
    .await
    .map_err(|e| e.to_string())
}

/// Two-level embedding cache shared by every index build of one embedder
pub struct EmbeddingCache {
    model_name: String,
    dimension: usize,
    memory: Mutex<LruCache<String, Vec<f32>>>,
    store: Option<LanceEmbeddingStore>,
}

impl EmbeddingCache {
    pub fn in_memory(model_name: &str, dimension: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            model_name: model_name.to_string(),
            dimension,
            memory: Mutex::new(LruCache::new(capacity)),
            store: None,
        }
    }

    /// Memory cache backed by a LanceDB directory
    pub async fn persistent(
        dir: &Path,
        model_name: &str,
        dimension: usize,
        capacity: usize,
    ) -> Result<Self, ChatError> {
        let store = LanceEmbeddingStore::open(dir, model_name, dimension).await?;
        tracing::info!(dir = %dir.display(), model = model_name, "Opened persistent embedding cache");
        let mut cache = Self::in_memory(model_name, dimension, capacity);
        cache.store = Some(store);
        Ok(cache)
    }

    pub fn key_for(&self, content: &str) -> String {
        compute_content_hash(&self.model_name, content)
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    pub fn len(&self) -> usize {
        self.memory.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Batch lookup: LRU first, then the persistent store for the misses
    pub async fn get_many(&self, keys: &[String]) -> HashMap<String, Vec<f32>> {
        let mut result = HashMap::new();
        let mut misses = Vec::new();
        {
            let mut memory = self.memory.lock().unwrap_or_else(|p| p.into_inner());
            for key in keys {
                match memory.get(key) {
                    Some(vector) => {
                        result.insert(key.clone(), vector.clone());
                    }
                    None => misses.push(key.clone()),
                }
            }
        }

        if let (Some(store), false) = (&self.store, misses.is_empty()) {
            let found = store.lookup(&misses).await;
            let mut memory = self.memory.lock().unwrap_or_else(|p| p.into_inner());
            for (key, vector) in found {
                if vector.len() == self.dimension {
                    memory.put(key.clone(), vector.clone());
                    result.insert(key, vector);
                }
            }
        }
        result
    }

    /// Insert freshly computed vectors. A persistence failure is logged and the
    /// memory cache still holds the entries.
    pub async fn put_many(&self, entries: Vec<(String, Vec<f32>)>) {
        {
            let mut memory = self.memory.lock().unwrap_or_else(|p| p.into_inner());
            for (key, vector) in &entries {
                memory.put(key.clone(), vector.clone());
            }
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&entries).await {
                tracing::warn!(error = %e, entries = entries.len(), "Failed to persist embeddings");
            }
        }
    }
}
