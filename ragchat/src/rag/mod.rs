//! Retrieval-augmented generation pipeline.
//!
//! This module provides:
//! - Multi-format document loading (PDF, DOCX, CSV/TSV, JSON, TXT, MD)
//! - Fixed-size overlapping chunking
//! - Embedding backends behind the `Embedder` trait
//! - An LRU + LanceDB embedding cache
//! - Immutable cosine-similarity indexes and a top-k retriever

mod cache_manager;
mod document_chunker;
mod embedder;
mod file_processor;
mod index;
mod retriever;

pub use cache_manager::{compute_content_hash, EmbeddingCache, EMBEDDING_LRU_CAPACITY};
pub use document_chunker::{chunk_documents, ChunkerConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use embedder::{Embedder, FastEmbedder, HashingEmbedder, HASHING_EMBEDDING_DIM, MINILM_EMBEDDING_DIM};
pub use file_processor::{is_supported_file_type, load_document, load_paths, LoadedPaths};
pub use index::{cosine_similarity, DocumentIndex, IndexService};
pub use retriever::Retriever;
