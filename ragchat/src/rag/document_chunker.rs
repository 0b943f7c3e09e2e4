//! Document chunking for retrieval.
//!
//! This module handles:
//! - Chunker configuration and validation
//! - Fixed-size, overlapping character windows per document
//!
//! Lengths are counted in chars, never bytes, so multi-byte text is never
//! split inside a code point.

use crate::error::ChatError;
use crate::protocol::{DocumentChunk, LoadedDocument};

/// Default target chunk length in characters
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkerConfig {
    /// Build a config, rejecting `chunk_size == 0` and `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChatError> {
        let config = Self {
            chunk_size,
            chunk_overlap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if self.chunk_size == 0 {
            return Err(ChatError::configuration("chunk_size must be greater than zero"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChatError::configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

/// Split every document into overlapping windows, in document order.
pub fn chunk_documents(
    documents: &[LoadedDocument],
    config: &ChunkerConfig,
) -> Result<Vec<DocumentChunk>, ChatError> {
    config.validate()?;
    let mut chunks = Vec::new();
    for document in documents {
        let source_id = document.source_id();
        chunks.extend(split_text_into_windows(&document.text, &source_id, config));
    }
    tracing::debug!(
        documents = documents.len(),
        chunks = chunks.len(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "Chunked documents"
    );
    Ok(chunks)
}

/// Split a single text. Assumes a validated config.
pub fn split_text_into_windows(
    text: &str,
    source_id: &str,
    config: &ChunkerConfig,
) -> Vec<DocumentChunk> {
    // Byte offset of every char start, plus the end of the string
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < char_count {
        let end = (start + config.chunk_size).min(char_count);
        chunks.push(DocumentChunk {
            text: text[boundaries[start]..boundaries[end]].to_string(),
            source_id: source_id.to_string(),
            offset: start,
        });
        if end == char_count {
            break;
        }
        start += config.step();
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DocumentFormat, SourceMetadata};
    use std::path::PathBuf;

    fn doc(name: &str, text: &str) -> LoadedDocument {
        LoadedDocument {
            text: text.to_string(),
            metadata: SourceMetadata {
                path: PathBuf::from(name),
                format: DocumentFormat::PlainText,
                page: None,
                row: None,
            },
        }
    }

    fn reconstruct(chunks: &[DocumentChunk], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(&chunk.text);
            } else {
                out.extend(chunk.text.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_config_validation() {
        assert!(ChunkerConfig::new(20, 5).is_ok());
        assert!(ChunkerConfig::new(0, 0).is_err());
        assert!(ChunkerConfig::new(10, 10).is_err());
        assert!(ChunkerConfig::new(10, 11).is_err());
        assert!(ChunkerConfig::new(1, 0).is_ok());
    }

    #[test]
    fn test_one_chunk_per_short_document() {
        let config = ChunkerConfig::new(20, 5).unwrap();
        let docs = vec![doc("a.txt", "The sky is blue."), doc("b.txt", "Grass is green.")];
        let chunks = chunk_documents(&docs, &config).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "The sky is blue.");
        assert_eq!(chunks[0].source_id, "a.txt");
        assert_eq!(chunks[1].text, "Grass is green.");
        assert_eq!(chunks[1].source_id, "b.txt");
        assert_eq!(chunks[1].offset, 0);
    }

    #[test]
    fn test_windows_overlap_exactly() {
        let config = ChunkerConfig::new(10, 3).unwrap();
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = split_text_into_windows(text, "alpha", &config);
        let offsets: Vec<usize> = chunks.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 7, 14, 21]);
        assert_eq!(chunks[0].text, "abcdefghij");
        assert_eq!(chunks[1].text, "hijklmnopq");
        assert_eq!(chunks[3].text, "vwxyz");
        for pair in chunks.windows(2) {
            let tail: String = pair[0].text.chars().skip(10 - 3).collect();
            let head: String = pair[1].text.chars().take(3).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_reconstruction_for_many_configs() {
        let text = "Retrieval augmented generation splits documents into windows. \
                    Each window overlaps the previous one so context survives the cut.";
        for size in 1..40 {
            for overlap in 0..size {
                let config = ChunkerConfig::new(size, overlap).unwrap();
                let chunks = split_text_into_windows(text, "doc", &config);
                assert!(chunks.iter().all(|c| !c.text.is_empty()));
                assert!(chunks.iter().all(|c| c.text.chars().count() <= size));
                assert_eq!(reconstruct(&chunks, overlap), text, "size={} overlap={}", size, overlap);
            }
        }
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let config = ChunkerConfig::new(4, 1).unwrap();
        let text = "héllo wörld ✓";
        let chunks = split_text_into_windows(text, "utf8", &config);
        assert_eq!(chunks[0].text, "héll");
        assert_eq!(reconstruct(&chunks, 1), text);
    }

    #[test]
    fn test_empty_document_yields_no_chunks() {
        let config = ChunkerConfig::default();
        let chunks = chunk_documents(&[doc("empty.txt", "")], &config).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let config = ChunkerConfig::new(7, 2).unwrap();
        let docs = vec![doc("a.txt", "some repeated text for chunking")];
        assert_eq!(
            chunk_documents(&docs, &config).unwrap(),
            chunk_documents(&docs, &config).unwrap()
        );
    }
}
