use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============ Conversation ============

/// Author of a message in the session history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Role name on the OpenAI-compatible wire
    pub fn as_wire(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One immutable turn of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Wire message sent to the completion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Everything one completion round-trip needs
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    /// Clamped to [0, 1] when built
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
    pub max_retries: u32,
}

/// Where a session reply came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

// ============ Documents ============

/// Format a document was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Json,
    Delimited,
    Pdf,
    Docx,
}

/// Where a loaded record came from inside its file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub path: PathBuf,
    pub format: DocumentFormat,
    /// 1-based page for PDFs
    pub page: Option<usize>,
    /// 1-based data row for delimited files
    pub row: Option<usize>,
}

/// A (text, source-metadata) record produced by the document loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub text: String,
    pub metadata: SourceMetadata,
}

impl LoadedDocument {
    /// Stable identifier: file name plus page or row when present
    pub fn source_id(&self) -> String {
        let name = self
            .metadata
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.metadata.path.to_string_lossy().to_string());
        match (self.metadata.page, self.metadata.row) {
            (Some(page), _) => format!("{}#page={}", name, page),
            (None, Some(row)) => format!("{}#row={}", name, row),
            (None, None) => name,
        }
    }
}

/// A bounded slice of a document, the unit of embedding and retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub source_id: String,
    /// Character offset of the chunk start within its document
    pub offset: usize,
}

/// A chunk returned by a similarity query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
    /// Position of the chunk in the index, used to break ties
    pub position: usize,
}

/// Summary of an index build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub total_chunks: usize,
    pub documents_processed: usize,
    pub cache_hits: usize,
    /// Unsupported files left out while expanding directories
    #[serde(default)]
    pub skipped: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(path: &str, page: Option<usize>, row: Option<usize>) -> LoadedDocument {
        LoadedDocument {
            text: "x".to_string(),
            metadata: SourceMetadata {
                path: PathBuf::from(path),
                format: DocumentFormat::PlainText,
                page,
                row,
            },
        }
    }

    #[test]
    fn test_source_id_includes_page_or_row() {
        assert_eq!(doc("/tmp/docs/report.pdf", Some(2), None).source_id(), "report.pdf#page=2");
        assert_eq!(doc("data/people.csv", None, Some(7)).source_id(), "people.csv#row=7");
        assert_eq!(doc("notes.txt", None, None).source_id(), "notes.txt");
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(Role::User.as_wire(), "user");
        assert_eq!(Role::Assistant.as_wire(), "assistant");
    }
}
