//! Transcript persistence.
//!
//! A transcript is a UTF-8 JSON array of `{role: "human" | "ai", content,
//! timestamp}` objects. Timestamps are informational: a missing or unparseable
//! one is replaced with the load time.

use crate::error::ChatError;
use crate::protocol::{Message, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    Human,
    Ai,
}

impl From<Role> for TranscriptRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => TranscriptRole::Human,
            Role::Assistant => TranscriptRole::Ai,
        }
    }
}

impl From<TranscriptRole> for Role {
    fn from(role: TranscriptRole) -> Self {
        match role {
            TranscriptRole::Human => Role::User,
            TranscriptRole::Ai => Role::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
}

impl From<&Message> for TranscriptEntry {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.into(),
            content: message.text.clone(),
            timestamp: message.timestamp.to_rfc3339(),
        }
    }
}

impl TranscriptEntry {
    fn into_message(self, loaded_at: DateTime<Utc>) -> Message {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(loaded_at);
        Message {
            role: self.role.into(),
            text: self.content,
            timestamp,
        }
    }
}

/// A saved transcript on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptInfo {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Default file name for a new transcript, e.g. `chat_20240101_120000_042.json`
pub fn default_transcript_name(now: DateTime<Utc>) -> String {
    format!("chat_{}.json", now.format("%Y%m%d_%H%M%S_%3f"))
}

/// Path in `dir` for a new transcript that does not replace an existing file
pub async fn new_transcript_path(dir: &Path, now: DateTime<Utc>) -> PathBuf {
    let name = default_transcript_name(now);
    let mut path = dir.join(&name);
    let stem = name.trim_end_matches(".json");
    let mut suffix = 1;
    while fs::try_exists(&path).await.unwrap_or(false) {
        path = dir.join(format!("{}_{}.json", stem, suffix));
        suffix += 1;
    }
    path
}

pub fn serialize_transcript(history: &[Message]) -> Result<String, ChatError> {
    let entries: Vec<TranscriptEntry> = history.iter().map(TranscriptEntry::from).collect();
    serde_json::to_string_pretty(&entries)
        .map_err(|e| ChatError::persistence(format!("Failed to serialize transcript: {}", e)))
}

pub fn parse_transcript(contents: &str) -> Result<Vec<Message>, ChatError> {
    let entries: Vec<TranscriptEntry> = serde_json::from_str(contents)
        .map_err(|e| ChatError::persistence(format!("Invalid transcript: {}", e)))?;
    let loaded_at = Utc::now();
    Ok(entries.into_iter().map(|e| e.into_message(loaded_at)).collect())
}

/// Write `history` to `path`, creating parent directories
pub async fn save_transcript(path: &Path, history: &[Message]) -> Result<(), ChatError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ChatError::persistence(format!("Failed to create transcript directory: {}", e)))?;
    }
    let contents = serialize_transcript(history)?;
    fs::write(path, contents)
        .await
        .map_err(|e| ChatError::persistence(format!("Failed to write {}: {}", path.display(), e)))?;
    tracing::info!(path = %path.display(), messages = history.len(), "Transcript saved");
    Ok(())
}

pub async fn load_transcript(path: &Path) -> Result<Vec<Message>, ChatError> {
    let contents = fs::read_to_string(path)
        .await
        .map_err(|e| ChatError::persistence(format!("Failed to read {}: {}", path.display(), e)))?;
    let messages = parse_transcript(&contents)?;
    tracing::info!(path = %path.display(), messages = messages.len(), "Transcript loaded");
    Ok(messages)
}

/// JSON files in `dir`, newest first. A missing directory lists as empty.
pub async fn list_transcripts(dir: &Path) -> Result<Vec<TranscriptInfo>, ChatError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(ChatError::persistence(format!(
                "Failed to list {}: {}",
                dir.display(),
                e
            )))
        }
    };

    let mut transcripts = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ChatError::persistence(e.to_string()))?
    {
        let path = entry.path();
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if !is_json {
            continue;
        }
        let modified = entry
            .metadata()
            .await
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        transcripts.push(TranscriptInfo { path, modified });
    }
    transcripts.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
    Ok(transcripts)
}
