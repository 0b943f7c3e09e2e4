use crate::completion::{RetryPolicy, DEFAULT_API_BASE_URL};
use crate::error::ChatError;
use crate::persona::Persona;
use crate::rag::{ChunkerConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Which responder strategy answers a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponderMode {
    /// Persona + history only
    #[default]
    Plain,
    /// Retrieved document context is injected before the history
    Retrieval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// all-MiniLM-L6-v2 through fastembed
    #[default]
    FastEmbed,
    /// Feature hashing, no model download
    Hashing,
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Cheaper model tried once after rate or quota exhaustion
    #[serde(default = "default_fallback_model")]
    pub fallback_model: Option<String>,
    #[serde(default)]
    pub persona: Persona,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub responder: ResponderMode,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_index_timeout_secs")]
    pub index_timeout_secs: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default = "default_embedding_concurrency")]
    pub embedding_concurrency: usize,
    /// LanceDB directory for persisted embeddings; platform cache dir when unset
    #[serde(default)]
    pub embedding_cache_dir: Option<PathBuf>,
    /// Persist embeddings across runs
    #[serde(default = "default_true")]
    pub persist_embeddings: bool,
    /// Platform data dir when unset
    #[serde(default)]
    pub transcripts_dir: Option<PathBuf>,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_fallback_model() -> Option<String> {
    Some("gpt-4o-mini".to_string())
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_index_timeout_secs() -> u64 {
    300
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_top_k() -> usize {
    4
}

fn default_embedding_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            model: default_model(),
            fallback_model: default_fallback_model(),
            persona: Persona::default(),
            temperature: default_temperature(),
            responder: ResponderMode::default(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            index_timeout_secs: default_index_timeout_secs(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            embedding_backend: EmbeddingBackend::default(),
            embedding_concurrency: default_embedding_concurrency(),
            embedding_cache_dir: None,
            persist_embeddings: true,
            transcripts_dir: None,
        }
    }
}

impl AppSettings {
    /// Reject values no session could run with.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.model.trim().is_empty() {
            return Err(ChatError::configuration("model must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ChatError::configuration(format!(
                "temperature must be within [0, 1], got {}",
                self.temperature
            )));
        }
        if self.top_k == 0 {
            return Err(ChatError::configuration("top_k must be at least 1"));
        }
        if self.embedding_concurrency == 0 {
            return Err(ChatError::configuration("embedding_concurrency must be at least 1"));
        }
        if self.request_timeout_secs == 0 || self.index_timeout_secs == 0 {
            return Err(ChatError::configuration("timeouts must be greater than zero"));
        }
        self.chunker_config()?;
        Ok(())
    }

    pub fn chunker_config(&self) -> Result<ChunkerConfig, ChatError> {
        ChunkerConfig::new(self.chunk_size, self.chunk_overlap)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            delay: self.retry_delay(),
            attempt_timeout: self.request_timeout(),
            fallback_model: self.fallback_model.clone().filter(|m| !m.trim().is_empty()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index_timeout_secs)
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.transcripts_dir
            .clone()
            .unwrap_or_else(crate::paths::get_default_transcripts_dir)
    }

    pub fn embedding_cache_dir(&self) -> PathBuf {
        self.embedding_cache_dir
            .clone()
            .unwrap_or_else(crate::paths::get_default_embedding_cache_dir)
    }
}

/// Load settings from `path` (the platform config file when `None`).
/// A missing or unparseable file yields defaults.
pub async fn load_settings(path: Option<&Path>) -> AppSettings {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(crate::paths::get_config_path);

    match fs::read_to_string(&config_path).await {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(settings) => {
                tracing::info!(path = %config_path.display(), "Settings loaded");
                settings
            }
            Err(e) => {
                tracing::warn!(path = %config_path.display(), error = %e, "Failed to parse settings, using defaults");
                AppSettings::default()
            }
        },
        Err(e) => {
            tracing::info!(path = %config_path.display(), error = %e, "No config file found, using defaults");
            AppSettings::default()
        }
    }
}

/// Save settings to `path` (the platform config file when `None`)
pub async fn save_settings(settings: &AppSettings, path: Option<&Path>) -> Result<(), ChatError> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(crate::paths::get_config_path);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ChatError::persistence(format!("Failed to create config directory: {}", e)))?;
    }

    let contents = serde_json::to_string_pretty(settings)
        .map_err(|e| ChatError::persistence(format!("Failed to serialize settings: {}", e)))?;

    fs::write(&config_path, contents)
        .await
        .map_err(|e| ChatError::persistence(format!("Failed to write config file: {}", e)))?;

    tracing::info!(path = %config_path.display(), "Settings saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = AppSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.fallback_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(settings.responder, ResponderMode::Plain);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let parsed: AppSettings =
            serde_json::from_str(r#"{"model": "gpt-4o-mini", "responder": "retrieval", "persona": "technical"}"#)
                .unwrap();
        assert_eq!(parsed.model, "gpt-4o-mini");
        assert_eq!(parsed.responder, ResponderMode::Retrieval);
        assert_eq!(parsed.persona, Persona::Technical);
        assert_eq!(parsed.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(parsed.top_k, 4);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = AppSettings::default();
        settings.temperature = 1.5;
        assert!(settings.validate().unwrap_err().is_fatal());

        let mut settings = AppSettings::default();
        settings.chunk_overlap = settings.chunk_size;
        assert!(settings.validate().is_err());

        let mut settings = AppSettings::default();
        settings.top_k = 0;
        assert!(settings.validate().is_err());

        let mut settings = AppSettings::default();
        settings.model = "  ".to_string();
        assert!(settings.validate().is_err());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut settings = AppSettings::default();
        settings.top_k = 7;
        settings.embedding_backend = EmbeddingBackend::Hashing;
        save_settings(&settings, Some(&path)).await.unwrap();
        assert_eq!(load_settings(Some(&path)).await, settings);
    }

    #[tokio::test]
    async fn test_unparseable_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings(Some(&path)).await, AppSettings::default());
    }
}
