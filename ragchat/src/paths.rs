//! Centralized path resolution.
//!
//! | Purpose | Linux | macOS |
//! |---------|-------|-------|
//! | Config | `~/.config/ragchat/` | `~/Library/Application Support/ragchat/` |
//! | Data (transcripts) | `~/.local/share/ragchat/` | `~/Library/Application Support/ragchat/` |
//! | Cache (embeddings) | `~/.cache/ragchat/` | `~/Library/Caches/ragchat/` |

use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Application name used in directory paths
pub const APP_NAME: &str = "ragchat";

/// Result of attempting to get a writable directory
#[derive(Debug, Clone)]
pub struct WritableDir {
    pub path: PathBuf,
    /// Whether this is a fallback location rather than the requested one
    pub is_fallback: bool,
}

pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .unwrap_or_else(|| fallback_base_dir().join("config"))
}

pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join(APP_NAME))
        .unwrap_or_else(|| fallback_base_dir().join("data"))
}

pub fn get_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|p| p.join(APP_NAME))
        .unwrap_or_else(|| fallback_base_dir().join("cache"))
}

pub fn get_default_transcripts_dir() -> PathBuf {
    get_data_dir().join("transcripts")
}

pub fn get_default_embedding_cache_dir() -> PathBuf {
    get_cache_dir().join("embeddings")
}

/// `~/.ragchat/`, or `./.ragchat/` without a home directory
fn fallback_base_dir() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(format!(".{}", APP_NAME)))
        .unwrap_or_else(|| {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(format!(".{}", APP_NAME))
        })
}

/// Test if a directory is writable by creating and removing a test file.
async fn test_write_access(dir: &Path) -> bool {
    if fs::create_dir_all(dir).await.is_err() {
        return false;
    }
    let test_file = dir.join(format!(".write-test-{}", Uuid::new_v4()));
    match fs::write(&test_file, b"test").await {
        Ok(_) => {
            let _ = fs::remove_file(&test_file).await;
            true
        }
        Err(_) => false,
    }
}

/// Find a writable directory: `primary`, then `~/.ragchat/{purpose}`, then
/// `./.ragchat/{purpose}`. `None` when nothing on disk is writable.
pub async fn ensure_writable_dir(primary: PathBuf, purpose: &str) -> Option<WritableDir> {
    if test_write_access(&primary).await {
        tracing::debug!(purpose, path = %primary.display(), "Using primary directory");
        return Some(WritableDir {
            path: primary,
            is_fallback: false,
        });
    }
    tracing::warn!(purpose, path = %primary.display(), "Primary directory not writable");

    let candidates = [
        dirs::home_dir().map(|h| h.join(format!(".{}", APP_NAME)).join(purpose)),
        std::env::current_dir()
            .ok()
            .map(|c| c.join(format!(".{}", APP_NAME)).join(purpose)),
    ];
    for candidate in candidates.into_iter().flatten() {
        if test_write_access(&candidate).await {
            tracing::warn!(purpose, path = %candidate.display(), "Using fallback directory");
            return Some(WritableDir {
                path: candidate,
                is_fallback: true,
            });
        }
    }

    tracing::error!(purpose, "No writable directory found");
    None
}
