//! Error types for ragchat.
//!
//! Only `Configuration` is fatal. Every other variant is either recovered by
//! the session (degraded mode, warnings) or reported back to the caller.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Classification of a failed completion round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionErrorKind {
    RateLimited,
    QuotaExceeded,
    Transient,
    Other,
}

impl CompletionErrorKind {
    /// Rate and quota failures are the ones that push a session into degraded mode.
    pub fn is_rate_or_quota(self) -> bool {
        matches!(self, Self::RateLimited | Self::QuotaExceeded)
    }

    /// Whether the retry policy may try the same request again.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct CompletionError {
    pub kind: CompletionErrorKind,
    pub message: String,
}

impl CompletionError {
    pub fn new(kind: CompletionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::RateLimited, message)
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::QuotaExceeded, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Transient, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Other, message)
    }
}

#[derive(Error, Debug, Clone)]
pub enum ChatError {
    /// Missing credential or invalid settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("No document index has been built")]
    IndexUnavailable,

    #[error("Unsupported document format '{extension}' for {}", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// Transcript or cache I/O failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Failed to read {}: {message}", path.display())]
    Document { path: PathBuf, message: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("{operation} timed out after {}ms", elapsed.as_millis())]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },
}

impl ChatError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    pub fn document(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Document {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn timeout(operation: &'static str, elapsed: Duration) -> Self {
        Self::Timeout { operation, elapsed }
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Only configuration problems halt the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    pub fn completion_kind(&self) -> Option<CompletionErrorKind> {
        match self {
            Self::Completion(e) => Some(e.kind),
            _ => None,
        }
    }
}
