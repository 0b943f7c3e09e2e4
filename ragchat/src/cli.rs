//! Command-line argument parsing and launch configuration.
//!
//! CLI values override the loaded `AppSettings` for one launch and are never
//! written back to the config file.

use crate::error::ChatError;
use crate::persona::Persona;
use crate::settings::{AppSettings, EmbeddingBackend, ResponderMode};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResponderArg {
    Plain,
    Retrieval,
}

impl From<ResponderArg> for ResponderMode {
    fn from(arg: ResponderArg) -> Self {
        match arg {
            ResponderArg::Plain => ResponderMode::Plain,
            ResponderArg::Retrieval => ResponderMode::Retrieval,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbeddingBackendArg {
    Fastembed,
    Hashing,
}

impl From<EmbeddingBackendArg> for EmbeddingBackend {
    fn from(arg: EmbeddingBackendArg) -> Self {
        match arg {
            EmbeddingBackendArg::Fastembed => EmbeddingBackend::FastEmbed,
            EmbeddingBackendArg::Hashing => EmbeddingBackend::Hashing,
        }
    }
}

/// CLI arguments for ragchat
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "ragchat", about = "Terminal chat over a hosted model, with optional document retrieval")]
pub struct CliArgs {
    /// Model to use for this launch
    #[arg(long, value_name = "MODEL", env = "RAGCHAT_MODEL")]
    pub model: Option<String>,
    /// Persona id (helpful, concise, creative, technical, friendly)
    #[arg(long, value_name = "PERSONA", env = "RAGCHAT_PERSONA")]
    pub persona: Option<String>,
    /// Config file (defaults to the platform config directory)
    #[arg(long, value_name = "PATH", env = "RAGCHAT_CONFIG")]
    pub config: Option<PathBuf>,
    /// API key for the completion endpoint
    #[arg(long, value_name = "KEY", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API
    #[arg(long, value_name = "URL", env = "RAGCHAT_API_BASE")]
    pub api_base: Option<String>,
    /// Files or folders to index on startup (comma-separated or repeated)
    #[arg(long, value_delimiter = ',', value_name = "PATH[,PATH...]", env = "RAGCHAT_RAG")]
    pub rag: Vec<PathBuf>,
    /// Transcript to restore on startup
    #[arg(long, value_name = "PATH")]
    pub transcript: Option<PathBuf>,
    /// Log filter, e.g. `info` or `ragchat_lib=debug`
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
    #[arg(long, value_enum)]
    pub responder: Option<ResponderArg>,
    #[arg(long, value_enum)]
    pub embedding_backend: Option<EmbeddingBackendArg>,
    /// Sampling temperature in [0, 1]
    #[arg(long, value_name = "FLOAT")]
    pub temperature: Option<f32>,
    #[arg(long, value_name = "INT")]
    pub top_k: Option<usize>,
}

/// Apply launch-time overrides on top of loaded settings, then validate.
///
/// Passing `--rag` without `--responder` switches to retrieval mode.
pub fn apply_cli_overrides(args: &CliArgs, settings: &mut AppSettings) -> Result<(), ChatError> {
    if let Some(model) = &args.model {
        settings.model = model.trim().to_string();
    }
    if let Some(persona) = &args.persona {
        settings.persona = persona.parse::<Persona>()?;
    }
    if let Some(base) = &args.api_base {
        settings.api_base_url = base.trim().to_string();
    }
    if let Some(temperature) = args.temperature {
        settings.temperature = temperature;
    }
    if let Some(top_k) = args.top_k {
        settings.top_k = top_k;
    }
    if let Some(backend) = args.embedding_backend {
        settings.embedding_backend = backend.into();
    }
    match args.responder {
        Some(mode) => settings.responder = mode.into(),
        None if !args.rag.is_empty() => {
            tracing::info!("--rag given, using retrieval responder");
            settings.responder = ResponderMode::Retrieval;
        }
        None => {}
    }
    settings.validate()
}
