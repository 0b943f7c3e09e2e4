pub mod cli;
pub mod completion;
pub mod error;
pub mod fallback;
pub mod logging;
pub mod message_builders;
pub mod model_profiles;
pub mod paths;
pub mod persona;
pub mod protocol;
pub mod rag;
pub mod repl;
pub mod responder;
pub mod session;
pub mod session_registry;
pub mod settings;
pub mod system_prompt;
pub mod transcript;

#[cfg(test)]
mod tests;

use anyhow::Context;
use cli::{apply_cli_overrides, CliArgs};
use completion::{CompletionClient, OpenAiCompletionClient};
use error::ChatError;
use paths::ensure_writable_dir;
use rag::{
    EmbeddingCache, Embedder, FastEmbedder, HashingEmbedder, IndexService, Retriever, EMBEDDING_LRU_CAPACITY,
    HASHING_EMBEDDING_DIM,
};
use repl::Repl;
use responder::build_responder;
use session::{ConversationSession, SessionConfig};
use session_registry::SessionRegistry;
use settings::{load_settings, AppSettings, EmbeddingBackend, ResponderMode};
use std::sync::Arc;

/// Embedder plus cache for retrieval mode. `None` in plain mode.
pub async fn build_index_service(settings: &AppSettings) -> Result<Option<IndexService>, ChatError> {
    if settings.responder != ResponderMode::Retrieval {
        return Ok(None);
    }

    let embedder: Arc<dyn Embedder> = match settings.embedding_backend {
        EmbeddingBackend::FastEmbed => Arc::new(FastEmbedder::load().await?),
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(HASHING_EMBEDDING_DIM)),
    };
    let model = embedder.model_name().to_string();
    let dimension = embedder.dimension();

    let mut cache = None;
    if settings.persist_embeddings {
        if let Some(dir) = ensure_writable_dir(settings.embedding_cache_dir(), "embeddings").await {
            match EmbeddingCache::persistent(&dir.path, &model, dimension, EMBEDDING_LRU_CAPACITY).await {
                Ok(persistent) => cache = Some(persistent),
                Err(e) => tracing::warn!(error = %e, "Persistent embedding cache unavailable, using memory only"),
            }
        }
    }
    let cache = cache.unwrap_or_else(|| EmbeddingCache::in_memory(&model, dimension, EMBEDDING_LRU_CAPACITY));

    Ok(Some(IndexService::new(
        embedder,
        Arc::new(cache),
        settings.embedding_concurrency,
    )))
}

/// Build a session wired to `client` according to `settings`.
pub async fn build_session(
    settings: &AppSettings,
    client: Arc<dyn CompletionClient>,
) -> Result<ConversationSession, ChatError> {
    let config = SessionConfig::from_settings(settings)?;
    let service = build_index_service(settings).await?;
    let responder = build_responder(
        settings.responder,
        client,
        settings.retry_policy(),
        service.clone().map(Retriever::new),
        settings.top_k,
    )?;
    let session = ConversationSession::new(config, responder);
    Ok(match service {
        Some(service) => session.with_index_service(service),
        None => session,
    })
}

/// Load configuration, wire the session and run the REPL until EOF or `/quit`.
pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    logging::init_tracing(args.log_level.as_deref());

    let mut settings = load_settings(args.config.as_deref()).await;
    apply_cli_overrides(&args, &mut settings).context("Invalid configuration")?;

    let client = OpenAiCompletionClient::new(&settings.api_base_url, args.api_key.clone())
        .context("Cannot create completion client")?;
    let session = build_session(&settings, Arc::new(client))
        .await
        .context("Cannot start session")?;

    let registry = SessionRegistry::new();
    let (id, session) = registry.insert(session).await;
    tracing::info!(
        session = %id,
        model = %settings.model,
        responder = ?settings.responder,
        "Session ready"
    );

    if !args.rag.is_empty() {
        match session.lock().await.build_index_from_paths(args.rag.clone()).await {
            Ok(report) => println!("{}", repl::format_index_report(&report)),
            Err(e) if e.is_fatal() => return Err(e).context("Cannot index documents"),
            Err(e) => {
                tracing::warn!(error = %e, "Startup indexing failed");
                println!("Indexing failed: {}", e);
            }
        }
    }

    if let Some(path) = &args.transcript {
        match transcript::load_transcript(path).await {
            Ok(messages) => {
                println!("Restored {} messages from {}", messages.len(), path.display());
                session.lock().await.restore(messages);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not restore transcript");
                println!("Could not restore transcript: {}", e);
            }
        }
    }

    let transcripts_dir = match ensure_writable_dir(settings.transcripts_dir(), "transcripts").await {
        Some(dir) => dir.path,
        None => settings.transcripts_dir(),
    };

    Repl::new(session, transcripts_dir)
        .run()
        .await
        .context("Terminal I/O failed")?;

    registry.remove(&id).await;
    Ok(())
}
