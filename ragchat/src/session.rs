//! Conversation session state machine.
//!
//! ```text
//! Uninitialized --open/submit--> Ready --rate/quota exhausted--> Degraded
//!                                  ^                                |
//!                                  +---------recover / reset--------+
//! ```
//!
//! History is append-only except for `reset`, which truncates it; `restore`
//! is a reset followed by appends. The document index is immutable and is
//! replaced wholesale on rebuild.

use crate::error::ChatError;
use crate::fallback::fallback_response;
use crate::persona::Persona;
use crate::protocol::{IndexReport, LoadedDocument, Message, Reply, ReplySource};
use crate::rag::{chunk_documents, load_paths, ChunkerConfig, DocumentIndex, IndexService};
use crate::responder::{Responder, TurnContext};
use crate::settings::{AppSettings, ResponderMode};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Ready,
    /// The hosted model is unavailable; replies come from the keyword fallback
    Degraded,
}

/// Per-session knobs, usually derived from `AppSettings`
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub model: String,
    pub persona: Persona,
    pub temperature: f32,
    pub max_retries: u32,
    pub chunker: ChunkerConfig,
    pub index_timeout: Duration,
}

impl SessionConfig {
    pub fn from_settings(settings: &AppSettings) -> Result<Self, ChatError> {
        settings.validate()?;
        Ok(Self {
            model: settings.model.trim().to_string(),
            persona: settings.persona,
            temperature: settings.temperature,
            max_retries: settings.max_retries,
            chunker: settings.chunker_config()?,
            index_timeout: settings.index_timeout(),
        })
    }
}

pub struct ConversationSession {
    id: Uuid,
    config: SessionConfig,
    history: Vec<Message>,
    index: Option<Arc<DocumentIndex>>,
    state: SessionState,
    responder: Arc<dyn Responder>,
    index_service: Option<IndexService>,
}

impl ConversationSession {
    pub fn new(config: SessionConfig, responder: Arc<dyn Responder>) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            history: Vec::new(),
            index: None,
            state: SessionState::Uninitialized,
            responder,
            index_service: None,
        }
    }

    /// Service used by `build_index`. Without one, indexing is a configuration error.
    pub fn with_index_service(mut self, service: IndexService) -> Self {
        self.index_service = Some(service);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn persona(&self) -> Persona {
        self.config.persona
    }

    pub fn responder_mode(&self) -> ResponderMode {
        self.responder.mode()
    }

    /// Current index; holders keep a complete snapshot across rebuilds.
    pub fn index(&self) -> Option<Arc<DocumentIndex>> {
        self.index.clone()
    }

    pub fn open(&mut self) {
        if self.state == SessionState::Uninitialized {
            self.state = SessionState::Ready;
            tracing::debug!(session = %self.id, "Session opened");
        }
    }

    /// Answer one user turn.
    ///
    /// Rate or quota exhaustion degrades the session and answers from the
    /// keyword fallback. Any other failure leaves an `Error: ...` placeholder in
    /// history and is returned to the caller.
    pub async fn submit(&mut self, user_text: &str) -> Result<Reply, ChatError> {
        self.open();

        if self.state == SessionState::Degraded {
            return Ok(self.reply_from_fallback(user_text));
        }

        if self.responder.requires_index() && self.index.is_none() {
            return Err(ChatError::IndexUnavailable);
        }

        self.history.push(Message::user(user_text));
        let prior = self.history.len() - 1;
        let index = self.index.clone();
        let outcome = {
            let ctx = TurnContext {
                persona: self.config.persona,
                model: &self.config.model,
                temperature: self.config.temperature,
                max_retries: self.config.max_retries,
                history: &self.history[..prior],
                user_text,
                index: index.as_deref(),
            };
            self.responder.respond(&ctx).await
        };

        match outcome {
            Ok(text) => {
                self.history.push(Message::assistant(text.clone()));
                tracing::debug!(session = %self.id, history = self.history.len(), "Turn answered by model");
                Ok(Reply {
                    text,
                    source: ReplySource::Model,
                })
            }
            Err(e) if e.completion_kind().is_some_and(|k| k.is_rate_or_quota()) => {
                tracing::warn!(session = %self.id, error = %e, "Completion unavailable, session degraded");
                self.state = SessionState::Degraded;
                let text = fallback_response(user_text);
                self.history.push(Message::assistant(text));
                Ok(Reply {
                    text: text.to_string(),
                    source: ReplySource::Fallback,
                })
            }
            Err(e) => {
                tracing::error!(session = %self.id, error = %e, "Turn failed");
                self.history.push(Message::assistant(format!("Error: {}", e)));
                Err(e)
            }
        }
    }

    fn reply_from_fallback(&mut self, user_text: &str) -> Reply {
        let text = fallback_response(user_text);
        self.history.push(Message::user(user_text));
        self.history.push(Message::assistant(text));
        tracing::debug!(session = %self.id, "Degraded turn answered by fallback");
        Reply {
            text: text.to_string(),
            source: ReplySource::Fallback,
        }
    }

    pub fn switch_model(&mut self, model: &str) -> Result<(), ChatError> {
        let model = model.trim();
        if model.is_empty() {
            return Err(ChatError::configuration("Model id must not be empty"));
        }
        tracing::info!(session = %self.id, from = %self.config.model, to = model, "Model switched");
        self.config.model = model.to_string();
        Ok(())
    }

    pub fn switch_persona(&mut self, persona: &str) -> Result<Persona, ChatError> {
        let persona: Persona = persona.parse()?;
        tracing::info!(session = %self.id, persona = %persona, "Persona switched");
        self.config.persona = persona;
        Ok(persona)
    }

    /// Clear history and return to `Ready`, dropping any degraded state.
    pub fn reset(&mut self) {
        self.history.clear();
        self.state = SessionState::Ready;
        tracing::info!(session = %self.id, "Session reset");
    }

    /// `Degraded` -> `Ready`. Returns whether a transition happened.
    pub fn recover(&mut self) -> bool {
        if self.state == SessionState::Degraded {
            self.state = SessionState::Ready;
            tracing::info!(session = %self.id, "Session recovered");
            true
        } else {
            false
        }
    }

    /// Replace history with a loaded transcript.
    pub fn restore(&mut self, messages: Vec<Message>) {
        self.reset();
        self.history.extend(messages);
        tracing::info!(session = %self.id, messages = self.history.len(), "History restored");
    }

    /// Chunk and embed `documents`, then swap the new index in.
    pub async fn build_index(&mut self, documents: Vec<LoadedDocument>) -> Result<IndexReport, ChatError> {
        let service = self
            .index_service
            .clone()
            .ok_or_else(|| ChatError::configuration("No embedding backend configured for indexing"))?;
        let chunks = chunk_documents(&documents, &self.config.chunker)?;

        let started = Instant::now();
        let (index, mut report) = tokio::time::timeout(self.config.index_timeout, service.build_index(chunks))
            .await
            .map_err(|_| ChatError::timeout("index build", started.elapsed()))??;
        report.documents_processed = documents
            .iter()
            .map(|d| &d.metadata.path)
            .collect::<HashSet<_>>()
            .len();

        self.index = Some(Arc::new(index));
        tracing::info!(
            session = %self.id,
            documents = report.documents_processed,
            chunks = report.total_chunks,
            "Document index replaced"
        );
        Ok(report)
    }

    /// Load files and directories on the blocking pool, then `build_index`.
    pub async fn build_index_from_paths(&mut self, paths: Vec<PathBuf>) -> Result<IndexReport, ChatError> {
        let loaded = tokio::task::spawn_blocking(move || load_paths(&paths))
            .await
            .map_err(|e| ChatError::embedding(format!("Document loading task failed: {}", e)))??;
        let mut report = self.build_index(loaded.documents).await?;
        report.skipped = loaded.skipped;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionClient, RetryPolicy};
    use crate::error::{CompletionError, CompletionErrorKind};
    use crate::protocol::{CompletionRequest, DocumentFormat, SourceMetadata};
    use crate::rag::{EmbeddingCache, HashingEmbedder, Retriever};
    use crate::responder::{build_responder, PlainResponder};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedClient {
        result: Result<String, CompletionErrorKind>,
        calls: AtomicUsize,
    }

    impl FixedClient {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(kind: CompletionErrorKind) -> Arc<Self> {
            Arc::new(Self {
                result: Err(kind),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for FixedClient {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Ok(text) => Ok(text.clone()),
                Err(kind) => Err(CompletionError::new(*kind, "scripted failure")),
            }
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::from_settings(&AppSettings {
            max_retries: 0,
            ..AppSettings::default()
        })
        .unwrap()
    }

    fn plain_session(client: Arc<FixedClient>) -> ConversationSession {
        let retry = RetryPolicy {
            delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(5),
            fallback_model: None,
        };
        ConversationSession::new(config(), Arc::new(PlainResponder::new(client, retry)))
    }

    fn index_service() -> IndexService {
        IndexService::new(
            Arc::new(HashingEmbedder::new(64)),
            Arc::new(EmbeddingCache::in_memory("hashing-64", 64, 100)),
            2,
        )
    }

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

    #[tokio::test]
    async fn test_submit_opens_and_appends_turn() {
        let client = FixedClient::ok("Paris");
        let mut session = plain_session(client.clone());
        assert_eq!(session.state(), SessionState::Uninitialized);

        let reply = session.submit("capital of France?").await.unwrap();
        assert_eq!(reply.text, "Paris");
        assert_eq!(reply.source, ReplySource::Model);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.history().len(), 2);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_quota_failure_degrades_and_stops_calling_client() {
        let client = FixedClient::failing(CompletionErrorKind::QuotaExceeded);
        let mut session = plain_session(client.clone());

        let reply = session.submit("what time is it?").await.unwrap();
        assert_eq!(reply.source, ReplySource::Fallback);
        assert_eq!(session.state(), SessionState::Degraded);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);

        let before = session.history().len();
        let reply = session.submit("hello").await.unwrap();
        assert_eq!(reply.text, fallback_response("hello"));
        assert_eq!(session.history().len(), before + 2);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_failure_leaves_placeholder_and_returns_error() {
        let client = FixedClient::failing(CompletionErrorKind::Other);
        let mut session = plain_session(client);
        let err = session.submit("hi").await.unwrap_err();
        assert_eq!(err.completion_kind(), Some(CompletionErrorKind::Other));
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.history().len(), 2);
        assert!(session.history()[1].text.starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_recover_and_reset() {
        let client = FixedClient::failing(CompletionErrorKind::RateLimited);
        let mut session = plain_session(client);
        session.submit("hi").await.unwrap();
        assert_eq!(session.state(), SessionState::Degraded);
        assert!(session.recover());
        assert!(!session.recover());
        assert_eq!(session.history().len(), 2);

        session.submit("hi").await.unwrap();
        session.reset();
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_switches_do_not_touch_history() {
        let mut session = plain_session(FixedClient::ok("ok"));
        session.submit("hi").await.unwrap();
        session.switch_model("gpt-4o-mini").unwrap();
        assert_eq!(session.switch_persona("technical").unwrap(), Persona::Technical);
        assert!(session.switch_model("   ").unwrap_err().is_fatal());
        assert!(session.switch_persona("pirate").unwrap_err().is_fatal());
        assert_eq!(session.model(), "gpt-4o-mini");
        assert_eq!(session.persona(), Persona::Technical);
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn test_retrieval_without_index_leaves_history_untouched() {
        let client = FixedClient::ok("ok");
        let responder = build_responder(
            ResponderMode::Retrieval,
            client.clone(),
            RetryPolicy::default(),
            Some(Retriever::new(index_service())),
            2,
        )
        .unwrap();
        let mut session = ConversationSession::new(config(), responder).with_index_service(index_service());

        let err = session.submit("what colour is the sky?").await.unwrap_err();
        assert!(matches!(err, ChatError::IndexUnavailable));
        assert!(session.history().is_empty());
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);

        let report = session
            .build_index(vec![doc("sky.txt", "The sky is blue."), doc("grass.txt", "Grass is green.")])
            .await
            .unwrap();
        assert_eq!(report.total_chunks, 2);
        assert_eq!(report.documents_processed, 2);
        assert_eq!(session.submit("what colour is the sky?").await.unwrap().text, "ok");
    }

    #[tokio::test]
    async fn test_rebuild_swaps_index_and_old_snapshot_survives() {
        let mut session = plain_session(FixedClient::ok("ok")).with_index_service(index_service());
        session.build_index(vec![doc("a.txt", "first corpus")]).await.unwrap();
        let old = session.index().unwrap();

        session
            .build_index(vec![doc("b.txt", "second corpus"), doc("c.txt", "third")])
            .await
            .unwrap();
        assert_eq!(old.len(), 1);
        assert_eq!(session.index().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_build_index_without_service_is_configuration_error() {
        let mut session = plain_session(FixedClient::ok("ok"));
        let err = session.build_index(vec![doc("a.txt", "x")]).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_restore_replaces_history() {
        let mut session = plain_session(FixedClient::ok("ok"));
        session.submit("one").await.unwrap();
        session.restore(vec![Message::user("a"), Message::assistant("b"), Message::user("c")]);
        assert_eq!(session.history().len(), 3);
        assert_eq!(session.history()[2].text, "c");
        assert_eq!(session.state(), SessionState::Ready);
    }
}
