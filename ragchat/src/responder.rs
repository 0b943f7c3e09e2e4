//! Responder strategies.
//!
//! A responder turns one `TurnContext` into reply text. `PlainResponder`
//! prompts with persona and history only; `RetrievalResponder` first pulls the
//! top-k chunks for the user's text and injects them as context.

use crate::completion::{build_completion_request, CompletionClient, RetryPolicy};
use crate::error::ChatError;
use crate::persona::Persona;
use crate::protocol::{Message, ScoredChunk};
use crate::rag::{DocumentIndex, Retriever};
use crate::settings::ResponderMode;
use crate::system_prompt::assemble_prompt;
use async_trait::async_trait;
use std::sync::Arc;

/// Everything a responder may read for one turn
pub struct TurnContext<'a> {
    pub persona: Persona,
    pub model: &'a str,
    pub temperature: f32,
    pub max_retries: u32,
    /// History before the turn being answered
    pub history: &'a [Message],
    pub user_text: &'a str,
    pub index: Option<&'a DocumentIndex>,
}

#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, ctx: &TurnContext<'_>) -> Result<String, ChatError>;

    /// Whether a turn cannot be answered without a built index
    fn requires_index(&self) -> bool {
        false
    }

    fn mode(&self) -> ResponderMode;
}

async fn complete_with_context(
    client: &dyn CompletionClient,
    retry: &RetryPolicy,
    ctx: &TurnContext<'_>,
    context_chunks: &[ScoredChunk],
) -> Result<String, ChatError> {
    let messages = assemble_prompt(ctx.persona, context_chunks, ctx.history, ctx.user_text);
    let request = build_completion_request(ctx.model, ctx.temperature, messages, ctx.max_retries);
    retry.execute(client, &request).await
}

pub struct PlainResponder {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
}

impl PlainResponder {
    pub fn new(client: Arc<dyn CompletionClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl Responder for PlainResponder {
    async fn respond(&self, ctx: &TurnContext<'_>) -> Result<String, ChatError> {
        complete_with_context(self.client.as_ref(), &self.retry, ctx, &[]).await
    }

    fn mode(&self) -> ResponderMode {
        ResponderMode::Plain
    }
}

pub struct RetrievalResponder {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    retriever: Retriever,
    top_k: usize,
}

impl RetrievalResponder {
    pub fn new(client: Arc<dyn CompletionClient>, retry: RetryPolicy, retriever: Retriever, top_k: usize) -> Self {
        Self {
            client,
            retry,
            retriever,
            top_k,
        }
    }
}

#[async_trait]
impl Responder for RetrievalResponder {
    async fn respond(&self, ctx: &TurnContext<'_>) -> Result<String, ChatError> {
        let chunks = self.retriever.retrieve(ctx.user_text, ctx.index, self.top_k).await?;
        complete_with_context(self.client.as_ref(), &self.retry, ctx, &chunks).await
    }

    fn requires_index(&self) -> bool {
        true
    }

    fn mode(&self) -> ResponderMode {
        ResponderMode::Retrieval
    }
}

/// Build the responder for `mode`. Retrieval needs a retriever.
pub fn build_responder(
    mode: ResponderMode,
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    retriever: Option<Retriever>,
    top_k: usize,
) -> Result<Arc<dyn Responder>, ChatError> {
    match mode {
        ResponderMode::Plain => Ok(Arc::new(PlainResponder::new(client, retry))),
        ResponderMode::Retrieval => {
            let retriever = retriever
                .ok_or_else(|| ChatError::configuration("Retrieval mode requires an embedding backend"))?;
            if top_k == 0 {
                return Err(ChatError::configuration("top_k must be at least 1"));
            }
            Ok(Arc::new(RetrievalResponder::new(client, retry, retriever, top_k)))
        }
    }
}
