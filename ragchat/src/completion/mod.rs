//! Hosted chat-completion boundary.
//!
//! `CompletionClient` is the only seam the session talks through; the HTTP
//! implementation targets OpenAI-compatible `/chat/completions` endpoints and
//! `RetryPolicy` wraps any client with bounded retries, per-attempt timeouts
//! and a one-shot cheaper-model fallback.

mod http_client;
mod request_builder;
mod retry;

use crate::error::CompletionError;
use crate::protocol::CompletionRequest;
use async_trait::async_trait;

pub use http_client::{classify_http_error, OpenAiCompletionClient, DEFAULT_API_BASE_URL};
pub use request_builder::{build_chat_request_body, build_completion_request};
pub use retry::RetryPolicy;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// One round-trip; retries are the caller's concern.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}
