use super::request_builder::build_chat_request_body;
use super::CompletionClient;
use crate::error::{ChatError, CompletionError};
use crate::protocol::CompletionRequest;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

/// Default hosted endpoint
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for any OpenAI-compatible chat completions endpoint
pub struct OpenAiCompletionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompletionClient {
    /// A missing or blank API key is a configuration error.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ChatError> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ChatError::configuration("No API key configured. Set OPENAI_API_KEY or pass --api-key.")
            })?;
        let base_url = base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ChatError::configuration("api_base_url must not be empty"));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        })
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let url = self.completions_url();
        let body = build_chat_request_body(request);
        tracing::debug!(
            url = %url,
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    CompletionError::transient(format!("Request to {} failed: {}", url, e))
                } else {
                    CompletionError::other(format!("Request to {} failed: {}", url, e))
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| CompletionError::transient(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            let err = classify_http_error(status, &text);
            tracing::warn!(status = status.as_u16(), kind = ?err.kind, "Completion request failed");
            return Err(err);
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| CompletionError::other(format!("Malformed completion response: {}", e)))?;
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CompletionError::other("Completion response has no message content"))
    }
}

/// Map a non-success HTTP response onto the completion error taxonomy.
pub fn classify_http_error(status: StatusCode, body: &str) -> CompletionError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().map(|v| &v["error"]);
    let field = |name: &str| {
        error
            .and_then(|e| e[name].as_str())
            .unwrap_or_default()
            .to_string()
    };
    let message = {
        let m = field("message");
        if m.is_empty() {
            format!("HTTP {}: {}", status, body.chars().take(300).collect::<String>())
        } else {
            format!("HTTP {}: {}", status, m)
        }
    };

    if status == StatusCode::TOO_MANY_REQUESTS {
        if field("code") == "insufficient_quota" || field("type") == "insufficient_quota" {
            CompletionError::quota_exceeded(message)
        } else {
            CompletionError::rate_limited(message)
        }
    } else if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        CompletionError::transient(message)
    } else {
        CompletionError::other(message)
    }
}
