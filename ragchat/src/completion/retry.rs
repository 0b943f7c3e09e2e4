use super::CompletionClient;
use crate::error::{ChatError, CompletionError};
use crate::protocol::CompletionRequest;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};

/// Bounded retry with a fixed delay, per-attempt timeouts and a single
/// fallback-model attempt after rate or quota exhaustion.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub attempt_timeout: Duration,
    /// Cheaper model tried once when the primary is rate limited or out of quota
    pub fallback_model: Option<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1000),
            attempt_timeout: Duration::from_secs(60),
            fallback_model: None,
        }
    }
}

enum AttemptError {
    Completion(CompletionError),
    TimedOut(Duration),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Completion(e) => e.kind.is_retryable(),
            AttemptError::TimedOut(_) => true,
        }
    }

    fn into_chat_error(self) -> ChatError {
        match self {
            AttemptError::Completion(e) => ChatError::Completion(e),
            AttemptError::TimedOut(elapsed) => ChatError::timeout("completion", elapsed),
        }
    }
}

impl RetryPolicy {
    /// Run `request` through `client`: up to `request.max_retries` extra
    /// attempts, then the fallback model once if the last failure was rate or
    /// quota related.
    pub async fn execute(
        &self,
        client: &dyn CompletionClient,
        request: &CompletionRequest,
    ) -> Result<String, ChatError> {
        let mut attempt = 0;
        let failure = loop {
            match self.attempt(client, request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < request.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = request.max_retries,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %describe(&e),
                        "Completion attempt failed, retrying"
                    );
                    sleep(self.delay).await;
                }
                Err(e) => break e,
            }
        };

        let rate_or_quota = matches!(&failure, AttemptError::Completion(e) if e.kind.is_rate_or_quota());
        match &self.fallback_model {
            Some(fallback) if rate_or_quota && fallback != &request.model => {
                tracing::warn!(
                    model = %request.model,
                    fallback = %fallback,
                    error = %describe(&failure),
                    "Primary model exhausted, trying fallback model"
                );
                let mut fallback_request = request.clone();
                fallback_request.model = fallback.clone();
                match self.attempt(client, &fallback_request).await {
                    Ok(text) => Ok(text),
                    Err(fallback_err) => {
                        tracing::warn!(error = %describe(&fallback_err), "Fallback model failed");
                        Err(failure.into_chat_error())
                    }
                }
            }
            _ => Err(failure.into_chat_error()),
        }
    }

    async fn attempt(
        &self,
        client: &dyn CompletionClient,
        request: &CompletionRequest,
    ) -> Result<String, AttemptError> {
        let started = Instant::now();
        match timeout(self.attempt_timeout, client.complete(request)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(AttemptError::Completion(e)),
            Err(_) => Err(AttemptError::TimedOut(started.elapsed())),
        }
    }
}

fn describe(err: &AttemptError) -> String {
    match err {
        AttemptError::Completion(e) => e.to_string(),
        AttemptError::TimedOut(elapsed) => format!("timed out after {}ms", elapsed.as_millis()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionErrorKind;
    use crate::protocol::ChatMessage;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Step {
        Reply(&'static str),
        Fail(CompletionErrorKind),
        Hang,
    }

    struct ScriptedClient {
        steps: Mutex<VecDeque<Step>>,
        models: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                models: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.models.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
            self.models.lock().unwrap().push(request.model.clone());
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Reply(text)) => Ok(text.to_string()),
                Some(Step::Fail(kind)) => Err(CompletionError::new(kind, "scripted")),
                Some(Step::Hang) => {
                    sleep(Duration::from_secs(3600)).await;
                    Ok("too late".to_string())
                }
                None => Err(CompletionError::other("script exhausted")),
            }
        }
    }

    fn policy(fallback: Option<&str>) -> RetryPolicy {
        RetryPolicy {
            delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(50),
            fallback_model: fallback.map(str::to_string),
        }
    }

    fn request(max_retries: u32) -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            messages: vec![ChatMessage::user("hi")],
            max_retries,
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let client = ScriptedClient::new(vec![
            Step::Fail(CompletionErrorKind::Transient),
            Step::Reply("ok"),
        ]);
        let text = policy(None).execute(&client, &request(2)).await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let client = ScriptedClient::new(vec![
            Step::Fail(CompletionErrorKind::Transient),
            Step::Fail(CompletionErrorKind::Transient),
            Step::Fail(CompletionErrorKind::Transient),
            Step::Reply("never reached"),
        ]);
        let err = policy(None).execute(&client, &request(2)).await.unwrap_err();
        assert_eq!(err.completion_kind(), Some(CompletionErrorKind::Transient));
        assert_eq!(client.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let client = ScriptedClient::new(vec![Step::Fail(CompletionErrorKind::Other), Step::Reply("x")]);
        let err = policy(Some("gpt-4o-mini")).execute(&client, &request(3)).await.unwrap_err();
        assert_eq!(err.completion_kind(), Some(CompletionErrorKind::Other));
        assert_eq!(client.calls(), vec!["gpt-4o"]);
    }

    #[tokio::test]
    async fn test_quota_skips_retries_and_tries_fallback_once() {
        let client = ScriptedClient::new(vec![
            Step::Fail(CompletionErrorKind::QuotaExceeded),
            Step::Reply("from the cheaper model"),
        ]);
        let text = policy(Some("gpt-4o-mini")).execute(&client, &request(3)).await.unwrap();
        assert_eq!(text, "from the cheaper model");
        assert_eq!(client.calls(), vec!["gpt-4o", "gpt-4o-mini"]);
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_returns_original_error_when_fallback_fails() {
        let client = ScriptedClient::new(vec![
            Step::Fail(CompletionErrorKind::RateLimited),
            Step::Fail(CompletionErrorKind::RateLimited),
            Step::Fail(CompletionErrorKind::Other),
        ]);
        let err = policy(Some("gpt-4o-mini")).execute(&client, &request(1)).await.unwrap_err();
        assert_eq!(err.completion_kind(), Some(CompletionErrorKind::RateLimited));
        assert_eq!(client.calls(), vec!["gpt-4o", "gpt-4o", "gpt-4o-mini"]);
    }

    #[tokio::test]
    async fn test_fallback_skipped_when_same_model() {
        let client = ScriptedClient::new(vec![Step::Fail(CompletionErrorKind::QuotaExceeded)]);
        let err = policy(Some("gpt-4o")).execute(&client, &request(0)).await.unwrap_err();
        assert_eq!(err.completion_kind(), Some(CompletionErrorKind::QuotaExceeded));
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_hung_attempt_times_out() {
        let client = ScriptedClient::new(vec![Step::Hang, Step::Hang]);
        let err = policy(None).execute(&client, &request(1)).await.unwrap_err();
        assert!(matches!(err, ChatError::Timeout { operation: "completion", .. }));
        assert_eq!(client.calls().len(), 2);
    }
}
