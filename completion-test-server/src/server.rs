//! Completion test server for ragchat (dev edition)
//!
//! - Serves `POST /v1/chat/completions` with scripted or echoed replies
//! - Can simulate rate limiting, exhausted quota, server errors and slow replies
//! - Records every request body so tests can assert on the assembled prompt

use axum::{
    extract::State as AxumState,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

// -----------------------------------------------------------------------------
// Constants
// -----------------------------------------------------------------------------

pub const DEFAULT_HOST: &str = "127.0.0.1";
// Use a less common default port to reduce clashes with local services.
pub const DEFAULT_PORT: u16 = 43031;

// -----------------------------------------------------------------------------
// CLI
// -----------------------------------------------------------------------------

#[derive(Parser, Debug, Clone)]
#[command(name = "completion-test-server", about = "Scriptable chat completion server")]
pub struct CliArgs {
    /// Host interface to bind
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,
    /// Port to bind (0 picks an ephemeral port)
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Reply with the last user message instead of a canned sentence
    #[arg(long, default_value_t = true, value_parser = clap::builder::BoolishValueParser::new(), action = clap::ArgAction::Set)]
    pub echo: bool,
    /// Answer every request with 429 rate_limit_exceeded
    #[arg(long, default_value_t = false, value_parser = clap::builder::BoolishValueParser::new(), action = clap::ArgAction::Set)]
    pub rate_limited: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            echo: true,
            rate_limited: false,
        }
    }
}

// -----------------------------------------------------------------------------
// Scripted replies
// -----------------------------------------------------------------------------

/// One scripted outcome for the next completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptedReply {
    Text { content: String },
    RateLimited,
    QuotaExceeded,
    ServerError { status: u16 },
    Delay { millis: u64, content: String },
}

impl ScriptedReply {
    pub fn text(content: impl Into<String>) -> Self {
        ScriptedReply::Text {
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogEntry {
    timestamp: String,
    level: String,
    message: String,
}

#[derive(Debug)]
struct SharedState {
    script: Mutex<VecDeque<ScriptedReply>>,
    requests: RwLock<Vec<Value>>,
    logs: RwLock<Vec<LogEntry>>,
    served: AtomicU64,
    echo: bool,
    always_rate_limited: bool,
}

impl SharedState {
    fn new(script: Vec<ScriptedReply>, echo: bool, always_rate_limited: bool) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: RwLock::new(Vec::new()),
            logs: RwLock::new(Vec::new()),
            served: AtomicU64::new(0),
            echo,
            always_rate_limited,
        }
    }

    async fn log(&self, level: &str, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_string(),
            message: message.into(),
        };
        let mut logs = self.logs.write().await;
        if logs.len() >= 500 {
            logs.drain(0..100);
        }
        logs.push(entry);
    }

    async fn next_reply(&self, body: &Value) -> ScriptedReply {
        if self.always_rate_limited {
            return ScriptedReply::RateLimited;
        }
        if let Some(reply) = self.script.lock().await.pop_front() {
            return reply;
        }
        if self.echo {
            ScriptedReply::text(last_user_content(body).unwrap_or_default())
        } else {
            ScriptedReply::text("This is a test completion.")
        }
    }
}

fn last_user_content(body: &Value) -> Option<String> {
    body["messages"]
        .as_array()?
        .iter()
        .rev()
        .find(|m| m["role"] == "user")
        .and_then(|m| m["content"].as_str())
        .map(str::to_string)
}

// -----------------------------------------------------------------------------
// In-process handle for tests
// -----------------------------------------------------------------------------

/// A server bound to an ephemeral port inside the current runtime.
pub struct TestServerHandle {
    pub addr: SocketAddr,
    state: Arc<SharedState>,
    task: JoinHandle<()>,
}

impl TestServerHandle {
    /// Base URL in the form the ragchat client expects (`http://host:port/v1`).
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Number of completion requests served so far.
    pub fn request_count(&self) -> u64 {
        self.state.served.load(Ordering::SeqCst)
    }

    /// Captured request bodies, oldest first.
    pub async fn requests(&self) -> Vec<Value> {
        self.state.requests.read().await.clone()
    }

    /// Queue more scripted replies behind the existing ones.
    pub async fn push_replies(&self, replies: Vec<ScriptedReply>) {
        self.state.script.lock().await.extend(replies);
    }
}

impl Drop for TestServerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Bind on 127.0.0.1:0 and serve the given script, echoing once it runs out.
pub async fn spawn(
    script: Vec<ScriptedReply>,
) -> Result<TestServerHandle, Box<dyn std::error::Error + Send + Sync>> {
    let state = Arc::new(SharedState::new(script, true, false));
    let listener = tokio::net::TcpListener::bind((DEFAULT_HOST, 0)).await?;
    let addr = listener.local_addr()?;
    let app = router(state.clone());
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("[completion-test-server] server exited: {}", e);
        }
    });
    Ok(TestServerHandle { addr, state, task })
}

// -----------------------------------------------------------------------------
// Entry point
// -----------------------------------------------------------------------------

pub async fn run_with_args(args: CliArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!(
        "[completion-test-server] starting (host={}, port={}, echo={}, rate_limited={})",
        args.host, args.port, args.echo, args.rate_limited
    );
    let state = Arc::new(SharedState::new(Vec::new(), args.echo, args.rate_limited));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    println!(
        "[completion-test-server] listening on http://{}/v1/chat/completions",
        actual_addr
    );
    state
        .log("info", format!("Listening on http://{}", actual_addr))
        .await;

    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(completions_handler))
        .route("/api/requests", get(requests_handler))
        .route("/api/logs", get(logs_handler))
        .route("/api/script", post(script_handler))
        .with_state(state)
}

// -----------------------------------------------------------------------------
// Handlers
// -----------------------------------------------------------------------------

async fn completions_handler(
    AxumState(state): AxumState<Arc<SharedState>>,
    Json(body): Json<Value>,
) -> Response {
    let n = state.served.fetch_add(1, Ordering::SeqCst) + 1;
    let model = body["model"].as_str().unwrap_or("unknown").to_string();
    state.requests.write().await.push(body.clone());

    let reply = state.next_reply(&body).await;
    state
        .log("info", format!("request #{} model={} -> {:?}", n, model, reply))
        .await;

    match reply {
        ScriptedReply::Text { content } => completion_body(&model, &content).into_response(),
        ScriptedReply::Delay { millis, content } => {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            completion_body(&model, &content).into_response()
        }
        ScriptedReply::RateLimited => error_body(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limit_exceeded",
            "Rate limit reached for requests",
        ),
        ScriptedReply::QuotaExceeded => error_body(
            StatusCode::TOO_MANY_REQUESTS,
            "insufficient_quota",
            "You exceeded your current quota, please check your plan and billing details.",
        ),
        ScriptedReply::ServerError { status } => error_body(
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            "server_error",
            "The server had an error while processing your request.",
        ),
    }
}

fn completion_body(model: &str, content: &str) -> Json<Value> {
    Json(json!({
        "id": format!("chatcmpl-test-{}", Utc::now().timestamp_millis()),
        "object": "chat.completion",
        "created": Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    }))
}

fn error_body(status: StatusCode, code: &str, message: &str) -> Response {
    let body = json!({
        "error": {
            "message": message,
            "type": code,
            "code": code,
        }
    });
    (status, Json(body)).into_response()
}

async fn requests_handler(AxumState(state): AxumState<Arc<SharedState>>) -> Json<Value> {
    let requests = state.requests.read().await.clone();
    Json(json!({"count": requests.len(), "requests": requests}))
}

async fn logs_handler(AxumState(state): AxumState<Arc<SharedState>>) -> Json<Value> {
    let logs = state.logs.read().await.clone();
    Json(json!({"logs": logs}))
}

async fn script_handler(
    AxumState(state): AxumState<Arc<SharedState>>,
    Json(replies): Json<Vec<ScriptedReply>>,
) -> Json<Value> {
    let queued = {
        let mut script = state.script.lock().await;
        script.extend(replies);
        script.len()
    };
    state
        .log("info", format!("script extended, {} replies queued", queued))
        .await;
    Json(json!({"status": "accepted", "queued": queued}))
}
