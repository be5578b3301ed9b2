//! Shared fixtures for integration tests: scripted and routing model
//! backends plus a few small tools.

#![allow(dead_code)]

use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stride::api::{BackendFuture, LlmClient, ModelBackend, RetryConfig};
use stride::error::{ProviderError, ToolError};
use stride::tools::{FnTool, TASK_DONE};
use stride::{ChatRequest, ModelResponse, ToolCall, ToolDef, json_schema_for};

// ── Responses ──────────────────────────────────────────────────────

pub fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall::new(id, name, args.to_string())
}

pub fn done(result: &str) -> ModelResponse {
    ModelResponse::tool_calls(vec![call(
        "done",
        TASK_DONE,
        serde_json::json!({ "result": result }),
    )])
}

pub fn text(content: &str) -> ModelResponse {
    ModelResponse::text(content)
}

pub fn calls(calls: Vec<ToolCall>) -> ModelResponse {
    ModelResponse::tool_calls(calls)
}

// ── Scripted backend ───────────────────────────────────────────────

/// Replays a fixed sequence of replies and records every request.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<ModelResponse, ProviderError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, request: &ChatRequest) -> BackendFuture<'_> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            next.unwrap_or_else(|| Err(ProviderError::Terminal("script exhausted".into())))
        })
    }
}

pub fn scripted_results(
    script: Vec<Result<ModelResponse, ProviderError>>,
) -> (LlmClient, Arc<ScriptedBackend>) {
    build(script, None)
}

pub fn scripted(responses: Vec<ModelResponse>) -> (LlmClient, Arc<ScriptedBackend>) {
    build(responses.into_iter().map(Ok).collect(), None)
}

/// Like [`scripted`], but every reply takes `delay` to arrive.
pub fn slow(responses: Vec<ModelResponse>, delay: Duration) -> (LlmClient, Arc<ScriptedBackend>) {
    build(responses.into_iter().map(Ok).collect(), Some(delay))
}

fn build(
    script: Vec<Result<ModelResponse, ProviderError>>,
    delay: Option<Duration>,
) -> (LlmClient, Arc<ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend {
        script: Mutex::new(script.into()),
        requests: Mutex::new(Vec::new()),
        delay,
    });
    let client = LlmClient::new(backend.clone(), "test-model").with_retry(RetryConfig::immediate());
    (client, backend)
}

// ── Routing backend ────────────────────────────────────────────────

type Route = Box<dyn Fn(&ChatRequest) -> Result<ModelResponse, ProviderError> + Send + Sync>;
type Delay = Box<dyn Fn(&ChatRequest) -> Duration + Send + Sync>;

/// Answers each request with a closure, for flows whose call order depends
/// on the request content.
pub struct RoutingBackend {
    route: Route,
    delay: Delay,
    calls: AtomicUsize,
}

impl RoutingBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelBackend for RoutingBackend {
    fn name(&self) -> &str {
        "routing"
    }

    fn complete(&self, request: &ChatRequest) -> BackendFuture<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = (self.route)(request);
        let delay = (self.delay)(request);
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            reply
        })
    }
}

pub fn routing(
    route: impl Fn(&ChatRequest) -> Result<ModelResponse, ProviderError> + Send + Sync + 'static,
) -> (LlmClient, Arc<RoutingBackend>) {
    routing_with_delay(route, |_| Duration::ZERO)
}

/// Like [`routing`], with a per-request reply delay.
pub fn routing_with_delay(
    route: impl Fn(&ChatRequest) -> Result<ModelResponse, ProviderError> + Send + Sync + 'static,
    delay: impl Fn(&ChatRequest) -> Duration + Send + Sync + 'static,
) -> (LlmClient, Arc<RoutingBackend>) {
    let backend = Arc::new(RoutingBackend {
        route: Box::new(route),
        delay: Box::new(delay),
        calls: AtomicUsize::new(0),
    });
    let client = LlmClient::new(backend.clone(), "test-model").with_retry(RetryConfig::immediate());
    (client, backend)
}

pub fn system_text(request: &ChatRequest) -> &str {
    request
        .messages
        .first()
        .and_then(|m| m.content.as_deref())
        .unwrap_or("")
}

pub fn user_text(request: &ChatRequest) -> &str {
    request
        .messages
        .get(1)
        .and_then(|m| m.content.as_deref())
        .unwrap_or("")
}

// ── Tools ──────────────────────────────────────────────────────────

#[derive(Deserialize, schemars::JsonSchema)]
pub struct EchoArgs {
    pub text: String,
}

pub fn echo_tool() -> FnTool {
    FnTool::new(
        ToolDef::new("echo", "Echo the text back.", json_schema_for::<EchoArgs>()),
        |args: EchoArgs| async move { Ok(args.text) },
    )
}

#[derive(Deserialize, schemars::JsonSchema)]
pub struct FailArgs {
    pub fatal: bool,
}

pub fn failing_tool() -> FnTool {
    FnTool::new(
        ToolDef::new("fail", "Always fails.", json_schema_for::<FailArgs>()),
        |args: FailArgs| async move {
            if args.fatal {
                Err(ToolError::NonRecoverable("disk is gone".into()))
            } else {
                Err(ToolError::Execution("try again".into()))
            }
        },
    )
}

/// Fails with a recoverable error on its first call, then echoes.
pub fn flaky_tool(calls: Arc<AtomicUsize>) -> FnTool {
    FnTool::new(
        ToolDef::new("flaky", "Echo the text; the first call fails.", json_schema_for::<EchoArgs>()),
        move |args: EchoArgs| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ToolError::Execution("service warming up".into()))
                } else {
                    Ok(args.text)
                }
            }
        },
    )
}

#[derive(Deserialize, schemars::JsonSchema)]
pub struct SleepArgs {
    pub ms: u64,
    pub label: String,
}

/// Sleeps for `ms`, tracking the peak number of concurrent executions.
pub fn sleep_tool(in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> FnTool {
    FnTool::new(
        ToolDef::new("sleep", "Sleep, then echo the label.", json_schema_for::<SleepArgs>()),
        move |args: SleepArgs| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(args.ms)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(args.label)
            }
        },
    )
}
