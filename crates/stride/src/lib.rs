//! Autonomous tool-use agent runtime with a long-context decomposition pipeline.
//!
//! `stride` drives a language model through a bounded step loop: each step
//! sends the conversation, decodes the tool invocations in the reply, runs
//! them through a [`ToolRegistry`](tools::core::ToolRegistry) and appends the
//! results. The task ends when the model calls the `task_done` completion
//! tool, when the step budget runs out, or on a fatal failure. Plain text
//! replies never end a task.
//!
//! For documents that do not fit in one model call,
//! [`LongContextAgent`](longctx::LongContextAgent) splits the input into
//! overlapping structure-aware chunks, asks the model for a tailored
//! per-chunk instruction, runs the step loop once per chunk and synthesizes
//! the partial answers into one, naming any chunk that produced nothing.
//!
//! # Getting started
//!
//! ```ignore
//! use stride::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api_key = std::env::var("STRIDE_API_KEY")?;
//!     let backend = HttpBackend::new(Provider::OpenRouter, api_key)?;
//!     let client = LlmClient::new(backend, DEFAULT_MODEL);
//!
//!     let tools = ToolRegistry::new().with(ThinkTool);
//!     let config = AgentConfig::new().with_max_steps(10);
//!
//!     let execution = Harness::new(&client, &tools, config)
//!         .with_event_handler(&LoggingHandler)
//!         .new_task("Summarize the plot of Hamlet in two sentences.", Default::default())
//!         .execute()
//!         .await;
//!
//!     println!("{}", execution.final_result.unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | [`Harness`](agent::harness::Harness) step loop, task, conversation, trajectory, events |
//! | [`tools`] | [`Tool`](tools::core::Tool) trait, [`ToolRegistry`](tools::core::ToolRegistry), built-in tools |
//! | [`longctx`] | chunk planner, instruction enhancer, chunk processor, result integrator |
//! | [`api`] | [`ModelBackend`](api::backend::ModelBackend), [`LlmClient`](api::backend::LlmClient), retry |
//! | [`error`] | provider, tool, plan and integration errors |

pub mod agent;
pub mod api;
pub mod error;
pub mod longctx;
pub mod prelude;
pub mod tools;

use api::backend::{BackendFuture, ModelBackend, Provider};
use error::ProviderError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

/// Default model for all LLM calls.
pub const DEFAULT_MODEL: &str = "z-ai/glm-4.6";

/// HTTP timeout for a single chat completion request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. This is the bridge between strong Rust types
/// and the `serde_json::Value` that the function-calling API expects.
///
/// # Example
///
/// ```
/// use stride::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct LookupArgs {
///     term: String,
///     #[serde(default)]
///     limit: Option<u32>,
/// }
///
/// let schema = json_schema_for::<LookupArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"term".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body in the OpenAI-compatible format. Unset
/// optional fields are omitted from serialization.
#[derive(Serialize, Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::assistant(Some(content.into()), Vec::new())
    }

    /// Assistant turn carrying optional text and zero or more tool calls.
    pub fn assistant(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
            tool_calls: (!calls.is_empty()).then_some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the API (OpenAI function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    /// Create a function-calling tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The type of a tool call. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call as it appears on the wire. `arguments` is a JSON string.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

fn default_call_type() -> CallType {
    CallType::Function
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FunctionCallData {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// One model reply: optional text plus zero or more tool calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

impl ModelResponse {
    /// A text-only reply.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// A reply that only invokes tools.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Default::default()
        }
    }
}

/// Token usage statistics.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Decode a raw response body into a [`ModelResponse`].
pub(crate) fn parse_chat_response(body: &str) -> Result<ModelResponse, ProviderError> {
    let parsed: RawChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Terminal(format!("failed to parse response: {e}")))?;

    if let Some(err) = parsed.error {
        return Err(ProviderError::Terminal(format!("API error: {}", err.message)));
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    let Some(choice) = parsed.choices.and_then(|c| c.into_iter().next()) else {
        debug!("LLM output: empty (no choices)");
        return Ok(ModelResponse {
            usage: parsed.usage,
            ..Default::default()
        });
    };

    let tool_calls = choice.message.tool_calls.unwrap_or_default();
    debug!(
        "LLM output: {} chars text, {} tool call(s)",
        choice.message.content.as_ref().map_or(0, |s| s.len()),
        tool_calls.len()
    );
    Ok(ModelResponse {
        content: choice.message.content,
        tool_calls,
        usage: parsed.usage,
        finish_reason: choice.finish_reason,
    })
}

// ── HTTP backend ───────────────────────────────────────────────────

/// [`ModelBackend`] for any OpenAI-compatible chat completions endpoint.
pub struct HttpBackend {
    client: reqwest::Client,
    api_key: String,
    provider: Provider,
}

impl HttpBackend {
    /// Create a backend for the given provider with bearer authentication.
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("stride/", env!("CARGO_PKG_VERSION")))
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Terminal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            provider,
        })
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    async fn post(&self, body: String) -> Result<ModelResponse, ProviderError> {
        let start = Instant::now();

        let mut request = self
            .client
            .post(self.provider.url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if self.provider == Provider::OpenRouter {
            request = request
                .header("HTTP-Referer", "https://github.com/stride-agent")
                .header("X-Title", "stride");
        }

        let resp = request.body(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), &text));
        }
        parse_chat_response(&text)
    }
}

impl ModelBackend for HttpBackend {
    fn name(&self) -> &str {
        self.provider.label()
    }

    fn complete(&self, request: &ChatRequest) -> BackendFuture<'_> {
        debug!(
            "LLM request: model={}, messages={}, tools={}, max_tokens={}, temp={}",
            request.model,
            request.messages.len(),
            request.tools.as_ref().map_or(0, |t| t.len()),
            request.max_tokens,
            request.temperature,
        );
        let body = serde_json::to_string(request);
        Box::pin(async move {
            let body = body.map_err(|e| {
                ProviderError::Terminal(format!("failed to encode request: {e}"))
            })?;
            trace!("Request payload size: {} bytes", body.len());
            self.post(body).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content.as_deref(), Some("hello"));

        let assist = Message::assistant(None, vec![ToolCall::new("c1", "think", "{}")]);
        assert_eq!(assist.role, MessageRole::Assistant);
        assert!(assist.content.is_none());
        assert_eq!(assist.tool_calls.as_ref().map(Vec::len), Some(1));

        let text_only = Message::assistant_text("done");
        assert!(text_only.tool_calls.is_none());

        let tool = Message::tool_result("call-1", "result");
        assert_eq!(tool.role, MessageRole::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call-1"));
    }

    #[test]
    fn chat_request_skips_unset_fields() {
        let req = ChatRequest {
            model: "test-model".into(),
            messages: vec![Message::user("hi")],
            max_tokens: 100,
            temperature: 0.5,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("top_p").is_none());
        assert!(json.get("tools").is_none());
        assert!(json.get("parallel_tool_calls").is_none());
        assert_eq!(json["max_tokens"], 100);
    }

    #[test]
    fn parse_response_with_tool_calls() {
        let body = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "task_done", "arguments": "{\"result\":\"42\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let resp = parse_chat_response(body).unwrap();
        assert!(resp.content.is_none());
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].function.name, "task_done");
        assert_eq!(resp.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(resp.usage.and_then(|u| u.total_tokens), Some(15));
    }

    #[test]
    fn parse_response_tolerates_missing_call_id() {
        let body = r#"{"choices":[{"message":{"tool_calls":[{"function":{"name":"think"}}]}}]}"#;
        let resp = parse_chat_response(body).unwrap();
        assert_eq!(resp.tool_calls[0].id, "");
        assert_eq!(resp.tool_calls[0].function.arguments, "");
    }

    #[test]
    fn api_error_payload_is_terminal() {
        let err = parse_chat_response(r#"{"error":{"message":"model not found"}}"#).unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("model not found"));
    }

    #[test]
    fn garbage_body_is_terminal() {
        let err = parse_chat_response("<html>oops</html>").unwrap_err();
        assert!(!err.is_transient());
    }
}
