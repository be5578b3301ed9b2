//! Tool abstraction and the registry that dispatches invocations.
//!
//! The [`Tool`] trait defines the interface every capability implements: a
//! static API definition (name, description, JSON schema) and an async
//! `execute` method. Tools are collected into a [`ToolRegistry`] which turns
//! every [`ToolInvocationRequest`] into exactly one [`ToolResult`], whatever
//! happens: unknown names, bad arguments, timeouts and tool errors all come
//! back as failed results rather than `Err`.

use crate::ToolDef;
use crate::error::ToolError;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Maximum size (in bytes) for tool output before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>>;

// ── Invocation types ───────────────────────────────────────────────

/// A decoded request from the model to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    /// Unique within the model response that produced it.
    pub id: String,
    pub name: String,
    /// Always a JSON object.
    pub arguments: serde_json::Value,
}

impl ToolInvocationRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Why a tool invocation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// No tool with the requested name is registered.
    UnknownTool,
    /// Arguments failed schema validation or typed decoding.
    InvalidArguments,
    /// The model's tool call could not be decoded at all.
    ParseError,
    /// The tool ran and reported a failure.
    Execution,
    /// The tool did not finish within the registry timeout.
    Timeout,
    /// The tool cannot continue; the task must stop.
    NonRecoverable,
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ToolErrorKind::UnknownTool => "unknown tool",
            ToolErrorKind::InvalidArguments => "invalid arguments",
            ToolErrorKind::ParseError => "parse error",
            ToolErrorKind::Execution => "execution error",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::NonRecoverable => "non-recoverable error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolErrorDetail {
    pub kind: ToolErrorKind,
    pub message: String,
}

/// Outcome of one invocation. Exactly one per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorDetail>,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, tool_name: impl Into<String>, output: String) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            success: true,
            output,
            error: None,
        }
    }

    pub fn failed(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        kind: ToolErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            success: false,
            output: String::new(),
            error: Some(ToolErrorDetail {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Whether this result must stop the task.
    pub fn is_fatal(&self) -> bool {
        self.error_kind() == Some(ToolErrorKind::NonRecoverable)
    }
}

// ── Tool trait ─────────────────────────────────────────────────────

/// A capability the model can invoke via function calling.
///
/// Uses a boxed future so that the trait is dyn-compatible (object-safe).
///
/// # Example
///
/// ```ignore
/// struct Lookup { index: Arc<Index> }
///
/// impl Tool for Lookup {
///     fn definition(&self) -> ToolDef { /* ... */ }
///
///     fn execute(&self, arguments: &serde_json::Value) -> ToolFuture<'_> {
///         let term = arguments["term"].as_str().map(str::to_string);
///         Box::pin(async move {
///             let term = term.ok_or_else(|| ToolError::InvalidArguments("missing 'term'".into()))?;
///             self.index.find(&term).map_err(|e| ToolError::Execution(e.to_string()))
///         })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// The tool definition sent to the model.
    fn definition(&self) -> ToolDef;

    /// Run the tool with already-decoded JSON arguments.
    fn execute(&self, arguments: &serde_json::Value) -> ToolFuture<'_>;

    /// The tool's name (convenience, delegates to definition).
    fn name(&self) -> String {
        self.definition().function.name
    }
}

// ── ToolRegistry ───────────────────────────────────────────────────

/// A collection of tools dispatched by name.
///
/// Immutable once built, so one registry can be shared by reference between
/// concurrently running tasks.
///
/// ```ignore
/// let tools = ToolRegistry::new()
///     .with_max_result_bytes(15_000)
///     .with_arg_validation(true)
///     .with_default_timeout(Some(Duration::from_secs(30)))
///     .with(ThinkTool)
///     .with_if(web_enabled, WebSearch::new());
/// ```
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    max_result_bytes: usize,
    /// Whether to validate tool arguments against JSON Schema before execution.
    validate_args: bool,
    /// Per-call timeout. `None` disables timeouts.
    default_timeout: Option<Duration>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("max_result_bytes", &self.max_result_bytes)
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            validate_args: false,
            default_timeout: None,
        }
    }

    /// Set the maximum result size in bytes before truncation.
    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    /// Enable JSON Schema argument validation before tool execution.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Register a tool only when `condition` holds.
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Self {
        if condition { self.with(tool) } else { self }
    }

    /// All tool definitions, sorted by name so the schema is stable.
    pub fn definitions(&self) -> Vec<ToolDef> {
        let mut defs: Vec<ToolDef> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run one invocation. Never fails: every outcome is a [`ToolResult`].
    pub async fn dispatch(&self, request: &ToolInvocationRequest) -> ToolResult {
        let name = request.name.as_str();
        let Some(tool) = self.tools.get(name) else {
            info!("[tool] unknown tool requested: {name}");
            return ToolResult::failed(
                &request.id,
                name,
                ToolErrorKind::UnknownTool,
                format!(
                    "unknown tool '{name}'. Available tools: {}",
                    self.names().join(", ")
                ),
            );
        };

        if self.validate_args
            && let Some(error) = validate_tool_arguments(tool.as_ref(), &request.arguments)
        {
            return ToolResult::failed(&request.id, name, ToolErrorKind::InvalidArguments, error);
        }

        log_tool_call(name, &request.arguments);
        let start = Instant::now();

        let outcome = match self.default_timeout {
            Some(limit) => match tokio::time::timeout(limit, tool.execute(&request.arguments)).await
            {
                Ok(r) => r.map_err(Some),
                Err(_) => {
                    info!(
                        "Tool {name} timed out after {:.1}s (limit: {:.0}s)",
                        start.elapsed().as_secs_f64(),
                        limit.as_secs_f64(),
                    );
                    Err(None)
                }
            },
            None => tool.execute(&request.arguments).await.map_err(Some),
        };

        let elapsed = start.elapsed();
        match outcome {
            Ok(output) => {
                debug!(
                    "Tool {name} completed in {:.0}ms ({} bytes)",
                    elapsed.as_secs_f64() * 1000.0,
                    output.len()
                );
                trace!("Tool {name} result preview: {}", preview(&output, 300));
                ToolResult::ok(
                    &request.id,
                    name,
                    truncate_result(output, self.max_result_bytes),
                )
            }
            Err(Some(err)) => {
                debug!(
                    "Tool {name} failed in {:.0}ms: {err}",
                    elapsed.as_secs_f64() * 1000.0
                );
                let kind = match err {
                    ToolError::InvalidArguments(_) => ToolErrorKind::InvalidArguments,
                    ToolError::Execution(_) => ToolErrorKind::Execution,
                    ToolError::NonRecoverable(_) => ToolErrorKind::NonRecoverable,
                };
                ToolResult::failed(&request.id, name, kind, err.to_string())
            }
            Err(None) => ToolResult::failed(
                &request.id,
                name,
                ToolErrorKind::Timeout,
                format!(
                    "tool '{name}' timed out after {:.0} seconds",
                    self.default_timeout.map_or(0.0, |d| d.as_secs_f64())
                ),
            ),
        }
    }

    /// Run a batch of invocations and return results in request order.
    ///
    /// With `parallel` set, all dispatches run concurrently; otherwise they
    /// run one after another.
    pub async fn dispatch_all(
        &self,
        requests: &[ToolInvocationRequest],
        parallel: bool,
    ) -> Vec<ToolResult> {
        if parallel && requests.len() > 1 {
            join_all(requests.iter().map(|r| self.dispatch(r))).await
        } else {
            let mut results = Vec::with_capacity(requests.len());
            for request in requests {
                results.push(self.dispatch(request).await);
            }
            results
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── FnTool ─────────────────────────────────────────────────────────

/// Type-erased async handler for [`FnTool`].
type ErasedToolHandler = Box<
    dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send>>
        + Send
        + Sync,
>;

/// A closure-based tool that decodes typed arguments and delegates to a handler.
///
/// Use it for stateless tools. Tools that need shared state should implement
/// [`Tool`] on a struct instead.
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct EchoArgs { text: String }
///
/// let tool = FnTool::new(
///     ToolDef::new("echo", "Echo the input", json_schema_for::<EchoArgs>()),
///     |args: EchoArgs| async move { Ok(args.text) },
/// );
/// ```
pub struct FnTool {
    def: ToolDef,
    handler: ErasedToolHandler,
}

impl FnTool {
    pub fn new<A, F, Fut>(def: ToolDef, handler: F) -> Self
    where
        A: serde::de::DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        let erased = move |raw: serde_json::Value| -> Pin<
            Box<dyn Future<Output = Result<String, ToolError>> + Send>,
        > {
            match serde_json::from_value::<A>(raw) {
                Ok(args) => Box::pin(handler(args)),
                Err(e) => Box::pin(async move {
                    Err(ToolError::InvalidArguments(format!(
                        "{e}. Provide arguments matching the tool's parameter schema."
                    )))
                }),
            }
        };
        Self {
            def,
            handler: Box::new(erased),
        }
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, arguments: &serde_json::Value) -> ToolFuture<'_> {
        (self.handler)(arguments.clone())
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.def.function.name)
            .finish()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate arguments against the tool's declared JSON Schema.
///
/// Returns `None` if valid (or if the schema itself is unusable), otherwise
/// a message listing each violation.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &serde_json::Value) -> Option<String> {
    let schema = tool.definition().function.parameters;
    let validator = jsonschema::validator_for(&schema).ok()?;

    let errors: Vec<String> = validator
        .iter_errors(arguments)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "argument validation failed for tool '{}':\n{}",
            tool.name(),
            errors.join("\n")
        ))
    }
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &serde_json::Value) {
    let raw = arguments.to_string();
    info!(
        "[tool] {}({}{})",
        name,
        preview(&raw, 120),
        if raw.chars().count() > 120 { "..." } else { "" }
    );
    trace!("[tool] {name} arguments: {raw}");
}

fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Truncate a string to at most `max` bytes on a char boundary, appending a
/// notice if trimmed.
pub fn truncate_result(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}...\n[truncated: {} bytes total]",
        s.get(..end).unwrap_or_default(),
        s.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Deserialize, schemars::JsonSchema)]
    struct EchoArgs {
        text: String,
    }

    fn echo_tool() -> FnTool {
        FnTool::new(
            ToolDef::new("echo", "Echo", crate::json_schema_for::<EchoArgs>()),
            |args: EchoArgs| async move { Ok(args.text) },
        )
    }

    struct Sleepy {
        millis: u64,
        started: Arc<AtomicUsize>,
    }

    impl Tool for Sleepy {
        fn definition(&self) -> ToolDef {
            ToolDef::new("sleepy", "Sleeps", json!({"type": "object", "properties": {}}))
        }

        fn execute(&self, arguments: &serde_json::Value) -> ToolFuture<'_> {
            let tag = arguments["tag"].as_str().unwrap_or("").to_string();
            Box::pin(async move {
                self.started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(self.millis)).await;
                Ok(tag)
            })
        }
    }

    struct Fatal;

    impl Tool for Fatal {
        fn definition(&self) -> ToolDef {
            ToolDef::new("fatal", "Always dies", json!({"type": "object"}))
        }

        fn execute(&self, _arguments: &serde_json::Value) -> ToolFuture<'_> {
            Box::pin(async { Err(ToolError::NonRecoverable("disk gone".into())) })
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failed_result() {
        let registry = ToolRegistry::new().with(echo_tool());
        let result = registry
            .dispatch(&ToolInvocationRequest::new("c1", "nope", json!({})))
            .await;
        assert!(!result.success);
        assert_eq!(result.call_id, "c1");
        assert_eq!(result.error_kind(), Some(ToolErrorKind::UnknownTool));
        assert!(result.error.unwrap().message.contains("echo"));
    }

    #[tokio::test]
    async fn fn_tool_decodes_typed_arguments() {
        let registry = ToolRegistry::new().with(echo_tool());
        let ok = registry
            .dispatch(&ToolInvocationRequest::new("c1", "echo", json!({"text": "hi"})))
            .await;
        assert!(ok.success);
        assert_eq!(ok.output, "hi");

        let bad = registry
            .dispatch(&ToolInvocationRequest::new("c2", "echo", json!({"txt": "hi"})))
            .await;
        assert_eq!(bad.error_kind(), Some(ToolErrorKind::InvalidArguments));
    }

    #[tokio::test]
    async fn schema_validation_rejects_wrong_types() {
        let registry = ToolRegistry::new().with_arg_validation(true).with(echo_tool());
        let result = registry
            .dispatch(&ToolInvocationRequest::new("c1", "echo", json!({"text": 5})))
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidArguments));
        assert!(result.error.unwrap().message.contains("validation failed"));
    }

    #[tokio::test]
    async fn timeout_yields_timeout_kind() {
        let registry = ToolRegistry::new()
            .with_default_timeout(Some(Duration::from_millis(10)))
            .with(Sleepy {
                millis: 500,
                started: Arc::new(AtomicUsize::new(0)),
            });
        let result = registry
            .dispatch(&ToolInvocationRequest::new("c1", "sleepy", json!({})))
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::Timeout));
    }

    #[tokio::test]
    async fn non_recoverable_is_fatal() {
        let registry = ToolRegistry::new().with(Fatal);
        let result = registry
            .dispatch(&ToolInvocationRequest::new("c1", "fatal", json!({})))
            .await;
        assert!(result.is_fatal());
    }

    #[tokio::test]
    async fn parallel_dispatch_preserves_request_order() {
        let started = Arc::new(AtomicUsize::new(0));
        let registry = ToolRegistry::new().with(Sleepy {
            millis: 20,
            started: started.clone(),
        });
        let requests: Vec<_> = (0..4)
            .map(|i| ToolInvocationRequest::new(format!("c{i}"), "sleepy", json!({"tag": format!("r{i}")})))
            .collect();

        let results = registry.dispatch_all(&requests, true).await;
        assert_eq!(started.load(Ordering::SeqCst), 4);
        let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, ["c0", "c1", "c2", "c3"]);
        let outputs: Vec<_> = results.iter().map(|r| r.output.as_str()).collect();
        assert_eq!(outputs, ["r0", "r1", "r2", "r3"]);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo wörld".to_string();
        let out = truncate_result(s, 2);
        assert!(out.starts_with('h'));
        assert!(out.contains("[truncated"));
        assert_eq!(truncate_result("short".into(), 100), "short");
    }

    #[test]
    fn definitions_sorted_by_name() {
        let registry = ToolRegistry::new().with(Fatal).with(echo_tool());
        let names: Vec<_> = registry
            .definitions()
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(names, ["echo", "fatal"]);
    }
}
