//! Convenience re-exports for common `stride` types.
//!
//! ```ignore
//! use stride::prelude::*;
//! ```
//!
//! Covers the client, the step loop and its configuration, tools, events
//! and the long-context agent. Planner internals, prompt templates and wire
//! details stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{DEFAULT_MODEL, HttpBackend, Message, ModelResponse, ToolDef, json_schema_for};

// ── Model API ───────────────────────────────────────────────────────
pub use crate::api::{LlmClient, ModelBackend, Provider, RetryConfig};
pub use crate::error::{IntegrationError, PlanError, ProviderError, ToolError};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    AgentConfig, AgentEvent, CompositeEventHandler, EventHandler, Execution, ExtraArgs,
    FailureReason, FnEventHandler, GenerationOptions, Harness, LoggingHandler, NoopHandler, Task,
    TerminalState, Trajectory,
};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{FnTool, ThinkTool, Tool, ToolFuture, ToolRegistry, ToolResult};

// ── Long context ────────────────────────────────────────────────────
pub use crate::longctx::{LongContextAgent, LongContextConfig, LongContextExecution};
