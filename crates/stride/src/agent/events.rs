//! Events and handlers for observing the step loop and the long-context
//! pipeline.
//!
//! The [`Harness`](super::harness::Harness) and
//! [`LongContextAgent`](crate::longctx::LongContextAgent) report progress
//! through [`AgentEvent`] variants. Handlers observe only; they cannot alter
//! the run.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use crate::agent::harness::LoopState;
use crate::agent::trajectory::{FailureReason, TerminalState};
use crate::tools::core::{ToolInvocationRequest, ToolResult};
use tracing::{debug, info, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted during a run.
#[derive(Debug)]
pub enum AgentEvent<'a> {
    /// A new step is starting.
    StepStart { step: u32, max_steps: u32 },
    /// The loop moved between states.
    StateChanged { from: LoopState, to: LoopState },
    /// The model produced text.
    Text(&'a str),
    /// The model requested tools in this step.
    ToolCallsReceived { step: u32, count: usize },
    /// A tool is about to be dispatched.
    ToolExecuting { request: &'a ToolInvocationRequest },
    /// A tool finished (successfully or not).
    ToolResult { result: &'a ToolResult },
    /// The completion signal was accepted.
    Completed { result: &'a str },
    /// The step budget ran out.
    MaxStepsExceeded { max_steps: u32 },
    /// The task failed.
    Failed { reason: &'a FailureReason },

    // ── Long-context pipeline ──
    /// The document was split.
    PlanReady { chunks: usize, text_len: usize },
    /// Processing of one chunk is starting.
    ChunkStarted { index: usize, total: usize },
    /// Processing of one chunk ended.
    ChunkFinished {
        index: usize,
        total: usize,
        state: &'a TerminalState,
    },
    /// The instruction enhancer fell back to the base instruction.
    EnhancementFallback { index: usize, reason: &'a str },
    /// The final synthesis call is starting.
    Synthesizing { successes: usize, gaps: usize },
}

/// Handler for run events.
///
/// ```ignore
/// struct Printer;
///
/// impl EventHandler for Printer {
///     fn on_event(&self, event: &AgentEvent<'_>) {
///         if let AgentEvent::Text(text) = event {
///             println!("{text}");
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &AgentEvent<'_>) {
        let _ = event;
    }
}

/// Ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let AgentEvent::Text(text) = event {
///         println!("{text}");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&AgentEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&AgentEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&AgentEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &AgentEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches every event to each inner handler in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(verbose, my_printer);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &AgentEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// An event handler that logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &AgentEvent<'_>) {
        match event {
            AgentEvent::StepStart { step, max_steps } => {
                info!("[step {}/{}]", step + 1, max_steps);
            }
            AgentEvent::StateChanged { from, to } => {
                debug!("State: {from:?} -> {to:?}");
            }
            AgentEvent::Text(text) => {
                let preview: String = text.chars().take(200).collect();
                debug!(
                    "LLM text: {preview}{}",
                    if text.chars().count() > 200 { "..." } else { "" }
                );
            }
            AgentEvent::ToolCallsReceived { step, count } => {
                debug!("{count} tool call(s) in step {step}");
            }
            AgentEvent::ToolExecuting { request } => {
                debug!("Executing tool: {} ({})", request.name, request.id);
            }
            AgentEvent::ToolResult { result } => match &result.error {
                None => debug!("Tool {} result: {} bytes", result.tool_name, result.output.len()),
                Some(detail) => info!(
                    "Tool {} failed ({}): {}",
                    result.tool_name, detail.kind, detail.message
                ),
            },
            AgentEvent::Completed { result } => {
                info!("Task completed ({} chars)", result.len());
            }
            AgentEvent::MaxStepsExceeded { max_steps } => {
                info!("Agent hit step limit ({max_steps})");
            }
            AgentEvent::Failed { reason } => {
                warn!("Task failed: {reason}");
            }
            AgentEvent::PlanReady { chunks, text_len } => {
                info!("Planned {chunks} chunk(s) over {text_len} bytes");
            }
            AgentEvent::ChunkStarted { index, total } => {
                info!("[chunk {}/{}] processing", index + 1, total);
            }
            AgentEvent::ChunkFinished {
                index,
                total,
                state,
            } => {
                info!("[chunk {}/{}] {state}", index + 1, total);
            }
            AgentEvent::EnhancementFallback { index, reason } => {
                warn!("Chunk {index}: using base instruction ({reason})");
            }
            AgentEvent::Synthesizing { successes, gaps } => {
                info!("Synthesizing {successes} partial answer(s), {gaps} gap(s)");
            }
        }
    }
}
