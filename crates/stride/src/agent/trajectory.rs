//! Step-by-step record of a task and how it ended.

use crate::error::ProviderError;
use crate::tools::core::{ToolInvocationRequest, ToolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One loop iteration: a model call plus the tools it requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Zero-based position in the trajectory.
    pub index: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Text the model produced alongside (or instead of) tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_text: Option<String>,
    #[serde(default)]
    pub requests: Vec<ToolInvocationRequest>,
    /// One per request, in request order.
    #[serde(default)]
    pub results: Vec<ToolResult>,
    /// Final answer, if this step completed the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<String>,
    /// Why the step ended the task abnormally, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Step {
    pub(crate) fn begin(index: u32) -> Self {
        let now = Utc::now();
        Self {
            index,
            started_at: now,
            finished_at: now,
            assistant_text: None,
            requests: Vec::new(),
            results: Vec::new(),
            completion: None,
            error: None,
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn failed_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

/// Ordered, append-only record of steps for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub task_id: Uuid,
    pub goal: String,
    steps: Vec<Step>,
}

impl Trajectory {
    pub fn new(task_id: Uuid, goal: impl Into<String>) -> Self {
        Self {
            task_id,
            goal: goal.into(),
            steps: Vec::new(),
        }
    }

    /// Append a finished step.
    pub fn record(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Total tool invocations across all steps.
    pub fn tool_call_count(&self) -> usize {
        self.steps.iter().map(|s| s.requests.len()).sum()
    }
}

// ── Terminal state ─────────────────────────────────────────────────

/// What stopped an in-flight task early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelCause {
    /// The caller's cancellation token fired.
    Requested,
    /// The task-level deadline passed.
    Timeout,
}

/// Why a task ended in [`TerminalState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// Terminal model backend failure (retries already spent).
    Provider { error: ProviderError },
    /// A tool reported a non-recoverable failure.
    ToolFatal { tool: String, message: String },
    Cancelled { cause: CancelCause },
    /// The task could not start (missing inputs, invalid chunk plan).
    Configuration { message: String },
    /// Long-context integration produced nothing usable.
    Integration { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Provider { error } => write!(f, "{error}"),
            FailureReason::ToolFatal { tool, message } => {
                write!(f, "tool '{tool}' failed fatally: {message}")
            }
            FailureReason::Cancelled {
                cause: CancelCause::Requested,
            } => write!(f, "cancelled"),
            FailureReason::Cancelled {
                cause: CancelCause::Timeout,
            } => write!(f, "task timed out"),
            FailureReason::Configuration { message } => write!(f, "configuration error: {message}"),
            FailureReason::Integration { message } => write!(f, "integration error: {message}"),
        }
    }
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TerminalState {
    Completed,
    /// The step budget ran out before a completion signal. Not a success.
    MaxStepsExceeded,
    Failed { failure: FailureReason },
}

impl TerminalState {
    pub fn failed(reason: FailureReason) -> Self {
        TerminalState::Failed { failure: reason }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TerminalState::Completed)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            TerminalState::Failed { failure } => Some(failure),
            _ => None,
        }
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalState::Completed => write!(f, "completed"),
            TerminalState::MaxStepsExceeded => write!(f, "max steps exceeded"),
            TerminalState::Failed { failure } => write!(f, "failed: {failure}"),
        }
    }
}
