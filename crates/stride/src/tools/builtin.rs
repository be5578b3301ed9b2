//! Tools every agent gets: the completion signal and a scratchpad.

use crate::ToolDef;
use crate::tools::core::{Tool, ToolFuture};
use schemars::JsonSchema;
use serde::Deserialize;

/// Name of the completion tool. Intercepted by the harness, never dispatched.
pub const TASK_DONE: &str = "task_done";

/// Typed arguments for `task_done`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct TaskDoneArgs {
    /// The complete final answer to the task.
    pub result: String,
}

/// Definition appended to every tool schema the harness sends.
pub fn task_done_definition() -> ToolDef {
    ToolDef::new(
        TASK_DONE,
        "Report that the task is complete. Call this exactly once, when you are \
         finished, with the full final answer in 'result'. Any other tool calls in \
         the same reply run first.",
        crate::json_schema_for::<TaskDoneArgs>(),
    )
}

/// A no-op scratchpad that gives the model a structured way to reason
/// between steps. The reasoning is echoed back unchanged.
pub struct ThinkTool;

/// Typed arguments for the `think` pseudo-tool.
#[derive(Deserialize, JsonSchema)]
pub struct ThinkArgs {
    /// Your step-by-step reasoning or analysis.
    pub reasoning: String,
}

impl Tool for ThinkTool {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "think",
            "Think through a problem step-by-step before acting. Write your \
             reasoning as the 'reasoning' argument. This performs no action; use it \
             to plan or deliberate between tool calls.",
            crate::json_schema_for::<ThinkArgs>(),
        )
    }

    fn execute(&self, arguments: &serde_json::Value) -> ToolFuture<'_> {
        let reasoning = serde_json::from_value::<ThinkArgs>(arguments.clone())
            .map(|a| a.reasoning)
            .unwrap_or_else(|_| "[no reasoning provided]".into());
        Box::pin(async move { Ok(reasoning) })
    }
}
