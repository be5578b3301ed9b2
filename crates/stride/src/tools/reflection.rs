//! Rendering tool results back into conversation content.
//!
//! Successful results are passed through verbatim. Failures are wrapped in a
//! structured message that names the error kind and suggests a recovery, so
//! the model can correct itself on the next step.

use crate::tools::core::{ToolErrorKind, ToolResult};

/// Text of the tool message appended for `result`.
pub fn render_tool_result(result: &ToolResult) -> String {
    match &result.error {
        None => result.output.clone(),
        Some(detail) => format_tool_failure(&result.tool_name, detail.kind, &detail.message),
    }
}

/// Format a tool failure with recovery suggestions.
pub fn format_tool_failure(tool_name: &str, kind: ToolErrorKind, error: &str) -> String {
    let mut msg = format!("Error ({kind}) from tool '{tool_name}':\n  {error}\n");

    let suggestions = suggest_recovery(kind, error);
    if !suggestions.is_empty() {
        msg.push_str("\nPossible causes and recovery:\n");
        for suggestion in &suggestions {
            msg.push_str(&format!("  - {suggestion}\n"));
        }
    }
    msg
}

fn suggest_recovery(kind: ToolErrorKind, error: &str) -> Vec<&'static str> {
    let mut suggestions = Vec::new();
    match kind {
        ToolErrorKind::UnknownTool => {
            suggestions.push("Call only the tools listed in your tool schema.");
        }
        ToolErrorKind::InvalidArguments | ToolErrorKind::ParseError => {
            suggestions.push(
                "Check that the arguments are a JSON object with the correct field names and types.",
            );
        }
        ToolErrorKind::Timeout => {
            suggestions
                .push("The operation took too long. Try with smaller input or different arguments.");
        }
        ToolErrorKind::NonRecoverable => {
            suggestions.push("This failure cannot be retried; the task will stop.");
        }
        ToolErrorKind::Execution => {
            let lower = error.to_lowercase();
            if lower.contains("not found") || lower.contains("does not exist") {
                suggestions.push("The referenced item may not exist. Verify the name or path.");
            }
            if lower.contains("permission denied") || lower.contains("forbidden") {
                suggestions.push("Access was refused. Try a different approach.");
            }
            if suggestions.is_empty() {
                suggestions.push("Review the error message and adjust your approach.");
                suggestions.push(
                    "Consider using the 'think' tool to reason about what went wrong before retrying.",
                );
            }
        }
    }
    suggestions
}
