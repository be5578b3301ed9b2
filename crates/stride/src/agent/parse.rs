//! Decoding model output into loop actions.
//!
//! Model tool calls are schema-loose: ids may be missing or repeated, and
//! `arguments` is a string that may not be JSON at all. [`decode_response`]
//! turns every call into exactly one [`ModelAction`], normalising ids so
//! they are unique within the response and never silently dropping a call.

use crate::tools::builtin::{TASK_DONE, TaskDoneArgs};
use crate::tools::core::ToolInvocationRequest;
use crate::{ModelResponse, ToolCall};
use std::collections::HashSet;

/// What the loop should do for one tool call in a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelAction {
    /// Dispatch to the tool registry.
    Invoke(ToolInvocationRequest),
    /// The completion signal, with its final answer.
    Finish { id: String, result: String },
    /// The call could not be decoded. Reported back as a parse error.
    Malformed {
        id: String,
        name: String,
        arguments: serde_json::Value,
        reason: String,
    },
}

impl ModelAction {
    pub fn id(&self) -> &str {
        match self {
            ModelAction::Invoke(req) => &req.id,
            ModelAction::Finish { id, .. } | ModelAction::Malformed { id, .. } => id,
        }
    }

    /// The action as an invocation request, for the trajectory.
    pub fn to_request(&self) -> ToolInvocationRequest {
        match self {
            ModelAction::Invoke(req) => req.clone(),
            ModelAction::Finish { id, result } => ToolInvocationRequest::new(
                id.clone(),
                TASK_DONE,
                serde_json::json!({ "result": result }),
            ),
            ModelAction::Malformed {
                id,
                name,
                arguments,
                ..
            } => ToolInvocationRequest::new(id.clone(), name.clone(), arguments.clone()),
        }
    }
}

/// A fully decoded model response.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResponse {
    /// Non-blank assistant text, if any.
    pub text: Option<String>,
    /// One action per tool call, in the order the model emitted them.
    pub actions: Vec<ModelAction>,
    /// The calls with normalised ids, ready to be echoed back as the
    /// assistant message.
    pub calls: Vec<ToolCall>,
}

impl DecodedResponse {
    /// Whether the model produced no tool calls at all.
    pub fn is_text_only(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn completion(&self) -> Option<&str> {
        self.actions.iter().find_map(|a| match a {
            ModelAction::Finish { result, .. } => Some(result.as_str()),
            _ => None,
        })
    }
}

/// Decode every tool call in `response`. `step` is used to mint ids for
/// calls that arrived without one.
pub fn decode_response(response: &ModelResponse, step: u32) -> DecodedResponse {
    let text = response
        .content
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let mut seen = HashSet::new();
    let mut actions = Vec::with_capacity(response.tool_calls.len());
    let mut calls = Vec::with_capacity(response.tool_calls.len());

    for (n, call) in response.tool_calls.iter().enumerate() {
        let id = unique_id(&call.id, step, n, &mut seen);
        let mut normalised = call.clone();
        normalised.id = id.clone();
        actions.push(decode_call(id, call));
        calls.push(normalised);
    }

    DecodedResponse {
        text,
        actions,
        calls,
    }
}

fn unique_id(raw: &str, step: u32, n: usize, seen: &mut HashSet<String>) -> String {
    let base = if raw.trim().is_empty() {
        format!("call_{step}_{n}")
    } else {
        raw.trim().to_string()
    };
    let mut id = base.clone();
    let mut suffix = 1;
    while !seen.insert(id.clone()) {
        id = format!("{base}_{suffix}");
        suffix += 1;
    }
    id
}

fn decode_call(id: String, call: &ToolCall) -> ModelAction {
    let name = call.function.name.trim().to_string();
    let raw_args = call.function.arguments.trim();

    if name.is_empty() {
        let reason = "tool call has no function name".to_string();
        return malformed(&id, &name, serde_json::json!({}), reason);
    }

    // Some providers send "" for tools without parameters.
    let arguments = if raw_args.is_empty() {
        serde_json::json!({})
    } else {
        match serde_json::from_str::<serde_json::Value>(raw_args) {
            Ok(v) => v,
            Err(e) => {
                return malformed(
                    &id,
                    &name,
                    serde_json::Value::String(raw_args.to_string()),
                    format!("arguments for '{name}' are not valid JSON: {e}"),
                );
            }
        }
    };

    if !arguments.is_object() {
        let reason = format!("arguments for '{name}' must be a JSON object");
        return malformed(&id, &name, arguments, reason);
    }

    if name == TASK_DONE {
        return match serde_json::from_value::<TaskDoneArgs>(arguments.clone()) {
            Ok(args) => ModelAction::Finish {
                id,
                result: args.result,
            },
            Err(e) => malformed(
                &id,
                &name,
                arguments,
                format!("'{TASK_DONE}' needs a string 'result' argument: {e}"),
            ),
        };
    }

    ModelAction::Invoke(ToolInvocationRequest::new(id, name, arguments))
}

fn malformed(id: &str, name: &str, arguments: serde_json::Value, reason: String) -> ModelAction {
    ModelAction::Malformed {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
        reason,
    }
}
