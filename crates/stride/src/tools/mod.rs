//! Tool abstractions for function-calling agents.
//!
//! Every agent capability is a [`Tool`] implementor. Tools are collected into
//! a [`ToolRegistry`] which handles dispatch, validation, truncation and
//! timeouts, and turns every outcome into a [`ToolResult`].
//!
//! # Submodules
//!
//! - [`core`]: [`Tool`] trait, [`ToolRegistry`], [`FnTool`], invocation and
//!   result types.
//! - [`builtin`]: the `task_done` completion signal and [`ThinkTool`].
//! - [`reflection`]: renders results (and failures, with recovery hints) as
//!   conversation content.

pub mod builtin;
pub mod core;
pub mod reflection;

pub use builtin::{TASK_DONE, ThinkTool, task_done_definition};
pub use core::{
    DEFAULT_MAX_RESULT_BYTES, FnTool, Tool, ToolErrorDetail, ToolErrorKind, ToolFuture,
    ToolInvocationRequest, ToolRegistry, ToolResult, truncate_result, validate_tool_arguments,
};
pub use reflection::render_tool_result;
