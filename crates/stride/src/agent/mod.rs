//! Agent runtime: the [`Harness`] step loop and its supporting modules.
//!
//! - [`harness::Harness`]: the bounded tool-use loop. Start here.
//! - [`config::AgentConfig`]: step budget, generation options, system
//!   prompt and task timeout.
//! - [`task`]: the immutable [`Task`] a run works on.
//! - [`parse`]: decoding model tool calls into loop actions.
//! - [`trajectory`]: the per-step record and [`TerminalState`].
//! - [`events`]: [`EventHandler`] and [`AgentEvent`] for observing a run.
//! - [`prompt`]: the default system prompt and [`PromptBuilder`].

pub mod config;
pub mod conversation;
pub mod events;
pub mod harness;
pub mod parse;
pub mod prompt;
pub mod task;
pub mod trajectory;

pub use config::{AgentConfig, GenerationOptions};
pub use conversation::Conversation;
pub use events::{
    AgentEvent, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
};
pub use harness::{Execution, Harness, LoopState, TaskRun};
pub use parse::{DecodedResponse, ModelAction, decode_response};
pub use prompt::PromptBuilder;
pub use task::{ExtraArgs, Task, parse_extra_arg};
pub use trajectory::{CancelCause, FailureReason, Step, TerminalState, Trajectory};
