//! The step loop: a bounded state machine over model calls and tool dispatch.
//!
//! Each step sends the conversation plus the tool schema to the model,
//! decodes the reply, dispatches the requested tools through the
//! [`ToolRegistry`] and appends one tool message per request. The loop ends
//! when the model calls `task_done`, when `max_steps` model calls have been
//! made, or on a fatal failure (terminal provider error, non-recoverable
//! tool error, cancellation, task timeout). Text-only replies never end a
//! task; the loop answers them with a reminder and moves on.
//!
//! ```text
//! Running ──> AwaitingModel ──> AwaitingTools ──> Running ──> ... ──> MaxStepsExceeded
//!                 │    │              │    └──> Completed
//!                 │    └──> Running   └──> Failed
//!                 └──> Failed
//! ```

use crate::Message;
use crate::agent::config::AgentConfig;
use crate::agent::conversation::Conversation;
use crate::agent::events::{AgentEvent, EventHandler, NoopHandler};
use crate::agent::parse::{ModelAction, decode_response};
use crate::agent::prompt::{completion_reminder, task_message};
use crate::agent::task::{ExtraArgs, Task};
use crate::agent::trajectory::{CancelCause, FailureReason, Step, TerminalState, Trajectory};
use crate::api::backend::LlmClient;
use crate::tools::builtin::{TASK_DONE, task_done_definition};
use crate::tools::core::{ToolErrorKind, ToolInvocationRequest, ToolRegistry, ToolResult};
use crate::tools::reflection::render_tool_result;
use serde::Serialize;
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Content of the tool message that acknowledges `task_done`.
const COMPLETION_ACK: &str = "Task marked as complete.";

// ── Loop state ─────────────────────────────────────────────────────

/// Where the step loop is. Reported through [`AgentEvent::StateChanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Running,
    AwaitingModel,
    AwaitingTools,
    Completed,
    Failed,
    MaxStepsExceeded,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LoopState::Completed | LoopState::Failed | LoopState::MaxStepsExceeded
        )
    }
}

// ── Execution ──────────────────────────────────────────────────────

/// Everything a finished task hands back to its caller.
#[derive(Debug, Clone, Serialize)]
pub struct Execution {
    pub task: Task,
    /// The `task_done` result on completion, otherwise the best partial text.
    pub final_result: Option<String>,
    pub trajectory: Trajectory,
    pub terminal_state: TerminalState,
    pub conversation: Conversation,
}

impl Execution {
    pub fn success(&self) -> bool {
        self.terminal_state.is_completed()
    }
}

// ── Harness ────────────────────────────────────────────────────────

/// The step loop.
///
/// ```ignore
/// let client = LlmClient::new(HttpBackend::new(Provider::OpenRouter, key)?, DEFAULT_MODEL);
/// let tools = ToolRegistry::new().with(ThinkTool);
///
/// let execution = Harness::new(&client, &tools, AgentConfig::new().with_max_steps(8))
///     .with_event_handler(&LoggingHandler)
///     .new_task("List three prime numbers.", ExtraArgs::new())
///     .execute()
///     .await;
/// ```
///
/// `Harness<'a>` borrows the client, tools and event handler, so one
/// registry and client can serve many harnesses at once.
pub struct Harness<'a> {
    client: &'a LlmClient,
    tools: &'a ToolRegistry,
    config: AgentConfig,
    event_handler: &'a dyn EventHandler,
    cancel: CancellationToken,
}

impl<'a> Harness<'a> {
    pub fn new(client: &'a LlmClient, tools: &'a ToolRegistry, config: AgentConfig) -> Self {
        Self {
            client,
            tools,
            config,
            event_handler: &NoopHandler,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    /// Stop in-flight work and fail the task with `Cancelled` when `token`
    /// is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Prepare a task for execution.
    pub fn new_task(&self, goal: impl Into<String>, extra_args: ExtraArgs) -> TaskRun<'_, 'a> {
        TaskRun {
            harness: self,
            task: Task::new(goal, extra_args),
            seed: None,
        }
    }

    /// Run `task` with the default seeding (system prompt + task message).
    pub async fn execute(&self, task: &Task) -> Execution {
        self.run(task.clone(), None).await
    }

    async fn run(&self, task: Task, seed: Option<Vec<Message>>) -> Execution {
        let max_steps = self.config.max_steps;
        let deadline = self.config.task_timeout.map(|t| Instant::now() + t);

        let mut conversation = Conversation::new();
        match seed {
            Some(messages) => conversation.extend(messages),
            None => {
                conversation.push(Message::system(&self.config.system_prompt));
                conversation.push(Message::user(task_message(&task)));
            }
        }
        let mut trajectory = Trajectory::new(task.id(), task.goal());

        let mut tool_defs = self.tools.definitions();
        tool_defs.push(task_done_definition());

        info!(
            "Task started: id={}, model={}, max_steps={}, tools={}",
            task.id(),
            self.client.model(),
            max_steps,
            tool_defs.len()
        );

        let mut state = LoopState::Running;
        let mut outcome: Option<(TerminalState, Option<String>)> = None;

        for step in 0..max_steps {
            self.event_handler
                .on_event(&AgentEvent::StepStart { step, max_steps });
            let mut record = Step::begin(step);
            self.transition(&mut state, LoopState::AwaitingModel);

            let sent = self.guarded(
                deadline,
                self.client
                    .send(&conversation, &tool_defs, &self.config.generation),
            );
            let response = match sent.await {
                Ok(Ok(response)) => response,
                Ok(Err(error)) => {
                    record.error = Some(error.to_string());
                    trajectory.record(record.finish());
                    outcome = Some(self.fail(
                        &mut state,
                        &conversation,
                        FailureReason::Provider { error },
                    ));
                    break;
                }
                Err(cause) => {
                    let reason = FailureReason::Cancelled { cause };
                    record.error = Some(reason.to_string());
                    trajectory.record(record.finish());
                    outcome = Some(self.fail(&mut state, &conversation, reason));
                    break;
                }
            };

            let decoded = decode_response(&response, step);
            if let Some(text) = decoded.text.as_deref() {
                self.event_handler.on_event(&AgentEvent::Text(text));
            }
            record.assistant_text = decoded.text.clone();
            conversation.push(Message::assistant(
                decoded.text.clone(),
                decoded.calls.clone(),
            ));

            if decoded.is_text_only() {
                conversation.push(Message::user(completion_reminder()));
                trajectory.record(record.finish());
                self.transition(&mut state, LoopState::Running);
                continue;
            }

            self.event_handler.on_event(&AgentEvent::ToolCallsReceived {
                step,
                count: decoded.actions.len(),
            });
            self.transition(&mut state, LoopState::AwaitingTools);
            record.requests = decoded.actions.iter().map(ModelAction::to_request).collect();

            let invocations: Vec<ToolInvocationRequest> = decoded
                .actions
                .iter()
                .filter_map(|a| match a {
                    ModelAction::Invoke(req) => Some(req.clone()),
                    _ => None,
                })
                .collect();
            for request in &invocations {
                self.event_handler
                    .on_event(&AgentEvent::ToolExecuting { request });
            }

            let dispatch = self.guarded(
                deadline,
                self.tools
                    .dispatch_all(&invocations, self.config.generation.parallel_tool_calls),
            );
            let mut dispatched = match dispatch.await {
                Ok(results) => results.into_iter(),
                Err(cause) => {
                    let reason = FailureReason::Cancelled { cause };
                    record.error = Some(reason.to_string());
                    trajectory.record(record.finish());
                    outcome = Some(self.fail(&mut state, &conversation, reason));
                    break;
                }
            };

            let mut completion: Option<String> = None;
            for action in &decoded.actions {
                let result = match action {
                    ModelAction::Invoke(req) => dispatched.next().unwrap_or_else(|| {
                        ToolResult::failed(
                            &req.id,
                            &req.name,
                            ToolErrorKind::Execution,
                            "tool produced no result",
                        )
                    }),
                    ModelAction::Finish { id, result } => {
                        completion.get_or_insert_with(|| result.clone());
                        ToolResult::ok(id, TASK_DONE, COMPLETION_ACK.to_string())
                    }
                    ModelAction::Malformed {
                        id, name, reason, ..
                    } => ToolResult::failed(id, name, ToolErrorKind::ParseError, reason),
                };
                self.event_handler
                    .on_event(&AgentEvent::ToolResult { result: &result });
                conversation.push(Message::tool_result(
                    &result.call_id,
                    render_tool_result(&result),
                ));
                record.results.push(result);
            }

            if let Some(fatal) = record.results.iter().find(|r| r.is_fatal()) {
                let reason = FailureReason::ToolFatal {
                    tool: fatal.tool_name.clone(),
                    message: fatal
                        .error
                        .as_ref()
                        .map(|e| e.message.clone())
                        .unwrap_or_default(),
                };
                record.error = Some(reason.to_string());
                trajectory.record(record.finish());
                outcome = Some(self.fail(&mut state, &conversation, reason));
                break;
            }

            if let Some(result) = completion {
                record.completion = Some(result.clone());
                trajectory.record(record.finish());
                self.transition(&mut state, LoopState::Completed);
                self.event_handler
                    .on_event(&AgentEvent::Completed { result: &result });
                outcome = Some((TerminalState::Completed, Some(result)));
                break;
            }

            trajectory.record(record.finish());
            self.transition(&mut state, LoopState::Running);
        }

        let (terminal_state, final_result) = outcome.unwrap_or_else(|| {
            self.transition(&mut state, LoopState::MaxStepsExceeded);
            self.event_handler
                .on_event(&AgentEvent::MaxStepsExceeded { max_steps });
            (
                TerminalState::MaxStepsExceeded,
                conversation.last_assistant_text().map(str::to_string),
            )
        });

        info!(
            "Task finished: id={}, state={}, steps={}, tool_calls={}",
            task.id(),
            terminal_state,
            trajectory.len(),
            trajectory.tool_call_count()
        );

        Execution {
            task,
            final_result,
            trajectory,
            terminal_state,
            conversation,
        }
    }

    /// Race `fut` against cancellation and the task deadline. The losing
    /// future is dropped before the caller sees the outcome.
    async fn guarded<F: Future>(
        &self,
        deadline: Option<Instant>,
        fut: F,
    ) -> Result<F::Output, CancelCause> {
        if self.cancel.is_cancelled() {
            return Err(CancelCause::Requested);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(CancelCause::Timeout);
        }
        let expiry = async {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CancelCause::Requested),
            _ = expiry => Err(CancelCause::Timeout),
            out = fut => Ok(out),
        }
    }

    fn transition(&self, state: &mut LoopState, to: LoopState) {
        let from = *state;
        *state = to;
        self.event_handler
            .on_event(&AgentEvent::StateChanged { from, to });
    }

    /// Move to `Failed`, keeping the last assistant text as the partial result.
    fn fail(
        &self,
        state: &mut LoopState,
        conversation: &Conversation,
        reason: FailureReason,
    ) -> (TerminalState, Option<String>) {
        self.transition(state, LoopState::Failed);
        self.event_handler
            .on_event(&AgentEvent::Failed { reason: &reason });
        (
            TerminalState::failed(reason),
            conversation.last_assistant_text().map(str::to_string),
        )
    }
}

// ── TaskRun ────────────────────────────────────────────────────────

/// A task bound to a harness, ready to execute.
pub struct TaskRun<'h, 'a> {
    harness: &'h Harness<'a>,
    task: Task,
    seed: Option<Vec<Message>>,
}

impl TaskRun<'_, '_> {
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Replace the default seeding (system prompt + task message) with
    /// these messages.
    pub fn with_seed_messages(mut self, messages: Vec<Message>) -> Self {
        self.seed = Some(messages);
        self
    }

    pub async fn execute(self) -> Execution {
        self.harness.run(self.task, self.seed).await
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::backend::{BackendFuture, ModelBackend};
    use crate::api::retry::RetryConfig;
    use crate::error::ProviderError;
    use crate::{ChatRequest, ModelResponse, ToolCall};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted(Mutex<VecDeque<ModelResponse>>);

    impl Scripted {
        fn new(responses: Vec<ModelResponse>) -> Self {
            Self(Mutex::new(responses.into()))
        }
    }

    impl ModelBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn complete(&self, _request: &ChatRequest) -> BackendFuture<'_> {
            let next = self.0.lock().unwrap().pop_front();
            Box::pin(async move {
                next.ok_or_else(|| ProviderError::Terminal("script exhausted".into()))
            })
        }
    }

    fn client(responses: Vec<ModelResponse>) -> LlmClient {
        LlmClient::new(Scripted::new(responses), "test-model").with_retry(RetryConfig::immediate())
    }

    fn done(result: &str) -> ModelResponse {
        ModelResponse::tool_calls(vec![ToolCall::new(
            "done",
            TASK_DONE,
            serde_json::json!({ "result": result }).to_string(),
        )])
    }

    #[tokio::test]
    async fn states_follow_the_happy_path() {
        let client = client(vec![done("ok")]);
        let tools = ToolRegistry::new();
        let states = Mutex::new(Vec::new());
        let handler = crate::agent::events::FnEventHandler::new(|event| {
            if let AgentEvent::StateChanged { to, .. } = event {
                states.lock().unwrap().push(*to);
            }
        });

        let execution = Harness::new(&client, &tools, AgentConfig::new())
            .with_event_handler(&handler)
            .new_task("goal", ExtraArgs::new())
            .execute()
            .await;

        assert!(execution.success());
        assert_eq!(execution.final_result.as_deref(), Some("ok"));
        assert_eq!(
            *states.lock().unwrap(),
            [
                LoopState::AwaitingModel,
                LoopState::AwaitingTools,
                LoopState::Completed
            ]
        );
    }

    #[tokio::test]
    async fn text_only_reply_gets_a_reminder() {
        let client = client(vec![ModelResponse::text("I think it's 4."), done("4")]);
        let tools = ToolRegistry::new();

        let execution = Harness::new(&client, &tools, AgentConfig::new())
            .new_task("2+2?", ExtraArgs::new())
            .execute()
            .await;

        assert!(execution.success());
        assert_eq!(execution.trajectory.len(), 2);
        let reminder = &execution.conversation.messages()[3];
        assert_eq!(reminder.role, crate::MessageRole::User);
        assert!(reminder.content.as_deref().unwrap_or("").contains(TASK_DONE));
    }

    #[tokio::test]
    async fn every_tool_call_gets_a_tool_message() {
        let client = client(vec![ModelResponse::tool_calls(vec![
            ToolCall::new("a", "missing", "{}"),
            ToolCall::new("b", TASK_DONE, r#"{"result":"x"}"#),
        ])]);
        let tools = ToolRegistry::new();

        let execution = Harness::new(&client, &tools, AgentConfig::new())
            .new_task("goal", ExtraArgs::new())
            .execute()
            .await;

        let tool_ids: Vec<_> = execution
            .conversation
            .messages()
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(tool_ids, ["a", "b"]);
        let step = &execution.trajectory.steps()[0];
        assert_eq!(step.results[0].error_kind(), Some(ToolErrorKind::UnknownTool));
        assert!(execution.success());
    }

    #[tokio::test]
    async fn seed_messages_replace_default_prompt() {
        let client = client(vec![done("ok")]);
        let tools = ToolRegistry::new();
        let harness = Harness::new(&client, &tools, AgentConfig::new());

        let execution = harness
            .new_task("goal", ExtraArgs::new())
            .with_seed_messages(vec![Message::system("custom"), Message::user("chunk")])
            .execute()
            .await;

        assert_eq!(
            execution.conversation.messages()[0].content.as_deref(),
            Some("custom")
        );
    }

    #[tokio::test]
    async fn failure_keeps_last_assistant_text() {
        // The second call finds the script exhausted and fails terminally.
        let client = client(vec![ModelResponse::text("halfway there")]);
        let tools = ToolRegistry::new();

        let execution = Harness::new(&client, &tools, AgentConfig::new())
            .new_task("goal", ExtraArgs::new())
            .execute()
            .await;

        assert!(matches!(
            execution.terminal_state.failure(),
            Some(FailureReason::Provider { .. })
        ));
        assert_eq!(execution.final_result.as_deref(), Some("halfway there"));
    }
}
