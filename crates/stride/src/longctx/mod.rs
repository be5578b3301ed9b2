//! Long-context pipeline: plan, enhance, process, integrate.
//!
//! A document too large for one model call is split by the
//! [`planner`] into overlapping chunks. For each chunk the [`enhancer`]
//! rewrites the base instruction and the [`processor`] runs a fresh step
//! loop seeded with the chunk. The [`integrator`] merges the ordered partial
//! answers with one synthesis call.
//!
//! ```ignore
//! let mut args = ExtraArgs::new();
//! args.insert("context".into(), document);
//! args.insert("query".into(), "Who founded the company?".into());
//!
//! let execution = LongContextAgent::new(&client, &tools, AgentConfig::new(), LongContextConfig::default())
//!     .new_task("Find facts that answer the query.", args)
//!     .execute()
//!     .await;
//! ```

pub mod enhancer;
pub mod integrator;
pub mod planner;
pub mod processor;
pub mod prompts;

pub use enhancer::{Enhancement, MetaPromptEnhancer};
pub use integrator::{IntegratedAnswer, ResultIntegrator};
pub use planner::{BoundaryKind, Chunk, ChunkPlan, ChunkPlanner, DocumentStats, plan};
pub use processor::{ChunkProcessor, SubTaskResult};

use crate::agent::config::{AgentConfig, GenerationOptions};
use crate::agent::events::{AgentEvent, EventHandler, NoopHandler};
use crate::agent::task::{ExtraArgs, Task};
use crate::agent::trajectory::{CancelCause, FailureReason, TerminalState, Trajectory};
use crate::api::backend::LlmClient;
use crate::tools::core::ToolRegistry;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Default target chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 8000;

/// Default overlap between consecutive chunks in bytes.
pub const DEFAULT_OVERLAP: usize = 200;

// ── Configuration ──────────────────────────────────────────────────

/// Tuning for the long-context pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct LongContextConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    /// Boundary search window before the size limit. `None` uses a fifth of
    /// `chunk_size`.
    pub tolerance: Option<usize>,
    /// Step budget of each chunk loop.
    pub chunk_max_steps: u32,
    /// Chunks processed at once. 1 is sequential.
    pub parallel_chunks: usize,
    /// Options for the instruction enhancement call.
    pub enhance: GenerationOptions,
    /// Options for each chunk loop's model calls.
    pub chunk: GenerationOptions,
}

impl Default for LongContextConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            tolerance: None,
            chunk_max_steps: 4,
            parallel_chunks: 1,
            enhance: GenerationOptions::default()
                .with_max_tokens(1500)
                .with_temperature(0.7),
            chunk: GenerationOptions::default()
                .with_max_tokens(2500)
                .with_temperature(0.3),
        }
    }
}

impl LongContextConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn with_tolerance(mut self, tolerance: usize) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_chunk_max_steps(mut self, steps: u32) -> Self {
        self.chunk_max_steps = steps;
        self
    }

    pub fn with_parallel_chunks(mut self, n: usize) -> Self {
        self.parallel_chunks = n.max(1);
        self
    }

    pub fn with_enhance_options(mut self, options: GenerationOptions) -> Self {
        self.enhance = options;
        self
    }

    pub fn with_chunk_options(mut self, options: GenerationOptions) -> Self {
        self.chunk = options;
        self
    }

    fn planner(&self) -> Result<ChunkPlanner, crate::error::PlanError> {
        let planner = ChunkPlanner::new(self.chunk_size, self.overlap)?;
        Ok(match self.tolerance {
            Some(t) => planner.with_tolerance(t),
            None => planner,
        })
    }
}

// ── Execution ──────────────────────────────────────────────────────

/// Result of a long-context run.
#[derive(Debug, Clone, Serialize)]
pub struct LongContextExecution {
    pub task: Task,
    pub final_result: Option<String>,
    pub terminal_state: TerminalState,
    /// `None` when the run failed before planning succeeded.
    pub plan: Option<ChunkPlan>,
    /// One per processed chunk, in chunk order.
    pub trajectories: Vec<Trajectory>,
    /// Per-chunk results. Only kept when the run did not complete.
    pub sub_results: Vec<SubTaskResult>,
    /// Chunks missing from the final answer.
    pub gaps: Vec<usize>,
}

impl LongContextExecution {
    pub fn success(&self) -> bool {
        self.terminal_state.is_completed()
    }

    fn failed(task: Task, reason: FailureReason) -> Self {
        Self {
            task,
            final_result: None,
            terminal_state: TerminalState::failed(reason),
            plan: None,
            trajectories: Vec::new(),
            sub_results: Vec::new(),
            gaps: Vec::new(),
        }
    }
}

// ── Agent ──────────────────────────────────────────────────────────

/// Orchestrates plan, enhance, process and integrate for one document.
///
/// The task must carry the document under the `context` argument and the
/// question under `query`. The goal is the base per-chunk instruction.
pub struct LongContextAgent<'a> {
    client: &'a LlmClient,
    tools: &'a ToolRegistry,
    config: AgentConfig,
    long: LongContextConfig,
    event_handler: &'a dyn EventHandler,
    cancel: CancellationToken,
}

impl<'a> LongContextAgent<'a> {
    /// `config` drives the synthesis call (its generation options) and the
    /// per-chunk task timeout; `long` drives planning and chunk loops.
    pub fn new(
        client: &'a LlmClient,
        tools: &'a ToolRegistry,
        config: AgentConfig,
        long: LongContextConfig,
    ) -> Self {
        Self {
            client,
            tools,
            config,
            long,
            event_handler: &NoopHandler,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn new_task(&self, goal: impl Into<String>, extra_args: ExtraArgs) -> LongContextRun<'_, 'a> {
        LongContextRun {
            agent: self,
            task: Task::new(goal, extra_args),
        }
    }

    pub async fn execute(&self, task: &Task) -> LongContextExecution {
        self.run(task.clone()).await
    }

    async fn run(&self, task: Task) -> LongContextExecution {
        let inputs = (
            task.context().map(str::to_string),
            task.query().map(str::to_string),
        );
        let (Some(context), Some(query)) = inputs else {
            let message = "long-context tasks need non-empty 'context' and 'query' arguments";
            return self.fail(task, FailureReason::Configuration {
                message: message.into(),
            });
        };

        let plan = match self.long.planner().and_then(|p| p.plan(&context)) {
            Ok(plan) => plan,
            Err(e) => {
                return self.fail(task, FailureReason::Configuration {
                    message: e.to_string(),
                });
            }
        };

        let stats = DocumentStats::of(&context);
        info!(
            "Long-context task {}: {} chars, {} lines, ~{} tokens, {} chunk(s)",
            task.id(),
            stats.chars,
            stats.lines,
            stats.estimated_tokens,
            plan.len()
        );
        self.event_handler.on_event(&AgentEvent::PlanReady {
            chunks: plan.len(),
            text_len: plan.text_len,
        });

        let chunk_config = AgentConfig {
            max_steps: self.long.chunk_max_steps,
            generation: self.long.chunk.clone(),
            ..self.config.clone()
        };
        let processor = ChunkProcessor::new(
            self.client,
            self.tools,
            MetaPromptEnhancer::new(self.client, self.long.enhance.clone()),
            chunk_config,
        )
        .with_parallel_chunks(self.long.parallel_chunks)
        .with_event_handler(self.event_handler)
        .with_cancellation(self.cancel.clone());

        let sub_results = processor
            .process_all(&query, task.goal(), &context, &plan)
            .await;
        let trajectories: Vec<Trajectory> =
            sub_results.iter().map(|r| r.trajectory.clone()).collect();

        let successes = sub_results.iter().filter(|r| r.success).count();
        self.event_handler.on_event(&AgentEvent::Synthesizing {
            successes,
            gaps: plan.len() - successes,
        });

        let integrator = ResultIntegrator::new(self.client, self.config.generation.clone());
        let integrated = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            r = integrator.integrate(&query, &plan, &sub_results) => Some(r),
        };

        let (terminal_state, final_result, gaps) = match integrated {
            Some(Ok(answer)) => (TerminalState::Completed, Some(answer.answer), answer.gaps),
            Some(Err(e)) => (
                TerminalState::failed(FailureReason::Integration {
                    message: e.to_string(),
                }),
                None,
                Vec::new(),
            ),
            None => (
                TerminalState::failed(FailureReason::Cancelled {
                    cause: CancelCause::Requested,
                }),
                None,
                Vec::new(),
            ),
        };

        match &terminal_state {
            TerminalState::Completed => {
                if let Some(result) = final_result.as_deref() {
                    self.event_handler
                        .on_event(&AgentEvent::Completed { result });
                }
            }
            other => {
                if let Some(reason) = other.failure() {
                    self.event_handler
                        .on_event(&AgentEvent::Failed { reason });
                }
            }
        }
        info!(
            "Long-context task {} finished: {} ({} of {} chunk(s) succeeded)",
            task.id(),
            terminal_state,
            successes,
            plan.len()
        );

        let sub_results = if terminal_state.is_completed() {
            Vec::new()
        } else {
            sub_results
        };
        LongContextExecution {
            task,
            final_result,
            terminal_state,
            plan: Some(plan),
            trajectories,
            sub_results,
            gaps,
        }
    }

    fn fail(&self, task: Task, reason: FailureReason) -> LongContextExecution {
        self.event_handler
            .on_event(&AgentEvent::Failed { reason: &reason });
        LongContextExecution::failed(task, reason)
    }
}

/// A long-context task bound to an agent, ready to execute.
pub struct LongContextRun<'h, 'a> {
    agent: &'h LongContextAgent<'a>,
    task: Task,
}

impl LongContextRun<'_, '_> {
    pub fn task(&self) -> &Task {
        &self.task
    }

    pub async fn execute(self) -> LongContextExecution {
        self.agent.run(self.task).await
    }
}
