//! Per-chunk execution: enhance the instruction, then run a fresh step loop
//! seeded with the chunk.

use crate::Message;
use crate::agent::config::AgentConfig;
use crate::agent::events::{AgentEvent, EventHandler, NoopHandler};
use crate::agent::harness::Harness;
use crate::agent::task::{ExtraArgs, QUERY_KEY};
use crate::agent::trajectory::{TerminalState, Trajectory};
use crate::api::backend::LlmClient;
use crate::longctx::enhancer::{Enhancement, MetaPromptEnhancer};
use crate::longctx::planner::{Chunk, ChunkPlan};
use crate::longctx::prompts::{chunk_context_summary, chunk_message, chunk_system_prompt};
use crate::tools::core::ToolRegistry;
use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Outcome of processing one chunk.
#[derive(Debug, Clone, Serialize)]
pub struct SubTaskResult {
    pub chunk_index: usize,
    /// The instruction the chunk loop was seeded with.
    pub enhanced_prompt: String,
    /// Whether `enhanced_prompt` came from the enhancer or is the base
    /// instruction.
    pub prompt_enhanced: bool,
    /// The chunk's `task_done` result, or the best partial text.
    pub answer: String,
    pub success: bool,
    pub terminal_state: TerminalState,
    pub trajectory: Trajectory,
}

/// Runs the step loop once per chunk.
pub struct ChunkProcessor<'a> {
    client: &'a LlmClient,
    tools: &'a ToolRegistry,
    enhancer: MetaPromptEnhancer<'a>,
    config: AgentConfig,
    parallel_chunks: usize,
    event_handler: &'a dyn EventHandler,
    cancel: CancellationToken,
}

impl<'a> ChunkProcessor<'a> {
    /// `config` is the per-chunk loop configuration (smaller step budget,
    /// chunk generation options). Its system prompt is replaced by the chunk
    /// prompt.
    pub fn new(
        client: &'a LlmClient,
        tools: &'a ToolRegistry,
        enhancer: MetaPromptEnhancer<'a>,
        config: AgentConfig,
    ) -> Self {
        Self {
            client,
            tools,
            enhancer,
            config: config.with_system_prompt(chunk_system_prompt()),
            parallel_chunks: 1,
            event_handler: &NoopHandler,
            cancel: CancellationToken::new(),
        }
    }

    /// Process up to `n` chunks at once. Results keep chunk order.
    pub fn with_parallel_chunks(mut self, n: usize) -> Self {
        self.parallel_chunks = n.max(1);
        self
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    /// Chunk loops get child tokens of `token`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Process every chunk of `plan`, returning one result per chunk in
    /// chunk order.
    pub async fn process_all(
        &self,
        query: &str,
        base_instruction: &str,
        text: &str,
        plan: &ChunkPlan,
    ) -> Vec<SubTaskResult> {
        futures::stream::iter(
            plan.chunks
                .iter()
                .map(|chunk| self.process(query, base_instruction, text, plan, chunk)),
        )
        .buffered(self.parallel_chunks)
        .collect()
        .await
    }

    /// Enhance the instruction for `chunk`, then run its step loop.
    pub async fn process(
        &self,
        query: &str,
        base_instruction: &str,
        text: &str,
        plan: &ChunkPlan,
        chunk: &Chunk,
    ) -> SubTaskResult {
        let total = plan.len();
        self.event_handler.on_event(&AgentEvent::ChunkStarted {
            index: chunk.index,
            total,
        });

        let summary = chunk_context_summary(query, plan, chunk);
        let enhancement = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Enhancement {
                instruction: base_instruction.to_string(),
                enhanced: false,
                fallback_reason: Some("cancelled".into()),
            },
            e = self.enhancer.enhance(base_instruction, &summary) => e,
        };
        if let Some(reason) = enhancement.fallback_reason.as_deref() {
            self.event_handler.on_event(&AgentEvent::EnhancementFallback {
                index: chunk.index,
                reason,
            });
        }

        let chunk_text = plan.slice(text, chunk);
        debug!(
            "Chunk {}/{}: {} bytes, instruction {} chars",
            chunk.index + 1,
            total,
            chunk_text.len(),
            enhancement.instruction.len()
        );

        let mut extra_args = ExtraArgs::new();
        extra_args.insert(QUERY_KEY.into(), query.to_string());
        extra_args.insert("chunk".into(), format!("{}/{}", chunk.index + 1, total));

        let harness = Harness::new(self.client, self.tools, self.config.clone())
            .with_event_handler(self.event_handler)
            .with_cancellation(self.cancel.child_token());
        let seed = vec![
            Message::system(&harness.config().system_prompt),
            Message::user(chunk_message(
                &enhancement.instruction,
                query,
                plan,
                chunk,
                chunk_text,
            )),
        ];
        let execution = harness
            .new_task(
                format!("{base_instruction} (chunk {}/{total})", chunk.index + 1),
                extra_args,
            )
            .with_seed_messages(seed)
            .execute()
            .await;

        self.event_handler.on_event(&AgentEvent::ChunkFinished {
            index: chunk.index,
            total,
            state: &execution.terminal_state,
        });

        SubTaskResult {
            chunk_index: chunk.index,
            enhanced_prompt: enhancement.instruction,
            prompt_enhanced: enhancement.enhanced,
            answer: execution.final_result.unwrap_or_default(),
            success: execution.terminal_state.is_completed(),
            terminal_state: execution.terminal_state,
            trajectory: execution.trajectory,
        }
    }
}
