//! Merging ordered per-chunk answers into one final answer.

use crate::Message;
use crate::agent::config::GenerationOptions;
use crate::agent::conversation::Conversation;
use crate::api::backend::LlmClient;
use crate::error::IntegrationError;
use crate::longctx::planner::{Chunk, ChunkPlan};
use crate::longctx::processor::SubTaskResult;
use crate::longctx::prompts::{
    PartialAnswer, SYNTHESIS_SYSTEM_PROMPT, coverage_note, synthesis_message,
};
use serde::Serialize;
use tracing::{info, warn};

/// The merged answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegratedAnswer {
    pub answer: String,
    /// Indices of chunks that produced no usable answer.
    pub gaps: Vec<usize>,
    /// `false` when the synthesis call failed and the partial answers were
    /// concatenated instead.
    pub synthesized: bool,
}

/// Merges sub-results with one synthesis call.
pub struct ResultIntegrator<'a> {
    client: &'a LlmClient,
    options: GenerationOptions,
}

impl<'a> ResultIntegrator<'a> {
    pub fn new(client: &'a LlmClient, options: GenerationOptions) -> Self {
        Self { client, options }
    }

    /// Chunks without a successful result are passed to the synthesis call
    /// as known gaps and named in a coverage note on the answer.
    pub async fn integrate(
        &self,
        query: &str,
        plan: &ChunkPlan,
        results: &[SubTaskResult],
    ) -> Result<IntegratedAnswer, IntegrationError> {
        let mut partials = Vec::new();
        let mut gaps: Vec<&Chunk> = Vec::new();
        for chunk in &plan.chunks {
            match results
                .iter()
                .find(|r| r.chunk_index == chunk.index && r.success)
            {
                Some(result) => partials.push(PartialAnswer {
                    chunk,
                    answer: &result.answer,
                }),
                None => gaps.push(chunk),
            }
        }

        if partials.is_empty() {
            return Err(IntegrationError::AllChunksFailed { total: plan.len() });
        }
        info!(
            "Integrating {} partial answer(s), {} gap(s)",
            partials.len(),
            gaps.len()
        );

        let conversation = Conversation::from(vec![
            Message::system(SYNTHESIS_SYSTEM_PROMPT),
            Message::user(synthesis_message(query, plan, &partials, &gaps)),
        ]);
        let synthesized = match self.client.send(&conversation, &[], &self.options).await {
            Ok(response) => response
                .content
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            Err(e) => {
                warn!("Synthesis call failed: {e}; concatenating partial answers");
                None
            }
        };

        let (mut answer, synthesized) = match synthesized {
            Some(text) => (text, true),
            None => (concatenate(&partials), false),
        };
        if !gaps.is_empty() {
            answer.push_str("\n\n");
            answer.push_str(&coverage_note(&gaps));
        }

        Ok(IntegratedAnswer {
            answer,
            gaps: gaps.iter().map(|c| c.index).collect(),
            synthesized,
        })
    }
}

fn concatenate(partials: &[PartialAnswer<'_>]) -> String {
    partials
        .iter()
        .map(|p| p.answer.trim())
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
