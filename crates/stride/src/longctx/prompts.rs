//! Fixed templates for the long-context pipeline.
//!
//! The wording is tuning, not contract: tests only rely on the sections
//! being present.

use crate::agent::prompt::PromptBuilder;
use crate::longctx::planner::{Chunk, ChunkPlan};
use crate::tools::builtin::TASK_DONE;

/// System prompt for the one-shot instruction enhancement call.
pub const ENHANCER_SYSTEM_PROMPT: &str = "\
You are a prompt engineer. You rewrite short instructions into detailed, \
self-contained instructions for a sub-agent that will see only one fragment \
of a much larger document.

The rewritten instruction must:
- tell the sub-agent to use only information present in its fragment,
- say how to handle text cut off mid-sentence at either edge,
- ask for a short, extraction-focused answer that can be merged with the \
answers for other fragments,
- ask the sub-agent to state plainly when the fragment holds nothing relevant.

Reply with the rewritten instruction only, without commentary.";

/// System prompt for each per-chunk step loop.
pub fn chunk_system_prompt() -> String {
    format!(
        "You analyse one chunk of a larger document as part of a long-context task. \
         You see only this chunk. Neighbouring chunks overlap it slightly and are \
         handled separately.\n\n\
         Follow the instructions you are given precisely. Extract only what this \
         chunk contains and do not speculate about the rest of the document. If the \
         chunk holds nothing relevant, say so.\n\n\
         When done, call `{TASK_DONE}` with your answer for this chunk in the \
         `result` argument."
    )
}

/// System prompt for the final synthesis call.
pub const SYNTHESIS_SYSTEM_PROMPT: &str = "\
You merge partial answers produced from consecutive chunks of one document \
into a single answer to the original query.

Adjacent chunks overlap, so the same fact may appear in two partial answers; \
report it once. Keep the document order where it matters. Some chunks may be \
listed as gaps because their analysis failed: do not invent their content, \
and mention that the answer may be incomplete for those parts.

Reply with the final answer only.";

/// User message for the enhancement call.
pub fn enhancer_message(base_instruction: &str, chunk_context_summary: &str) -> String {
    PromptBuilder::new("Rewrite this instruction for chunk-based processing.")
        .section("Instruction", base_instruction)
        .section("Chunk", chunk_context_summary)
        .build()
}

/// Short description of a chunk's place in the document, given to the
/// enhancer.
pub fn chunk_context_summary(query: &str, plan: &ChunkPlan, chunk: &Chunk) -> String {
    format!(
        "Query: {query}\nFragment {} of {}, bytes {}..{} of a {}-byte document.",
        chunk.index + 1,
        plan.len(),
        chunk.start,
        chunk.end,
        plan.text_len
    )
}

/// Seeded user message for one chunk's step loop.
pub fn chunk_message(
    instruction: &str,
    query: &str,
    plan: &ChunkPlan,
    chunk: &Chunk,
    chunk_text: &str,
) -> String {
    PromptBuilder::new("")
        .section("Instructions", instruction)
        .section("Query", query)
        .section(
            "Position",
            format!(
                "Chunk {} of {} (bytes {}..{}, overlap {} with neighbours).",
                chunk.index + 1,
                plan.len(),
                chunk.start,
                chunk.end,
                plan.overlap
            ),
        )
        .section("Chunk text", chunk_text)
        .build()
}

/// One ordered partial answer handed to the synthesis call.
pub struct PartialAnswer<'a> {
    pub chunk: &'a Chunk,
    pub answer: &'a str,
}

/// User message for the synthesis call.
pub fn synthesis_message(
    query: &str,
    plan: &ChunkPlan,
    partials: &[PartialAnswer<'_>],
    gaps: &[&Chunk],
) -> String {
    let answers = partials
        .iter()
        .map(|p| {
            format!(
                "### Chunk {} (bytes {}..{})\n{}",
                p.chunk.index + 1,
                p.chunk.start,
                p.chunk.end,
                p.answer.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    let gap_list = gaps
        .iter()
        .map(|c| format!("- chunk {} (bytes {}..{})", c.index + 1, c.start, c.end))
        .collect::<Vec<_>>()
        .join("\n");

    PromptBuilder::new("")
        .section("Query", query)
        .section(
            "Document",
            format!(
                "{} bytes in {} chunk(s); consecutive chunks overlap by up to {} bytes.",
                plan.text_len,
                plan.len(),
                plan.overlap
            ),
        )
        .section("Partial answers", answers)
        .section_if(!gaps.is_empty(), "Known gaps", || gap_list)
        .build()
}

/// Note appended to an integrated answer when chunks are missing.
pub fn coverage_note(gaps: &[&Chunk]) -> String {
    let list = gaps
        .iter()
        .map(|c| format!("{} (bytes {}..{})", c.index + 1, c.start, c.end))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Note: this answer does not cover chunk(s) {list}, which could not be analysed.")
}
