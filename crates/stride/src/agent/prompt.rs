//! Prompt assembly for the step loop.
//!
//! [`PromptBuilder`] joins `## Section` blocks into one message body. The
//! harness uses it to seed each task; the long-context templates in
//! [`crate::longctx::prompts`] use it for chunk and synthesis messages.

use crate::agent::task::{CONTEXT_KEY, Task};
use crate::tools::builtin::TASK_DONE;

/// System prompt used when [`AgentConfig`](super::config::AgentConfig) is
/// left at its default.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an autonomous agent that solves tasks by calling tools.

Work in small steps. Each reply may invoke one or more of the tools you have \
been given; their results will be returned to you. Tool failures are reported \
as results, so read them and adapt instead of repeating the same call.

When the task is finished, call the `task_done` tool with your complete final \
answer in the `result` argument. Plain text replies do not end the task.";

/// User message appended after a reply that invoked no tools.
pub fn completion_reminder() -> String {
    format!(
        "You replied without calling a tool. If the task is finished, call `{TASK_DONE}` \
         with your final answer in the `result` argument. Otherwise continue working \
         with the available tools."
    )
}

/// Builder for multi-section prompt bodies.
///
/// Sections are joined with double newlines. Empty sections are skipped.
///
/// ```
/// use stride::agent::prompt::PromptBuilder;
///
/// let prompt = PromptBuilder::new("Answer the question.")
///     .section("Question", "Who wrote Hamlet?")
///     .section_opt("Hints", None::<String>)
///     .build();
///
/// assert!(prompt.contains("## Question"));
/// assert!(!prompt.contains("## Hints"));
/// ```
pub struct PromptBuilder {
    sections: Vec<String>,
}

impl PromptBuilder {
    /// Start with a preamble, included as-is without a heading.
    pub fn new(preamble: impl Into<String>) -> Self {
        let preamble = preamble.into();
        Self {
            sections: if preamble.is_empty() {
                Vec::new()
            } else {
                vec![preamble]
            },
        }
    }

    /// Append a `## heading` section. Skipped if `content` is empty.
    pub fn section(mut self, heading: &str, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.is_empty() {
            self.sections.push(format!("## {heading}\n\n{content}"));
        }
        self
    }

    /// Conditionally append a section. `content_fn` only runs when needed.
    pub fn section_if(
        self,
        condition: bool,
        heading: &str,
        content_fn: impl FnOnce() -> String,
    ) -> Self {
        if condition {
            self.section(heading, content_fn())
        } else {
            self
        }
    }

    /// Append a section only if the content is `Some`.
    pub fn section_opt(self, heading: &str, content: Option<impl Into<String>>) -> Self {
        match content {
            Some(c) => self.section(heading, c),
            None => self,
        }
    }

    /// Append raw text without a heading. Skipped if empty.
    pub fn raw(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.is_empty() {
            self.sections.push(content);
        }
        self
    }

    pub fn build(self) -> String {
        self.sections.join("\n\n")
    }
}

/// The opening user message for an ordinary task: the goal plus every extra
/// argument except the bulk `context` text.
pub fn task_message(task: &Task) -> String {
    let extras: Vec<String> = task
        .extra_args()
        .iter()
        .filter(|(key, _)| key.as_str() != CONTEXT_KEY)
        .map(|(key, value)| format!("- {key}: {value}"))
        .collect();

    PromptBuilder::new("")
        .section("Task", task.goal())
        .section_if(!extras.is_empty(), "Arguments", || extras.join("\n"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn preamble_only() {
        assert_eq!(PromptBuilder::new("You are an agent.").build(), "You are an agent.");
    }

    #[test]
    fn empty_preamble_and_sections_skipped() {
        let prompt = PromptBuilder::new("")
            .section("Empty", "")
            .section("Present", "content")
            .raw("")
            .build();
        assert_eq!(prompt, "## Present\n\ncontent");
    }

    #[test]
    fn section_if_false_excluded() {
        let prompt = PromptBuilder::new("P")
            .section_if(false, "Inactive", || "should not appear".into())
            .raw("tail")
            .build();
        assert_eq!(prompt, "P\n\ntail");
    }

    #[test]
    fn task_message_lists_arguments_but_not_context() {
        let mut extra = BTreeMap::new();
        extra.insert("context".to_string(), "very long document".to_string());
        extra.insert("language".to_string(), "en".to_string());
        let task = Task::new("Translate the title", extra);

        let msg = task_message(&task);
        assert!(msg.contains("## Task\n\nTranslate the title"));
        assert!(msg.contains("- language: en"));
        assert!(!msg.contains("very long document"));
    }

    #[test]
    fn reminder_names_completion_tool() {
        assert!(completion_reminder().contains(TASK_DONE));
        assert!(DEFAULT_SYSTEM_PROMPT.contains(TASK_DONE));
    }
}
