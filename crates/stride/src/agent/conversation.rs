//! Append-only message history for one task.

use crate::{Message, MessageRole};
use serde::{Deserialize, Serialize};

/// Ordered messages exchanged during a task.
///
/// Messages can only be appended. There is no removal or in-place edit API,
/// so everything the model saw stays visible in the final record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Text of the most recent assistant message that carried any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == MessageRole::Assistant)
            .find_map(|m| m.content.as_deref().filter(|c| !c.trim().is_empty()))
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_assistant_text_skips_empty_turns() {
        let mut conv = Conversation::new();
        conv.push(Message::system("sys"));
        conv.push(Message::assistant_text("first draft"));
        conv.push(Message::assistant(None, vec![]));
        conv.push(Message::tool_result("c1", "ok"));
        assert_eq!(conv.last_assistant_text(), Some("first draft"));
        assert_eq!(conv.len(), 4);
    }

    #[test]
    fn empty_has_no_assistant_text() {
        assert!(Conversation::new().last_assistant_text().is_none());
        assert!(Conversation::new().is_empty());
    }
}
