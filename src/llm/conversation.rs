//! Per-role chat history.

use super::{ChatMessage, Role};

/// Message history for one generator role.
///
/// The history starts with a framing (system prompt plus context messages). Turns are
/// appended after it, and [`Conversation::reset`] truncates back to the framing.
///
/// # Invariants
/// - `initial_len <= messages.len()`
/// - the first `initial_len` messages never change after construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    initial_len: usize,
}

impl Conversation {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system)],
            initial_len: 1,
        }
    }

    /// Add a context message to the framing. Only valid before the first turn.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        debug_assert_eq!(self.messages.len(), self.initial_len);
        self.messages.push(ChatMessage::user(context));
        self.initial_len = self.messages.len();
        self
    }

    /// Messages for a request: the history followed by `prompt`.
    pub fn request(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = self.messages.clone();
        messages.push(ChatMessage::user(prompt));
        messages
    }

    /// Record an answered prompt.
    pub fn push_turn(&mut self, prompt: impl Into<String>, answer: impl Into<String>) {
        self.messages.push(ChatMessage::user(prompt));
        self.messages.push(ChatMessage::assistant(answer));
    }

    /// Append a user note that is not part of the framing.
    pub fn push_note(&mut self, note: impl Into<String>) {
        self.messages.push(ChatMessage::user(note));
    }

    /// Drop everything after the framing.
    pub fn reset(&mut self) {
        self.messages.truncate(self.initial_len);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages added since the framing.
    pub fn turns(&self) -> usize {
        self.messages.len() - self.initial_len
    }

    pub fn last_answer(&self) -> Option<&str> {
        self.messages[self.initial_len..]
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}
