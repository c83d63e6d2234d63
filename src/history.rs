//! Append-only conversation history for multi-turn sessions.
//!
//! The history belongs to the caller's session, never to the backend client.
//! Methods that add a turn take `&mut self`, so two in-flight turns cannot
//! mutate the same history at once without the caller serialising them.

use crate::content::{Message, Role};
use serde::Serialize;

/// Ordered sequence of messages; insertion order is conversation order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
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

    /// Append one completed exchange: the user turn followed by the
    /// assistant's answer.
    pub fn record_turn(&mut self, user: Message, answer: impl Into<String>) {
        self.messages.push(user);
        self.messages.push(Message::assistant(answer));
    }

    /// The request payload for a new turn: every prior message followed by
    /// `next`. The history itself is left untouched.
    pub fn with_next(&self, next: &Message) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        out.extend(self.messages.iter().cloned());
        out.push(next.clone());
        out
    }

    /// Whether any earlier turn carried an image. Follow-up text turns in
    /// such a conversation still need a vision-capable backend.
    pub fn has_images(&self) -> bool {
        self.messages.iter().any(|m| m.image_count() > 0)
    }

    /// Text of the most recent assistant turn, if any.
    pub fn last_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .and_then(|m| match &m.content {
                crate::content::MessageContent::Text(t) => Some(t.as_str()),
                crate::content::MessageContent::Parts(_) => None,
            })
    }
}
