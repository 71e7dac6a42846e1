//! Ordered chat transcript
//!
//! The transcript is append-only except for one transition: the trailing
//! assistant message that is still typing gets its final text. All changes go
//! through [`append_or_replace_trailing`], so at most one message is typing and
//! it is always the last one.

use super::types::{Message, Sender};
use crate::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Apply `message` to the transcript.
///
/// - A typing message finalizes any earlier typing message and is appended.
/// - A final assistant message replaces the trailing typing message in place.
/// - Any other final message finalizes the trailing typing message and is
///   appended.
pub fn append_or_replace_trailing(mut messages: Vec<Message>, mut message: Message) -> Vec<Message> {
    // Only the assistant types
    if message.is_typing && message.sender == Sender::User {
        message.is_typing = false;
    }

    match messages.last_mut() {
        Some(last) if last.is_typing => {
            if !message.is_typing && message.sender == Sender::Assistant {
                last.text = message.text;
                last.is_typing = false;
                return messages;
            }
            last.is_typing = false;
        }
        _ => {}
    }

    messages.push(message);
    messages
}

/// Check the typing invariant: at most one typing message, which is the last
/// one and was sent by the assistant.
pub fn typing_invariant_holds(messages: &[Message]) -> bool {
    let typing: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_typing)
        .map(|(i, _)| i)
        .collect();

    match typing.as_slice() {
        [] => true,
        [index] => *index + 1 == messages.len() && messages[*index].is_assistant(),
        _ => false,
    }
}

/// Chat transcript, oldest message first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Only changed through the reducer
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a transcript from stored history. Replayed messages are final.
    pub fn from_history(history: impl IntoIterator<Item = Message>) -> Self {
        let messages = history
            .into_iter()
            .map(|mut m| {
                m.is_typing = false;
                m
            })
            .collect();
        Self { messages }
    }

    /// Apply a message through the reducer
    pub fn apply(&mut self, message: Message) {
        let messages = std::mem::take(&mut self.messages);
        self.messages = append_or_replace_trailing(messages, message);
    }

    /// Finalize the trailing typing message if it is the one with `id`.
    ///
    /// Returns the finalized message, or `None` (changing nothing) when the
    /// trailing message is not that typing message.
    pub fn finish_typing(&mut self, id: Uuid) -> Option<Message> {
        let text = match self.trailing_typing() {
            Some(m) if m.id == id => m.text.clone(),
            _ => return None,
        };
        self.apply(Message::assistant(text));
        self.messages.last().cloned()
    }

    /// The trailing typing message, if any
    pub fn trailing_typing(&self) -> Option<&Message> {
        self.messages.last().filter(|m| m.is_typing)
    }

    /// The last `n` messages in chronological order
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Export as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.messages)?)
    }
}
