//! Conversation context sent along with each prompt

use crate::messages::{Message, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A message as exchanged with the conversation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Convert into a final transcript message
    pub fn to_message(&self) -> Message {
        Message::new(self.role.sender(), self.content.clone())
    }
}

impl From<&Message> for ConversationMessage {
    fn from(message: &Message) -> Self {
        Self::new(message.sender.role(), message.text.clone())
    }
}

impl fmt::Display for ConversationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role.as_str(), self.content)
    }
}

/// The last `size` transcript messages, oldest first
pub fn context_window(messages: &[Message], size: usize) -> Vec<ConversationMessage> {
    let start = messages.len().saturating_sub(size);
    messages[start..].iter().map(ConversationMessage::from).collect()
}
