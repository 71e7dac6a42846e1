//! Fixed assistant sentences and the prompt template

use super::context::ConversationMessage;

pub const ASSISTANT_NAME: &str = "Tessa";

pub const DEFAULT_AGENT_NAME: &str = "tessa_assistant";

/// Number of transcript messages sent as context
pub const DEFAULT_CONTEXT_WINDOW: usize = 6;

pub const GREETING: &str = "Hi! I'm Tessa, your personal assistant. How can I help you today?";

pub const OFFLINE_MESSAGE: &str = "You're offline. Please check your internet connection.";

/// Spoken when the LLM returns an empty reply
pub const NO_UNDERSTANDING_MESSAGE: &str =
    "I'm sorry, I didn't quite understand that. Could you rephrase?";

pub const SESSION_UNAVAILABLE_MESSAGE: &str =
    "I couldn't load our conversation. Please refresh the page.";

const PREAMBLE: &str = "You are Tessa, a helpful and friendly personal assistant. You have a warm, conversational personality.";

const CLOSING: &str = "Respond naturally and helpfully. Keep responses concise but warm.";

/// Build the LLM prompt from the recent context and the new user text.
pub fn build_prompt(context: &[ConversationMessage], user_text: &str) -> String {
    let history = context
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\nPrevious conversation:\n{}\n\nUser: {}\n\n{}",
        PREAMBLE, history, user_text, CLOSING
    )
}

/// Use `reply` unless it is blank
pub fn reply_or_fallback(reply: String) -> String {
    if reply.trim().is_empty() {
        NO_UNDERSTANDING_MESSAGE.to_string()
    } else {
        reply
    }
}
