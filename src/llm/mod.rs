//! Prompt construction for the conversation service
//!
//! This module provides:
//! - The context window taken from the transcript
//! - The prompt template and the fixed assistant sentences

pub mod context;
pub mod prompts;

// Re-export commonly used types
pub use context::{context_window, ConversationMessage};
pub use prompts::{build_prompt, reply_or_fallback};
