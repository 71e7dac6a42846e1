//! Transcript presentation
//!
//! Consumes orchestrator events and renders the transcript as text. The
//! only thing it sends back is typing completion.

pub mod transcript_view;
pub mod typing;

pub use transcript_view::{speaker, TranscriptView};
pub use typing::{run_typing, TypingAnimation, DEFAULT_TYPING_SPEED};
