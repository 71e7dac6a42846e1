//! Assistant state shared with the presentation layer
//!
//! The orchestrator task is the only writer. Readers take snapshots.

use crate::messages::{Message, Transcript};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Display projection of the turn flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TurnStatus {
    #[default]
    Initializing,
    Ready,
    Listening,
    Thinking,
    Speaking,
}

impl TurnStatus {
    /// Status line shown to the user
    pub fn label(&self) -> &'static str {
        match self {
            TurnStatus::Initializing => "Initializing...",
            TurnStatus::Ready => "Ready to help",
            TurnStatus::Listening => "Listening for you...",
            TurnStatus::Thinking => "Thinking...",
            TurnStatus::Speaking => "Speaking...",
        }
    }
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derive the status from the turn flags.
///
/// Listening wins over speaking, speaking over idle, and a turn in flight
/// with neither shows as thinking.
pub fn derive_status(is_listening: bool, is_speaking: bool, is_processing: bool) -> TurnStatus {
    if is_listening {
        TurnStatus::Listening
    } else if is_speaking {
        TurnStatus::Speaking
    } else if !is_processing {
        TurnStatus::Ready
    } else {
        TurnStatus::Thinking
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssistantState {
    pub transcript: Transcript,
    pub status: TurnStatus,
    pub is_listening: bool,
    pub is_speaking: bool,
    pub is_processing: bool,
    pub session_id: Option<String>,
    pub voice_input_supported: bool,
    pub voice_output_supported: bool,
    /// Friendly message of the latest failure. Cleared by the next answered
    /// turn or resolved session.
    pub last_error: Option<String>,
}

impl AssistantState {
    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }
}

/// Thread-safe handle to the assistant state
#[derive(Debug, Clone, Default)]
pub struct SharedAssistantState {
    inner: Arc<RwLock<AssistantState>>,
}

impl SharedAssistantState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> AssistantState {
        self.inner.read().clone()
    }

    pub fn status(&self) -> TurnStatus {
        self.inner.read().status
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.read().transcript.messages().to_vec()
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.read().session_id.clone()
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut AssistantState) -> R) -> R {
        f(&mut self.inner.write())
    }
}
