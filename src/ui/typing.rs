//! Typing animation for assistant messages
//!
//! Reveals a message one character per tick and reports completion once.
//! Completion is handed back to the orchestrator, which finalizes the message.

use crate::integration::orchestrator::OrchestratorHandle;
use crate::messages::Message;
use crate::Result;
use std::time::Duration;
use tracing::debug;

/// Default delay between revealed characters
pub const DEFAULT_TYPING_SPEED: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct TypingAnimation {
    chars: Vec<char>,
    revealed: usize,
    completed: bool,
}

impl TypingAnimation {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            revealed: 0,
            completed: false,
        }
    }

    /// Advance by one tick. Returns `true` on the tick that completes the
    /// animation and `false` on every other tick.
    pub fn tick(&mut self) -> bool {
        if self.completed {
            return false;
        }

        if self.revealed < self.chars.len() {
            self.revealed += 1;
            return false;
        }

        // One extra tick with the full text shown before completing
        self.completed = true;
        true
    }

    /// Text revealed so far
    pub fn visible(&self) -> String {
        self.chars[..self.revealed].iter().collect()
    }

    /// Most recently revealed character
    pub fn last_revealed(&self) -> Option<char> {
        self.revealed.checked_sub(1).map(|i| self.chars[i])
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Ticks from start to completion
    pub fn total_ticks(&self) -> usize {
        self.chars.len() + 1
    }
}

/// Animate `message` at `speed` per character, calling `on_progress` with
/// each revealed character, then report completion through `handle`.
pub async fn run_typing(
    handle: &OrchestratorHandle,
    message: &Message,
    speed: Duration,
    mut on_progress: impl FnMut(char),
) -> Result<()> {
    let mut animation = TypingAnimation::new(&message.text);
    debug!("Typing {} characters", message.text.chars().count());

    loop {
        tokio::time::sleep(speed).await;
        if animation.tick() {
            break;
        }
        if let Some(c) = animation.last_revealed() {
            on_progress(c);
        }
    }

    handle.finish_typing(message.id)
}
