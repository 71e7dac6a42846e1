//! Text rendering of the transcript
//!
//! Tracks a typing animation for every assistant message that arrives with
//! `is_typing` set and renders the partially revealed text until the
//! orchestrator finalizes it.

use crate::integration::orchestrator::AssistantEvent;
use crate::llm::prompts::ASSISTANT_NAME;
use crate::messages::{Message, Sender};
use crate::ui::typing::TypingAnimation;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct TranscriptView {
    animations: HashMap<Uuid, TypingAnimation>,
}

impl TranscriptView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow an orchestrator event
    pub fn apply(&mut self, event: &AssistantEvent) {
        match event {
            AssistantEvent::MessageAppended(message) if message.is_typing => {
                self.animations
                    .insert(message.id, TypingAnimation::new(&message.text));
            }
            AssistantEvent::MessageFinalized(message) => {
                self.animations.remove(&message.id);
            }
            AssistantEvent::TranscriptCleared => self.animations.clear(),
            _ => {}
        }
    }

    /// Advance every running animation by one tick. Returns the ids whose
    /// animation completed on this tick.
    pub fn tick(&mut self) -> Vec<Uuid> {
        self.animations
            .iter_mut()
            .filter_map(|(id, animation)| animation.tick().then_some(*id))
            .collect()
    }

    pub fn is_animating(&self) -> bool {
        self.animations.values().any(|a| !a.is_complete())
    }

    /// One line per message
    pub fn render(&self, messages: &[Message]) -> Vec<String> {
        messages.iter().map(|m| self.render_message(m)).collect()
    }

    pub fn render_message(&self, message: &Message) -> String {
        let text = match self.animations.get(&message.id) {
            Some(animation) if message.is_typing => animation.visible(),
            _ => message.text.clone(),
        };
        format!("{}: {}", speaker(message.sender), text)
    }
}

/// Label shown in front of a message
pub fn speaker(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "You",
        Sender::Assistant => ASSISTANT_NAME,
    }
}
