//! Speech input and output controllers
//!
//! This module provides:
//! - Speech input: owns one recognition session at a time
//! - Speech output: owns one synthesis utterance at a time
//! - Voice settings read on every utterance
//!
//! The platform recognizer and synthesizer sit behind the `RecognitionEngine`
//! and `SynthesisEngine` traits. Engines report their callbacks through an
//! [`EventSink`] handed to them once, at construction of the orchestrator.

pub mod console;
pub mod input;
pub mod output;
pub mod settings;

use std::fmt;
use std::sync::Arc;

// Re-export commonly used types
pub use console::{ConsoleSynthesizer, LineRecognizer};
pub use input::{
    InputOutcome, InputState, RecognitionConfig, RecognitionEngine, RecognitionEvent, SpeechInput,
    UnsupportedRecognizer,
};
pub use output::{
    select_voice, OutputOutcome, SpeechOutput, SynthesisEngine, SynthesisEvent, UnsupportedSynthesizer,
    Utterance, Voice,
};
pub use settings::{SettingsSource, SharedSettings, VoiceSettings};

/// Callback target for platform speech events
pub struct EventSink<E> {
    deliver: Arc<dyn Fn(E) + Send + Sync>,
}

impl<E> EventSink<E> {
    pub fn new(deliver: impl Fn(E) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Sink that drops every event
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    pub fn emit(&self, event: E) {
        (self.deliver)(event);
    }
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            deliver: Arc::clone(&self.deliver),
        }
    }
}

impl<E> fmt::Debug for EventSink<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}
