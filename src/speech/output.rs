//! Speech output controller
//!
//! Wraps the platform synthesizer. At most one utterance is in flight: a new
//! `speak` cancels the previous one, and events for cancelled utterances are
//! ignored.

use super::settings::VoiceSettings;
use super::EventSink;
use crate::Result;
use tracing::{debug, info, warn};

const FALLBACK_VOICE_NAMES: [&str; 2] = ["Google US English Female", "Samantha"];

/// An installed synthesizer voice
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Voice {
    /// Platform voice name, e.g. "Samantha"
    pub name: String,
    /// BCP 47 language tag, e.g. "en-US"
    pub lang: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }

    fn is_english(&self) -> bool {
        self.lang.starts_with("en")
    }
}

/// Pick a voice, preferring in order: the configured name, a known female
/// English voice, any female English voice, any English voice, the first
/// voice.
pub fn select_voice(voices: &[Voice], preferred: Option<&str>) -> Option<Voice> {
    if let Some(name) = preferred {
        if let Some(voice) = voices.iter().find(|v| v.name == name) {
            return Some(voice.clone());
        }
        debug!("Preferred voice {} not available", name);
    }

    FALLBACK_VOICE_NAMES
        .iter()
        .find_map(|name| voices.iter().find(|v| v.name.contains(name)))
        .or_else(|| {
            voices
                .iter()
                .find(|v| v.name.contains("Female") && v.is_english())
        })
        .or_else(|| voices.iter().find(|v| v.is_english()))
        .or_else(|| voices.first())
        .cloned()
}

/// One synthesis request
#[derive(Clone, Debug, PartialEq)]
pub struct Utterance {
    /// Controller-assigned id echoed back in synthesis events
    pub id: u64,
    pub text: String,
    /// Selected voice, `None` for the platform default
    pub voice: Option<Voice>,
    /// Speaking rate, 1.0 is normal speed
    pub rate: f32,
    pub pitch: f32,
    /// Volume from 0.0 to 1.0
    pub volume: f32,
}

/// Callbacks reported by a synthesizer
#[derive(Clone, Debug, PartialEq)]
pub enum SynthesisEvent {
    Started { id: u64 },
    Ended { id: u64 },
    Failed { id: u64, error: String },
}

/// Platform speech synthesizer
pub trait SynthesisEngine: Send {
    fn is_supported(&self) -> bool;

    /// Register the sink that receives this engine's events
    fn attach(&mut self, sink: EventSink<SynthesisEvent>);

    /// Currently installed voices. May be empty until the platform loads them.
    fn voices(&self) -> Vec<Voice>;

    fn speak(&mut self, utterance: Utterance) -> Result<()>;

    /// Drop the current utterance and anything queued
    fn cancel(&mut self);

    fn pause(&mut self);

    fn resume(&mut self);
}

/// Synthesizer for platforms without speech output
#[derive(Debug, Default)]
pub struct UnsupportedSynthesizer;

impl SynthesisEngine for UnsupportedSynthesizer {
    fn is_supported(&self) -> bool {
        false
    }

    fn attach(&mut self, _sink: EventSink<SynthesisEvent>) {}

    fn voices(&self) -> Vec<Voice> {
        Vec::new()
    }

    fn speak(&mut self, _utterance: Utterance) -> Result<()> {
        Ok(())
    }

    fn cancel(&mut self) {}

    fn pause(&mut self) {}

    fn resume(&mut self) {}
}

/// What a synthesizer event means to the turn loop
#[derive(Clone, Debug, PartialEq)]
pub enum OutputOutcome<T> {
    Started,
    /// Utterance finished; carries the follow-up registered with `speak`
    Finished(T),
    Failed(String),
}

struct ActiveUtterance<T> {
    id: u64,
    follow_up: T,
}

/// Controller for the platform synthesizer.
///
/// `T` is the follow-up handed back when an utterance finishes normally.
pub struct SpeechOutput<S: SynthesisEngine, T = ()> {
    engine: S,
    supported: bool,
    active: Option<ActiveUtterance<T>>,
    paused: bool,
    next_id: u64,
}

impl<S: SynthesisEngine, T> SpeechOutput<S, T> {
    pub fn new(engine: S) -> Self {
        let supported = engine.is_supported();
        if !supported {
            info!("Speech synthesis not supported, replies will be text only");
        }

        Self {
            engine,
            supported,
            active: None,
            paused: false,
            next_id: 1,
        }
    }

    pub fn attach(&mut self, sink: EventSink<SynthesisEvent>) {
        if self.supported {
            self.engine.attach(sink);
        }
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// True from `speak` until the utterance ends, fails or is cancelled
    pub fn is_speaking(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Speak `text`, cancelling anything in flight.
    ///
    /// `follow_up` is handed back through [`OutputOutcome::Finished`] when this
    /// utterance ends normally. Returns the utterance id, or `None` when
    /// nothing was spoken.
    pub fn speak(&mut self, text: &str, settings: &VoiceSettings, follow_up: T) -> Result<Option<u64>> {
        if !self.supported {
            debug!("Skipping speech: synthesis unsupported");
            return Ok(None);
        }

        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        if self.active.take().is_some() {
            debug!("Cancelling in-flight utterance");
            self.engine.cancel();
        }
        self.paused = false;

        let id = self.next_id;
        self.next_id += 1;

        let settings = settings.clamped();
        let voices = self.engine.voices();
        let utterance = Utterance {
            id,
            text: text.to_string(),
            voice: select_voice(&voices, settings.preferred_voice()),
            rate: settings.effective_rate(),
            pitch: settings.effective_pitch(),
            volume: settings.effective_volume(),
        };

        self.engine.speak(utterance)?;
        self.active = Some(ActiveUtterance { id, follow_up });
        Ok(Some(id))
    }

    /// Stop speaking. The cancelled utterance's follow-up is dropped.
    pub fn cancel(&mut self) {
        if self.supported {
            self.engine.cancel();
        }
        self.active = None;
        self.paused = false;
    }

    /// Pause the active utterance. Does nothing when idle.
    pub fn pause(&mut self) {
        if self.supported && self.active.is_some() {
            self.engine.pause();
            self.paused = true;
        }
    }

    /// Resume after `pause`
    pub fn resume(&mut self) {
        if self.supported && self.paused {
            self.engine.resume();
            self.paused = false;
        }
    }

    /// Feed a synthesizer event through the controller
    pub fn handle_event(&mut self, event: SynthesisEvent) -> Option<OutputOutcome<T>> {
        let current = self.active.as_ref().map(|a| a.id);

        match event {
            SynthesisEvent::Started { id } if current == Some(id) => Some(OutputOutcome::Started),
            SynthesisEvent::Ended { id } if current == Some(id) => {
                self.paused = false;
                self.active
                    .take()
                    .map(|active| OutputOutcome::Finished(active.follow_up))
            }
            SynthesisEvent::Failed { id, error } if current == Some(id) => {
                warn!("Speech synthesis failed: {}", error);
                self.active = None;
                self.paused = false;
                Some(OutputOutcome::Failed(error))
            }
            stale => {
                debug!("Ignoring stale synthesis event {:?}", stale);
                None
            }
        }
    }
}
