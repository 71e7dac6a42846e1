//! Speech input controller
//!
//! Wraps the platform recognizer. One recognition session at a time; the
//! first final transcript of a session is surfaced once and ends the session.
//! The controller only counts as listening once the recognizer reports that
//! it started.

use super::EventSink;
use crate::resilience::classify::{
    handle_recognition_error, RecognitionErrorCode, RecognitionErrorPolicy,
};
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Recognizer session configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Keep the session open across pauses in speech
    pub continuous: bool,
    /// Report non-final results
    pub interim_results: bool,
    pub max_alternatives: u32,
    /// Recognition language, e.g. "en-US"
    pub lang: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            continuous: true,
            interim_results: false,
            max_alternatives: 1,
            lang: "en-US".to_string(),
        }
    }
}

/// Callbacks reported by a recognizer
#[derive(Clone, Debug, PartialEq)]
pub enum RecognitionEvent {
    Started,
    Result { transcript: String, is_final: bool },
    Error(RecognitionErrorCode),
    Ended,
}

/// Platform speech recognizer
pub trait RecognitionEngine: Send {
    /// Whether recognition is available on this platform
    fn is_supported(&self) -> bool;

    /// Register the sink that receives this engine's events
    fn attach(&mut self, sink: EventSink<RecognitionEvent>);

    fn configure(&mut self, config: &RecognitionConfig);

    /// Begin a recognition session
    fn start(&mut self) -> Result<()>;

    /// End the session gracefully; pending results may still arrive
    fn stop(&mut self);

    /// End the session immediately, discarding pending results
    fn abort(&mut self);
}

/// Recognizer for platforms without speech recognition
#[derive(Debug, Default)]
pub struct UnsupportedRecognizer;

impl RecognitionEngine for UnsupportedRecognizer {
    fn is_supported(&self) -> bool {
        false
    }

    fn attach(&mut self, _sink: EventSink<RecognitionEvent>) {}

    fn configure(&mut self, _config: &RecognitionConfig) {}

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn abort(&mut self) {}
}

/// Recognition session state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputState {
    /// No session
    #[default]
    Idle,
    /// `start` accepted, waiting for the recognizer to report it
    Starting,
    /// Recognizer confirmed the session
    Listening,
    /// Session hit an error; cleared by the recognizer's end report
    Failed,
}

/// What a recognizer event means to the turn loop
#[derive(Clone, Debug, PartialEq)]
pub enum InputOutcome {
    Started,
    /// Final, trimmed, non-empty transcript
    Transcript(String),
    Failed {
        code: RecognitionErrorCode,
        policy: RecognitionErrorPolicy,
    },
    /// Session ended without a transcript
    Ended,
}

/// Controller for the platform recognizer.
///
/// Events outside a requested session (late errors or start reports after a
/// manual stop) are ignored.
pub struct SpeechInput<R: RecognitionEngine> {
    engine: R,
    state: InputState,
    /// Fixed at construction
    supported: bool,
}

impl<R: RecognitionEngine> SpeechInput<R> {
    pub fn new(mut engine: R, config: &RecognitionConfig) -> Self {
        let supported = engine.is_supported();
        if supported {
            engine.configure(config);
        } else {
            info!("Speech recognition not supported, voice input disabled");
        }

        Self {
            engine,
            state: InputState::Idle,
            supported,
        }
    }

    pub fn attach(&mut self, sink: EventSink<RecognitionEvent>) {
        if self.supported {
            self.engine.attach(sink);
        }
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn is_listening(&self) -> bool {
        self.state == InputState::Listening
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    fn in_session(&self) -> bool {
        matches!(self.state, InputState::Starting | InputState::Listening)
    }

    /// Begin listening.
    ///
    /// Returns `Ok(false)` when recognition is unsupported or a session is
    /// already running. An engine failure leaves the controller in `Failed`.
    pub fn start(&mut self) -> Result<bool> {
        if !self.supported {
            debug!("Ignoring start: recognition unsupported");
            return Ok(false);
        }
        if self.in_session() {
            debug!("Ignoring start: session already running");
            return Ok(false);
        }

        match self.engine.start() {
            Ok(()) => {
                self.state = InputState::Starting;
                debug!("Recognition session requested");
                Ok(true)
            }
            Err(e) => {
                warn!("Recognizer failed to start: {}", e);
                self.state = InputState::Failed;
                Err(e)
            }
        }
    }

    /// End the current session, if any
    pub fn stop(&mut self) {
        if self.in_session() {
            self.engine.stop();
        }
        self.state = InputState::Idle;
    }

    /// End the current session immediately
    pub fn abort(&mut self) {
        if self.supported {
            self.engine.abort();
        }
        self.state = InputState::Idle;
    }

    /// Feed a recognizer event through the state machine
    pub fn handle_event(&mut self, event: RecognitionEvent) -> Option<InputOutcome> {
        match event {
            RecognitionEvent::Started => {
                if self.state != InputState::Starting {
                    debug!("Ignoring start report in {:?}", self.state);
                    return None;
                }
                self.state = InputState::Listening;
                Some(InputOutcome::Started)
            }

            RecognitionEvent::Result {
                transcript,
                is_final,
            } => {
                if !is_final {
                    return None;
                }
                if !self.in_session() {
                    debug!("Dropping result outside an active session");
                    return None;
                }

                let transcript = transcript.trim();
                if transcript.is_empty() {
                    return None;
                }

                // First final result ends the session
                self.state = InputState::Idle;
                self.engine.stop();
                Some(InputOutcome::Transcript(transcript.to_string()))
            }

            RecognitionEvent::Error(code) => {
                if !self.in_session() {
                    debug!("Ignoring recognition error {} in {:?}", code, self.state);
                    return None;
                }
                let policy = handle_recognition_error(&code);
                warn!("Recognition error: {} ({:?})", code, policy.action);
                self.state = match code {
                    RecognitionErrorCode::Aborted => InputState::Idle,
                    _ => InputState::Failed,
                };
                Some(InputOutcome::Failed { code, policy })
            }

            RecognitionEvent::Ended => match self.state {
                InputState::Starting | InputState::Listening => {
                    self.state = InputState::Idle;
                    Some(InputOutcome::Ended)
                }
                InputState::Failed => {
                    self.state = InputState::Idle;
                    None
                }
                InputState::Idle => None,
            },
        }
    }
}
