//! Line-based speech engines for terminals
//!
//! `LineRecognizer` treats each line of text fed to it as one recognized
//! utterance. `ConsoleSynthesizer` "speaks" by waiting a time proportional to
//! the text length.

use super::input::{RecognitionConfig, RecognitionEngine, RecognitionEvent};
use super::output::{SynthesisEngine, SynthesisEvent, Utterance, Voice};
use super::EventSink;
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Default)]
struct LineState {
    sink: Option<EventSink<RecognitionEvent>>,
    listening: bool,
}

/// Recognizer fed with lines of text by the host
#[derive(Clone, Default)]
pub struct LineRecognizer {
    state: Arc<Mutex<LineState>>,
}

impl LineRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_listening(&self) -> bool {
        self.state.lock().listening
    }

    /// Deliver `line` as the result of the running session.
    ///
    /// Returns `false` (delivering nothing) when no session is running.
    pub fn hear(&self, line: &str) -> bool {
        let sink = {
            let mut state = self.state.lock();
            if !state.listening {
                return false;
            }
            state.listening = false;
            state.sink.clone()
        };

        if let Some(sink) = sink {
            sink.emit(RecognitionEvent::Result {
                transcript: line.to_string(),
                is_final: true,
            });
            sink.emit(RecognitionEvent::Ended);
        }
        true
    }

    fn end_session(&self) {
        let sink = {
            let mut state = self.state.lock();
            if !state.listening {
                return;
            }
            state.listening = false;
            state.sink.clone()
        };

        if let Some(sink) = sink {
            sink.emit(RecognitionEvent::Ended);
        }
    }
}

impl RecognitionEngine for LineRecognizer {
    fn is_supported(&self) -> bool {
        true
    }

    fn attach(&mut self, sink: EventSink<RecognitionEvent>) {
        self.state.lock().sink = Some(sink);
    }

    fn configure(&mut self, config: &RecognitionConfig) {
        debug!("Line recognizer configured for {}", config.lang);
    }

    fn start(&mut self) -> Result<()> {
        let sink = {
            let mut state = self.state.lock();
            state.listening = true;
            state.sink.clone()
        };

        if let Some(sink) = sink {
            sink.emit(RecognitionEvent::Started);
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.end_session();
    }

    fn abort(&mut self) {
        self.end_session();
    }
}

/// Synthesizer that pretends to speak for `per_char` per character
pub struct ConsoleSynthesizer {
    sink: Option<EventSink<SynthesisEvent>>,
    per_char: Duration,
}

impl ConsoleSynthesizer {
    pub fn new(per_char: Duration) -> Self {
        Self {
            sink: None,
            per_char,
        }
    }
}

impl SynthesisEngine for ConsoleSynthesizer {
    fn is_supported(&self) -> bool {
        true
    }

    fn attach(&mut self, sink: EventSink<SynthesisEvent>) {
        self.sink = Some(sink);
    }

    fn voices(&self) -> Vec<Voice> {
        vec![Voice::new("Console", "en-US")]
    }

    fn speak(&mut self, utterance: Utterance) -> Result<()> {
        let Some(sink) = self.sink.clone() else {
            return Ok(());
        };

        let id = utterance.id;
        let duration = self.per_char * utterance.text.chars().count() as u32;
        sink.emit(SynthesisEvent::Started { id });

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(duration).await;
                    sink.emit(SynthesisEvent::Ended { id });
                });
            }
            Err(_) => sink.emit(SynthesisEvent::Ended { id }),
        }
        Ok(())
    }

    // Cancelled utterances still report their end; their ids are stale by then
    fn cancel(&mut self) {}

    fn pause(&mut self) {}

    fn resume(&mut self) {}
}
