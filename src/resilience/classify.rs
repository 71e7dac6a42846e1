//! Error classification and recovery policy
//!
//! Maps raw failures onto a small set of categories that decide retry
//! eligibility and the sentence the user hears. Recognizer error codes get their
//! own policy table since they come from the platform, not from the service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of a raw error as seen by the classifier
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorSignature {
    /// Human-readable message
    pub message: String,
    /// Error type name (e.g. `NetworkError`)
    pub name: Option<String>,
    /// HTTP-like status code, when one exists
    pub status: Option<u16>,
}

impl ErrorSignature {
    /// Signature carrying only a message
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Set the error name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the status code
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Classified error category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Network,
    Auth,
    Speech,
    Api,
    Unknown,
}

impl ErrorCategory {
    /// Fixed user-facing sentence for this category
    pub fn friendly_message(&self) -> &'static str {
        match self {
            ErrorCategory::Network => {
                "I'm having trouble connecting. Please check your internet connection and try again."
            }
            ErrorCategory::Auth => {
                "There was an authentication issue. Please try logging in again."
            }
            ErrorCategory::Speech => {
                "I'm having trouble with the microphone or speaker. Please check your device permissions."
            }
            ErrorCategory::Api => {
                "I'm experiencing some technical difficulties. Please try again in a moment."
            }
            ErrorCategory::Unknown => "Something unexpected happened. Please try again.",
        }
    }

    /// Whether failures of this category are retried automatically
    ///
    /// `Unknown` is not retried by default; callers that know better pass their
    /// own predicate to `with_retry`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Api)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Speech => "speech",
            ErrorCategory::Api => "api",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const NETWORK_HINTS: &[&str] = &["network", "fetch", "timeout"];
const AUTH_HINTS: &[&str] = &["auth", "unauthorized", "forbidden"];
const SPEECH_HINTS: &[&str] = &["speech", "recognition", "synthesis", "microphone"];
const API_HINTS: &[&str] = &["llm", "agent", "conversation"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Classify a raw error. First matching rule wins.
pub fn classify(error: &ErrorSignature) -> ErrorCategory {
    let message = error.message.to_lowercase();
    let name = error
        .name
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();

    if contains_any(&message, NETWORK_HINTS) || name == "networkerror" {
        return ErrorCategory::Network;
    }

    if contains_any(&message, AUTH_HINTS) || matches!(error.status, Some(401) | Some(403)) {
        return ErrorCategory::Auth;
    }

    if contains_any(&message, SPEECH_HINTS) {
        return ErrorCategory::Speech;
    }

    if contains_any(&message, API_HINTS) || error.status.is_some_and(|s| s >= 500) {
        return ErrorCategory::Api;
    }

    ErrorCategory::Unknown
}

/// Friendly sentence for a raw error
pub fn friendly_message(error: &ErrorSignature) -> &'static str {
    classify(error).friendly_message()
}

/// Error codes reported by the platform speech recognizer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecognitionErrorCode {
    NoSpeech,
    AudioCapture,
    NotAllowed,
    Network,
    Aborted,
    ServiceNotAllowed,
    Other(String),
}

impl RecognitionErrorCode {
    /// Parse a recognizer error code such as `"no-speech"`
    pub fn parse(code: &str) -> Self {
        match code {
            "no-speech" => RecognitionErrorCode::NoSpeech,
            "audio-capture" => RecognitionErrorCode::AudioCapture,
            "not-allowed" => RecognitionErrorCode::NotAllowed,
            "network" => RecognitionErrorCode::Network,
            "aborted" => RecognitionErrorCode::Aborted,
            "service-not-allowed" => RecognitionErrorCode::ServiceNotAllowed,
            other => RecognitionErrorCode::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RecognitionErrorCode::NoSpeech => "no-speech",
            RecognitionErrorCode::AudioCapture => "audio-capture",
            RecognitionErrorCode::NotAllowed => "not-allowed",
            RecognitionErrorCode::Network => "network",
            RecognitionErrorCode::Aborted => "aborted",
            RecognitionErrorCode::ServiceNotAllowed => "service-not-allowed",
            RecognitionErrorCode::Other(code) => code,
        }
    }
}

impl fmt::Display for RecognitionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do after a recognition error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Transient, listen again
    Retry,
    /// The user has to grant microphone access
    Permission,
    /// Intentional stop, say nothing
    Ignore,
    /// Hard failure, needs user action in settings
    Error,
}

/// Recovery decision for a recognition error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecognitionErrorPolicy {
    pub action: RecoveryAction,
    /// Sentence to show and speak, if any
    pub message: Option<&'static str>,
    /// Whether listening should be restarted after a short delay
    pub should_restart: bool,
}

/// Decide how to recover from a recognizer error
pub fn handle_recognition_error(code: &RecognitionErrorCode) -> RecognitionErrorPolicy {
    match code {
        RecognitionErrorCode::NoSpeech => RecognitionErrorPolicy {
            action: RecoveryAction::Retry,
            message: Some("I didn't hear anything. Could you try speaking again?"),
            should_restart: true,
        },
        RecognitionErrorCode::AudioCapture => RecognitionErrorPolicy {
            action: RecoveryAction::Permission,
            message: Some("I can't access the microphone. Please check your permissions."),
            should_restart: false,
        },
        RecognitionErrorCode::NotAllowed => RecognitionErrorPolicy {
            action: RecoveryAction::Permission,
            message: Some(
                "Microphone permission was denied. Please enable it in your browser settings.",
            ),
            should_restart: false,
        },
        RecognitionErrorCode::Network => RecognitionErrorPolicy {
            action: RecoveryAction::Retry,
            message: Some("Network connection issue. Please check your internet and try again."),
            should_restart: true,
        },
        RecognitionErrorCode::Aborted => RecognitionErrorPolicy {
            action: RecoveryAction::Ignore,
            message: None,
            should_restart: false,
        },
        RecognitionErrorCode::ServiceNotAllowed => RecognitionErrorPolicy {
            action: RecoveryAction::Error,
            message: Some(
                "Speech recognition is not allowed. Please check your browser settings.",
            ),
            should_restart: false,
        },
        RecognitionErrorCode::Other(_) => RecognitionErrorPolicy {
            action: RecoveryAction::Retry,
            message: Some("Something went wrong with speech recognition. Let's try again."),
            should_restart: true,
        },
    }
}
