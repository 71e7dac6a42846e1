//! Error types for the Tessa assistant
//!
//! Every failure the turn loop can see is a `TessaError`. The orchestrator never
//! lets one escape to the presentation layer: it classifies it and turns it into
//! a friendly sentence instead.

use crate::resilience::classify::{classify, ErrorCategory, ErrorSignature};
use thiserror::Error;

/// Tessa errors
#[derive(Error, Debug, Clone)]
pub enum TessaError {
    /// Transport-level failure reaching the conversation service
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status returned by the conversation service
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// An operation did not complete within its time limit
    #[error("{0}")]
    Timeout(String),

    /// Authentication or authorization failure
    #[error("Auth error: {0}")]
    Auth(String),

    /// Speech recognition or synthesis failure
    #[error("Speech error: {0}")]
    Speech(String),

    /// LLM / agent service failure
    #[error("LLM error: {0}")]
    Api(String),

    /// Conversation session could not be resolved
    #[error("Conversation session error: {0}")]
    Session(String),

    /// Internal channel communication error
    #[error("Channel error: {0}")]
    Channel(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O error
    #[error("IO error: {0}")]
    IOError(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for TessaError {
    fn from(e: std::io::Error) -> Self {
        TessaError::IOError(e.to_string())
    }
}

impl From<toml::de::Error> for TessaError {
    fn from(e: toml::de::Error) -> Self {
        TessaError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for TessaError {
    fn from(e: serde_json::Error) -> Self {
        TessaError::Other(format!("serialization failed: {}", e))
    }
}

impl TessaError {
    /// Project this error onto the `{message, name, status}` shape the
    /// classifier works on.
    pub fn signature(&self) -> ErrorSignature {
        let name = match self {
            TessaError::Network(_) => "networkerror",
            TessaError::Http { .. } => "httperror",
            TessaError::Timeout(_) => "timeouterror",
            TessaError::Auth(_) => "autherror",
            TessaError::Speech(_) => "speecherror",
            TessaError::Api(_) => "apierror",
            TessaError::Session(_) => "sessionerror",
            TessaError::Channel(_) => "channelerror",
            TessaError::Config(_) => "configerror",
            TessaError::IOError(_) => "ioerror",
            TessaError::Other(_) => "error",
        };

        let status = match self {
            TessaError::Http { status, .. } => Some(*status),
            _ => None,
        };

        ErrorSignature {
            message: self.to_string(),
            name: Some(name.to_string()),
            status,
        }
    }

    /// Category this error falls into
    pub fn category(&self) -> ErrorCategory {
        classify(&self.signature())
    }

    /// Check if this error is worth retrying
    pub fn is_recoverable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Get a user-friendly description
    ///
    /// Returns the sentence that is shown in the transcript and spoken aloud.
    pub fn user_message(&self) -> &'static str {
        self.category().friendly_message()
    }
}

/// Result type alias for Tessa operations
pub type Result<T> = std::result::Result<T, TessaError>;
