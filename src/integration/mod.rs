//! Integration layer
//!
//! This module provides:
//! - Assistant configuration
//! - Shared turn state for the presentation layer
//! - The conversation orchestrator and its handle

pub mod config;
pub mod orchestrator;
pub mod state;

// Re-export commonly used types
pub use config::{AgentConfig, AssistantConfig, ListeningConfig, ResilienceConfig};
pub use orchestrator::{
    AfterSpeech, AssistantCommand, AssistantEvent, Collaborators, Orchestrator, OrchestratorHandle,
    PlatformSink,
};
pub use state::{derive_status, AssistantState, SharedAssistantState, TurnStatus};
