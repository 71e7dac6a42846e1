//! Remote conversation service
//!
//! This module provides:
//! - The `ConversationClient` interface: sessions, message storage, LLM calls
//! - The connectivity signal checked before each remote call
//! - An in-process client for loopback runs and tests

pub mod memory;

use crate::llm::context::ConversationMessage;
use crate::messages::Message;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use memory::InMemoryClient;

/// A persisted, resumable conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent_name: String,
    pub messages: Vec<ConversationMessage>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_name: agent_name.into(),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<ConversationMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Stored history as final transcript messages
    pub fn transcript_messages(&self) -> Vec<Message> {
        self.messages.iter().map(|m| m.to_message()).collect()
    }
}

/// Request body for a single LLM call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub prompt: String,
    pub use_internet_context: bool,
}

#[async_trait]
pub trait ConversationClient: Send + Sync {
    /// Resume the agent's most recent session, creating one if there is none
    async fn get_or_create_session(&self, agent_name: &str) -> Result<Session>;

    /// Always create a fresh session
    async fn create_session(&self, agent_name: &str) -> Result<Session>;

    async fn append_message(&self, session_id: &str, message: ConversationMessage) -> Result<()>;

    /// Run the prompt through the LLM and return its reply
    async fn invoke_llm(&self, request: &LlmRequest) -> Result<String>;
}

/// Online/offline signal
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity flag toggled by the host
#[derive(Clone, Debug)]
pub struct ConnectivityFlag {
    online: Arc<AtomicBool>,
}

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
