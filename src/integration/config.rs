//! Configuration for the integration layer
//!
//! Provides centralized configuration for all components. Every field has a
//! default, so a partial TOML file only overrides what it names.

use crate::llm::prompts::{DEFAULT_AGENT_NAME, DEFAULT_CONTEXT_WINDOW, GREETING};
use crate::resilience::retry::RetryPolicy;
use crate::speech::input::RecognitionConfig;
use crate::speech::settings::VoiceSettings;
use crate::{Result, TessaError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Agent identity and greeting
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent whose sessions are listed and created
    pub name: String,

    /// Number of recent transcript messages sent as context
    pub context_window: usize,

    pub greeting: String,

    /// Delay between session resolution and the greeting
    pub greeting_delay_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT_NAME.to_string(),
            context_window: DEFAULT_CONTEXT_WINDOW,
            greeting: GREETING.to_string(),
            greeting_delay_ms: 1500,
        }
    }
}

/// Recognizer session settings plus the restart delay after errors
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListeningConfig {
    #[serde(flatten)]
    pub session: RecognitionConfig,

    pub restart_delay_ms: u64,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        Self {
            session: RecognitionConfig::default(),
            restart_delay_ms: 1000,
        }
    }
}

/// Retry and timeout for the LLM call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Bound on the whole retrying call
    pub llm_timeout_ms: u64,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub use_internet_context: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            llm_timeout_ms: 30_000,
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            use_internet_context: false,
        }
    }
}

impl ResilienceConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(self.max_retries)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration for the complete assistant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub agent: AgentConfig,

    pub recognition: ListeningConfig,

    pub resilience: ResilienceConfig,

    /// Initial voice settings for the settings store
    pub voice: VoiceSettings,

    /// Typing animation speed, per revealed character
    pub typing_speed_ms: u64,

    /// Capacity of the presentation event channel
    pub event_buffer_size: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            recognition: ListeningConfig::default(),
            resilience: ResilienceConfig::default(),
            voice: VoiceSettings::default(),
            typing_speed_ms: 50,
            event_buffer_size: 100,
        }
    }
}

impl AssistantConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/tessa/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tessa").join("config.toml"))
    }

    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent.name = name.into();
        self
    }

    pub fn with_greeting_delay(mut self, delay: Duration) -> Self {
        self.agent.greeting_delay_ms = millis(delay);
        self
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.recognition.restart_delay_ms = millis(delay);
        self
    }

    pub fn with_resilience(mut self, resilience: ResilienceConfig) -> Self {
        self.resilience = resilience;
        self
    }

    pub fn with_voice(mut self, voice: VoiceSettings) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_typing_speed(mut self, per_char: Duration) -> Self {
        self.typing_speed_ms = millis(per_char);
        self
    }

    pub fn greeting_delay(&self) -> Duration {
        Duration::from_millis(self.agent.greeting_delay_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.recognition.restart_delay_ms)
    }

    pub fn typing_speed(&self) -> Duration {
        Duration::from_millis(self.typing_speed_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.agent.name.trim().is_empty() {
            return Err(TessaError::Config("agent name is required".to_string()));
        }

        if self.agent.context_window == 0 {
            return Err(TessaError::Config(
                "context window must hold at least one message".to_string(),
            ));
        }

        if self.resilience.max_delay_ms < self.resilience.initial_delay_ms {
            return Err(TessaError::Config(format!(
                "max_delay_ms ({}) is below initial_delay_ms ({})",
                self.resilience.max_delay_ms, self.resilience.initial_delay_ms
            )));
        }

        if self.resilience.llm_timeout_ms == 0 {
            return Err(TessaError::Config("llm_timeout_ms must be positive".to_string()));
        }

        Ok(())
    }
}
