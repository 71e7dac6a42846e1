//! Voice settings and the settings collaborator
//!
//! The orchestrator only reads settings, once per `speak` call. Editing and
//! persisting them belongs to the host.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;

pub const DEFAULT_RATE: f32 = 1.0;
pub const DEFAULT_PITCH: f32 = 1.1;
pub const DEFAULT_VOLUME: f32 = 1.0;

pub const RATE_RANGE: RangeInclusive<f32> = 0.5..=2.0;
pub const PITCH_RANGE: RangeInclusive<f32> = 0.5..=2.0;
pub const VOLUME_RANGE: RangeInclusive<f32> = 0.0..=1.0;

/// Synthesis voice configuration. Unset values fall back to the defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,
    pub preferred_voice_name: Option<String>,
}

fn clamp_to(value: f32, range: &RangeInclusive<f32>) -> f32 {
    value.clamp(*range.start(), *range.end())
}

impl VoiceSettings {
    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = Some(pitch);
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_preferred_voice(mut self, name: impl Into<String>) -> Self {
        self.preferred_voice_name = Some(name.into());
        self
    }

    pub fn effective_rate(&self) -> f32 {
        self.rate.unwrap_or(DEFAULT_RATE)
    }

    pub fn effective_pitch(&self) -> f32 {
        self.pitch.unwrap_or(DEFAULT_PITCH)
    }

    pub fn effective_volume(&self) -> f32 {
        self.volume.unwrap_or(DEFAULT_VOLUME)
    }

    /// Preferred voice name, treating an empty name as unset
    pub fn preferred_voice(&self) -> Option<&str> {
        self.preferred_voice_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }

    /// Copy with every set value forced into its valid range
    pub fn clamped(&self) -> Self {
        Self {
            rate: self.rate.map(|v| clamp_to(v, &RATE_RANGE)),
            pitch: self.pitch.map(|v| clamp_to(v, &PITCH_RANGE)),
            volume: self.volume.map(|v| clamp_to(v, &VOLUME_RANGE)),
            preferred_voice_name: self.preferred_voice_name.clone(),
        }
    }

    /// Overlay the values set in `patch`
    pub fn merged(&self, patch: &VoiceSettings) -> Self {
        Self {
            rate: patch.rate.or(self.rate),
            pitch: patch.pitch.or(self.pitch),
            volume: patch.volume.or(self.volume),
            preferred_voice_name: patch
                .preferred_voice_name
                .clone()
                .or_else(|| self.preferred_voice_name.clone()),
        }
    }
}

/// Read access to the current voice settings
pub trait SettingsSource: Send + Sync {
    fn voice_settings(&self) -> VoiceSettings;
}

impl SettingsSource for VoiceSettings {
    fn voice_settings(&self) -> VoiceSettings {
        self.clone()
    }
}

/// In-process settings store shared between the host and the orchestrator
#[derive(Clone, Debug, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<VoiceSettings>>,
}

impl SharedSettings {
    pub fn new(settings: VoiceSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings.clamped())),
        }
    }

    /// Merge a partial update, clamping to valid ranges
    pub fn update(&self, patch: &VoiceSettings) -> VoiceSettings {
        let mut settings = self.inner.write();
        *settings = settings.merged(patch).clamped();
        settings.clone()
    }

    pub fn replace(&self, settings: VoiceSettings) {
        *self.inner.write() = settings.clamped();
    }
}

impl SettingsSource for SharedSettings {
    fn voice_settings(&self) -> VoiceSettings {
        self.inner.read().clone()
    }
}
