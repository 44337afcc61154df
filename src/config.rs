use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable prefix; nested keys are separated by `__`
pub const ENV_PREFIX: &str = "ROSA";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub recording: RecordingConfig,
    pub assistant: AssistantConfig,
    pub nats: NatsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Level polling interval
    pub poll_interval_ms: u64,
    /// Analyser window; rounded up to a power of two
    pub fft_size: usize,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // Whisper expects 16kHz
            channels: 1,        // Mono
            poll_interval_ms: 100,
            fft_size: 512,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AudioConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Normalized level above which the user counts as speaking
    pub threshold: f32,
    /// Silence needed before speech counts as ended
    pub hangover_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 15.0 / 128.0,
            hangover_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Hard cap on a single recording
    pub max_duration_secs: u64,
    /// Finished recordings smaller than this never reach transcription
    pub min_audio_bytes: usize,
    /// Language hint for the transcription service
    pub language: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 15,
            min_audio_bytes: 100,
            language: "is".to_string(),
        }
    }
}

impl RecordingConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub name: String,
    pub gender: Gender,
    /// Consecutive failures tolerated before falling back
    pub failure_threshold: u32,
    /// Start with automatic voice detection enabled
    pub auto_detect: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "Rósa".to_string(),
            gender: Gender::Female,
            failure_threshold: 3,
            auto_detect: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL; backends are offline when unset
    pub url: Option<String>,
    pub subject_prefix: String,
    pub request_timeout_ms: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: None,
            subject_prefix: "rosa".to_string(),
            request_timeout_ms: 20_000,
        }
    }
}

impl NatsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Config {
    /// Load from a config file (any format the `config` crate knows; the
    /// extension may be omitted) with `ROSA_*` environment overrides on top.
    /// A missing file falls back to defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    pub fn from_toml(source: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
