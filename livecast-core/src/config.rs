use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub publisher: PublisherConfig,
    pub logging: LoggingConfig,
}

/// Publisher defaults and bitrate adaptation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Video bitrate applied on stream start (bps)
    pub initial_bitrate: u32,
    /// Lowest bitrate automatic adaptation may reach (bps)
    pub min_bitrate: u32,
    /// Percentage of the current bitrate kept on each back-off step
    pub decay_percent: u32,
    /// Minimum time between two automatic adaptations
    pub adaptation_cooldown_secs: u64,
    /// Output width used when the host does not send one
    pub default_width: u32,
    /// Output height used when the host does not send one
    pub default_height: u32,
    pub fps: u32,
    /// AAC bitrate (bps)
    pub audio_bitrate: u32,
    pub max_key_frame_interval_secs: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            initial_bitrate: 1_200_000,
            min_bitrate: 100_000,
            decay_percent: 70,
            adaptation_cooldown_secs: 5,
            // Portrait figures kept as the host expects them
            default_width: 480,
            default_height: 640,
            fps: 30,
            audio_bitrate: 32_000,
            max_key_frame_interval_secs: 2,
        }
    }
}

impl PublisherConfig {
    #[must_use]
    pub const fn adaptation_cooldown(&self) -> Duration {
        Duration::from_secs(self.adaptation_cooldown_secs)
    }

    /// Reject settings the adaptation policy cannot work with
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(1..=99).contains(&self.decay_percent) {
            return Err(ConfigValidationError::DecayOutOfRange(self.decay_percent));
        }
        if self.initial_bitrate == 0 {
            return Err(ConfigValidationError::ZeroBitrate);
        }
        if self.min_bitrate > self.initial_bitrate {
            return Err(ConfigValidationError::FloorAboveInitial {
                min_bitrate: self.min_bitrate,
                initial_bitrate: self.initial_bitrate,
            });
        }
        if self.default_width == 0 || self.default_height == 0 {
            return Err(ConfigValidationError::ZeroDimension);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
    /// Extra `target=level` filter directives, e.g. `livecast_publisher=debug`
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
            directives: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("decay_percent must be within 1..=99, got {0}")]
    DecayOutOfRange(u32),

    #[error("initial_bitrate must be greater than zero")]
    ZeroBitrate,

    #[error("min_bitrate ({min_bitrate}) exceeds initial_bitrate ({initial_bitrate})")]
    FloorAboveInitial { min_bitrate: u32, initial_bitrate: u32 },

    #[error("default_width and default_height must be greater than zero")]
    ZeroDimension,
}

impl Config {
    /// Load configuration from file and environment variables
    ///
    /// Priority (highest first):
    /// 1. Environment variables (`LIVECAST_PUBLISHER__INITIAL_BITRATE`, ...)
    /// 2. Config file
    /// 3. Defaults
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("LIVECAST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.publisher.validate()
    }
}
