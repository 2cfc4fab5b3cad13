// Engine configuration - RON file under the user config directory

use crate::messaging::BridgeCapacities;
use crate::sequencer::timeline::{SamplePosition, Tempo, TimeSignature};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const CONFIG_DIR_NAME: &str = "daw_transport";
const CONFIG_FILE_NAME: &str = "engine.ron";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] ron::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Transport engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Used when no audio device dictates the rate
    pub sample_rate: f64,
    /// Largest block the audio callback processes in one go
    pub max_block_frames: usize,
    pub command_queue_capacity: usize,
    pub event_queue_capacity: usize,
    /// Publish a status snapshot every N blocks
    pub status_interval_blocks: u32,
    /// Seeks beyond this are clamped; unbounded when absent
    pub project_length_seconds: Option<f64>,
    pub default_bpm: f64,
    pub default_time_signature: TimeSignature,
    pub metronome_enabled: bool,
    pub metronome_volume: f32,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            max_block_frames: 2048,
            command_queue_capacity: 256,
            event_queue_capacity: 64,
            status_interval_blocks: 4,
            project_length_seconds: None,
            default_bpm: 120.0,
            default_time_signature: TimeSignature::four_four(),
            metronome_enabled: true,
            metronome_volume: 0.5,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// `<config dir>/daw_transport/engine.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: EngineConfig = ron::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_rate.is_finite() || !(8000.0..=768_000.0).contains(&self.sample_rate) {
            return Err(ConfigError::Invalid(format!(
                "sample_rate {} outside [8000, 768000]",
                self.sample_rate
            )));
        }
        if self.max_block_frames == 0 {
            return Err(ConfigError::Invalid("max_block_frames must be positive".to_string()));
        }
        if self.command_queue_capacity == 0 || self.event_queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue capacities must be positive".to_string()));
        }
        if self.status_interval_blocks == 0 {
            return Err(ConfigError::Invalid(
                "status_interval_blocks must be positive".to_string(),
            ));
        }
        if let Some(length) = self.project_length_seconds
            && (!length.is_finite() || length <= 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "project_length_seconds {} must be positive",
                length
            )));
        }
        Tempo::new(self.default_bpm).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if !self.default_time_signature.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "default time signature {} must have positive fields",
                self.default_time_signature
            )));
        }
        if !(0.0..=1.0).contains(&self.metronome_volume) {
            return Err(ConfigError::Invalid(format!(
                "metronome_volume {} outside [0, 1]",
                self.metronome_volume
            )));
        }
        if log::LevelFilter::from_str(&self.log_level).is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }
        Ok(())
    }

    pub fn bridge_capacities(&self) -> BridgeCapacities {
        BridgeCapacities {
            commands: self.command_queue_capacity,
            events: self.event_queue_capacity,
        }
    }

    /// Project end in samples at `sample_rate`, if bounded
    pub fn max_position(&self, sample_rate: f64) -> Option<SamplePosition> {
        self.project_length_seconds
            .map(|seconds| (seconds * sample_rate).round() as SamplePosition)
    }
}
