//! Configuration management (config.toml in the platform config dir)

use std::path::{Path, PathBuf};
use std::time::Duration;

use bonk_playback::{
    DEFAULT_BLOCK_CAPACITY, DEFAULT_COMMAND_CAPACITY, DEFAULT_RENDER_QUANTUM, PipelineOptions,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output device name; the host default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Frames rendered per renderer invocation
    #[serde(default = "default_render_quantum")]
    pub render_quantum: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_block_capacity")]
    pub block_capacity: usize,
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// How far ahead of playback chunks are delivered
    #[serde(default = "default_lead_ms")]
    pub lead_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_render_quantum() -> usize {
    DEFAULT_RENDER_QUANTUM
}

fn default_block_capacity() -> usize {
    DEFAULT_BLOCK_CAPACITY
}

fn default_command_capacity() -> usize {
    DEFAULT_COMMAND_CAPACITY
}

fn default_lead_ms() -> u64 {
    250
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            render_quantum: default_render_quantum(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            block_capacity: default_block_capacity(),
            command_capacity: default_command_capacity(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            lead_ms: default_lead_ms(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl PlaybackConfig {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            block_capacity: self.block_capacity,
            command_capacity: self.command_capacity,
        }
    }
}

impl FeedConfig {
    pub fn lead(&self) -> Duration {
        Duration::from_millis(self.lead_ms)
    }
}

impl DiagnosticsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "bonk", "bonk-player")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default config file location
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Load the user config, falling back to defaults
pub fn load() -> PlayerConfig {
    let Some(path) = config_path() else {
        return PlayerConfig::default();
    };
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return PlayerConfig::default();
    }
    load_from(&path).unwrap_or_else(|e| {
        warn!("Failed to load {}: {}. Using defaults.", path.display(), e);
        PlayerConfig::default()
    })
}

pub fn load_from(path: &Path) -> Result<PlayerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

pub fn save(config: &PlayerConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}
