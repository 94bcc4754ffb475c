//! Stream parameters sent alongside the sample stream
//!
//! The renderer treats these as opaque: it only needs to know whether a
//! parameter set is active. The known keys mirror the control surface that
//! configures the upstream simulation; anything else is carried in `extra`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamParams {
    #[serde(default = "default_physics_sample_rate")]
    pub physics_sample_rate: u32,
    #[serde(default = "default_physics_block_size")]
    pub physics_block_size: u32,
    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,
    #[serde(default = "default_audio_block_size")]
    pub audio_block_size: u32,
    #[serde(default = "default_viz_sample_rate")]
    pub viz_sample_rate: u32,
    #[serde(default = "default_viz_block_size")]
    pub viz_block_size: u32,
    #[serde(default = "default_mass")]
    pub mass: f64,
    #[serde(default = "default_stiffness")]
    pub stiffness: f64,
    #[serde(default = "default_damping")]
    pub damping: f64,
    #[serde(default = "default_area")]
    pub area: f64,
    /// Keys this crate does not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_physics_sample_rate() -> u32 {
    1_000_000
}

fn default_physics_block_size() -> u32 {
    512
}

fn default_audio_sample_rate() -> u32 {
    48_000
}

fn default_audio_block_size() -> u32 {
    1024
}

fn default_viz_sample_rate() -> u32 {
    25
}

fn default_viz_block_size() -> u32 {
    1
}

fn default_mass() -> f64 {
    0.15
}

fn default_stiffness() -> f64 {
    2000.0
}

fn default_damping() -> f64 {
    0.1
}

fn default_area() -> f64 {
    1.0
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            physics_sample_rate: default_physics_sample_rate(),
            physics_block_size: default_physics_block_size(),
            audio_sample_rate: default_audio_sample_rate(),
            audio_block_size: default_audio_block_size(),
            viz_sample_rate: default_viz_sample_rate(),
            viz_block_size: default_viz_block_size(),
            mass: default_mass(),
            stiffness: default_stiffness(),
            damping: default_damping(),
            area: default_area(),
            extra: BTreeMap::new(),
        }
    }
}

impl StreamParams {
    /// Reject parameter sets the player cannot schedule against
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.audio_sample_rate == 0 {
            return Err(IngestError::InvalidParams(
                "audioSampleRate must be positive".into(),
            ));
        }
        if self.audio_block_size == 0 {
            return Err(IngestError::InvalidParams(
                "audioBlockSize must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Wall-clock length of one audio block
    pub fn block_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(
            f64::from(self.audio_block_size) / f64::from(self.audio_sample_rate.max(1)),
        )
    }
}
