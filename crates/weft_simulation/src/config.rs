//! Scene and clothing configuration.
//!
//! All fields have defaults; a TOML file only needs the keys it changes.
//!
//! ```toml
//! [queue]
//! reuse_idle_frames = 3
//!
//! [clothing]
//! continuous_rotation_threshold_deg = 15.0
//! reset_after_teleport = false
//! lod_decay_time = 2.0
//! ```

use serde::Deserialize;
use weft_rendering::QueueConfig;
use weft_shared::TeleportMode;

use crate::error::{SimulationError, SimulationResult};

/// Clothing tuning, shared by every piece of an aggregate.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClothingConfig {
    /// Root-bone rotation per sync, in degrees, above which the step teleports.
    /// The check is off when `<= 0`.
    pub continuous_rotation_threshold_deg: f32,
    /// Root-bone travel per sync above which the step teleports.
    /// The check is off when `<= 0`.
    pub continuous_distance_threshold: f32,
    /// Threshold trips use `TeleportAndReset` instead of `Teleport`.
    pub reset_after_teleport: bool,
    /// Seconds over which a non-visible piece's LOD benefit decays.
    /// Disabled when `<= 0`.
    pub lod_decay_time: f32,
    /// Freeze pieces that have not been rendered recently.
    pub auto_freeze_when_not_rendered: bool,
    /// Steps longer than this skip clothing updates.
    pub max_simulation_dt: Option<f32>,
}

impl Default for ClothingConfig {
    fn default() -> Self {
        Self {
            continuous_rotation_threshold_deg: 10.0,
            continuous_distance_threshold: 1.0,
            reset_after_teleport: true,
            lod_decay_time: -1.0,
            auto_freeze_when_not_rendered: true,
            max_simulation_dt: None,
        }
    }
}

impl ClothingConfig {
    /// Mode used when a rotation or distance threshold trips.
    #[must_use]
    pub const fn threshold_mode(&self) -> TeleportMode {
        if self.reset_after_teleport {
            TeleportMode::TeleportAndReset
        } else {
            TeleportMode::Teleport
        }
    }

    /// Checks ranges.
    ///
    /// # Errors
    ///
    /// `SimulationError::Config` naming the first bad field.
    pub fn validate(&self) -> SimulationResult<()> {
        if !(0.0..=180.0).contains(&self.continuous_rotation_threshold_deg) {
            return Err(SimulationError::Config(format!(
                "continuous_rotation_threshold_deg out of range: {}",
                self.continuous_rotation_threshold_deg
            )));
        }
        if self.continuous_distance_threshold < 0.0 {
            return Err(SimulationError::Config(format!(
                "continuous_distance_threshold must be >= 0: {}",
                self.continuous_distance_threshold
            )));
        }
        if self.max_simulation_dt.is_some_and(|dt| dt <= 0.0) {
            return Err(SimulationError::Config("max_simulation_dt must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Everything a [`Scene`](crate::Scene) is built with.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Resource queue tuning.
    pub queue: QueueConfig,
    /// Clothing tuning.
    pub clothing: ClothingConfig,
}

impl SceneConfig {
    /// Parses a config from TOML text. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// `SimulationError::Config` on malformed input or out-of-range values.
    pub fn from_toml_str(text: &str) -> SimulationResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SimulationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// `SimulationError::Config` naming the first bad field.
    pub fn validate(&self) -> SimulationResult<()> {
        if self.queue.max_pool_entries == 0 {
            return Err(SimulationError::Config("queue.max_pool_entries must be > 0".to_string()));
        }
        self.clothing.validate()
    }
}
