//! Queue configuration.

use serde::Deserialize;
use weft_shared::DEFAULT_REUSE_IDLE_FRAMES;

use crate::error::{RenderError, RenderResult};

/// Tuning for [`RenderResourceQueue`](super::RenderResourceQueue).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Ticks a pooled write may go unmatched before it is freed.
    pub reuse_idle_frames: u32,
    /// Upper bound on pooled writes; completed writes beyond it are freed.
    pub max_pool_entries: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            reuse_idle_frames: DEFAULT_REUSE_IDLE_FRAMES,
            max_pool_entries: 4096,
        }
    }
}

impl QueueConfig {
    /// Parses a config from TOML text. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// `RenderError::Config` on malformed input or a zero pool size.
    pub fn from_toml_str(text: &str) -> RenderResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| RenderError::Config(e.to_string()))?;
        if config.max_pool_entries == 0 {
            return Err(RenderError::Config("max_pool_entries must be > 0".to_string()));
        }
        Ok(config)
    }
}
