//! Type tags shared by the asset store, the scene and the backend seam.

use serde::{Deserialize, Serialize};

/// Kind of simulation data an asset carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Fracture mesh.
    Destructible,
    /// Simulated cloth.
    Clothing,
    /// Static render mesh used by other assets.
    RenderMesh,
    /// Particle-driven mesh emitter.
    ParticleEmitter,
    /// Anything else the provider hands back.
    Generic,
}

impl AssetKind {
    /// Short lowercase name used in log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Destructible => "destructible",
            Self::Clothing => "clothing",
            Self::RenderMesh => "render_mesh",
            Self::ParticleEmitter => "particle_emitter",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integration-mode hint forwarded to the backend for one clothing step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeleportMode {
    /// Skeleton moved smoothly; integrate normally.
    #[default]
    Continuous,
    /// Skeleton snapped; move the cloth with it.
    Teleport,
    /// Skeleton snapped; move the cloth and discard its simulation state.
    TeleportAndReset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_kind_display() {
        assert_eq!(AssetKind::Clothing.to_string(), "clothing");
        assert_eq!(AssetKind::ParticleEmitter.as_str(), "particle_emitter");
    }

    #[test]
    fn test_teleport_default_is_continuous() {
        assert_eq!(TeleportMode::default(), TeleportMode::Continuous);
    }
}
