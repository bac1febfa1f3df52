//! # Teleport Mode Selection
//!
//! Decides, per sync, how the backend integrates a clothing step.
//!
//! ## Priority
//!
//! ```text
//! forced TeleportAndReset
//!   > forced Teleport
//!   > returning from frozen        (TeleportAndReset)
//!   > rotation or distance tripped (configured trip mode)
//!   > Continuous
//! ```
//!
//! Rotation and distance are two independent checks OR-ed together. The
//! distance check trips only when strictly greater than the threshold.

use weft_shared::{Mat44, TeleportMode};

use crate::config::ClothingConfig;

/// Precomputed comparison thresholds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TeleportThresholds {
    /// Cosine of the rotation threshold; `None` disables the check.
    pub cos_rotation: Option<f32>,
    /// Squared distance threshold; `None` disables the check.
    pub distance_sq: Option<f32>,
    /// Mode used when either check trips.
    pub mode_on_trip: TeleportMode,
}

impl TeleportThresholds {
    /// Derives thresholds from config. A threshold `<= 0` disables its check.
    #[must_use]
    pub fn from_config(config: &ClothingConfig) -> Self {
        let rotation = config.continuous_rotation_threshold_deg;
        let distance = config.continuous_distance_threshold;
        Self {
            cos_rotation: (rotation > 0.0).then(|| rotation.to_radians().cos()),
            distance_sq: (distance > 0.0).then(|| distance * distance),
            mode_on_trip: config.threshold_mode(),
        }
    }
}

impl Default for TeleportThresholds {
    fn default() -> Self {
        Self::from_config(&ClothingConfig::default())
    }
}

/// Explicit requests pending for the next sync.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TeleportRequest {
    /// Host asked for teleport-and-reset.
    pub force_reset: bool,
    /// Host asked for teleport.
    pub force_teleport: bool,
    /// Piece was frozen and is simulating again.
    pub returning_from_frozen: bool,
}

impl TeleportRequest {
    /// Mode dictated by the request alone, if any.
    #[must_use]
    pub const fn forced_mode(&self) -> Option<TeleportMode> {
        if self.force_reset {
            Some(TeleportMode::TeleportAndReset)
        } else if self.force_teleport {
            Some(TeleportMode::Teleport)
        } else if self.returning_from_frozen {
            Some(TeleportMode::TeleportAndReset)
        } else {
            None
        }
    }
}

/// Cosine of the rotation between two root poses.
///
/// Computed from the trace of the relative rotation `cur * prev⁻¹`. A
/// singular previous basis counts as a half turn.
#[must_use]
pub fn rotation_cosine(prev: &Mat44, cur: &Mat44) -> f32 {
    match prev.basis_matrix().inverse() {
        Some(inverse) => ((cur.basis_matrix() * inverse).trace() - 1.0) * 0.5,
        None => -1.0,
    }
}

/// Selects the integration mode for one sync.
///
/// `prev` is the root pose of the previous sync; without one only the
/// request can trip.
#[must_use]
pub fn select_teleport_mode(
    request: TeleportRequest,
    prev: Option<&Mat44>,
    cur: &Mat44,
    thresholds: &TeleportThresholds,
) -> TeleportMode {
    if let Some(mode) = request.forced_mode() {
        return mode;
    }
    let Some(prev) = prev else {
        return TeleportMode::Continuous;
    };

    let rotated = thresholds.cos_rotation.is_some_and(|cos| rotation_cosine(prev, cur) < cos);
    let moved = thresholds
        .distance_sq
        .is_some_and(|limit| prev.position().distance_squared(cur.position()) > limit);

    if rotated || moved {
        thresholds.mode_on_trip
    } else {
        TeleportMode::Continuous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_shared::Vec3;

    fn thresholds(reset: bool) -> TeleportThresholds {
        TeleportThresholds::from_config(&ClothingConfig {
            continuous_rotation_threshold_deg: 10.0,
            continuous_distance_threshold: 1.0,
            reset_after_teleport: reset,
            ..ClothingConfig::default()
        })
    }

    #[test]
    fn test_distance_exactly_at_threshold_is_continuous() {
        let prev = Mat44::IDENTITY;
        let cur = Mat44::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let mode = select_teleport_mode(TeleportRequest::default(), Some(&prev), &cur, &thresholds(false));
        assert_eq!(mode, TeleportMode::Continuous);
    }

    #[test]
    fn test_distance_over_threshold_trips() {
        let prev = Mat44::IDENTITY;
        let cur = Mat44::from_translation(Vec3::new(0.0, 1.01, 0.0));
        assert_eq!(
            select_teleport_mode(TeleportRequest::default(), Some(&prev), &cur, &thresholds(false)),
            TeleportMode::Teleport
        );
        assert_eq!(
            select_teleport_mode(TeleportRequest::default(), Some(&prev), &cur, &thresholds(true)),
            TeleportMode::TeleportAndReset
        );
    }

    #[test]
    fn test_rotation_trips_independently() {
        let prev = Mat44::IDENTITY;
        let small = Mat44::from_axis_angle(Vec3::Z, 5f32.to_radians());
        let large = Mat44::from_axis_angle(Vec3::Z, 20f32.to_radians());
        let t = thresholds(false);
        assert_eq!(
            select_teleport_mode(TeleportRequest::default(), Some(&prev), &small, &t),
            TeleportMode::Continuous
        );
        assert_eq!(
            select_teleport_mode(TeleportRequest::default(), Some(&prev), &large, &t),
            TeleportMode::Teleport
        );
    }

    #[test]
    fn test_rotation_cosine() {
        let a = Mat44::from_axis_angle(Vec3::Y, 0.3);
        let b = Mat44::from_axis_angle(Vec3::Y, 0.8);
        assert!((rotation_cosine(&a, &b) - 0.5f32.cos()).abs() < 1e-5);
        assert!((rotation_cosine(&a, &a) - 1.0).abs() < 1e-5);
        let flat = Mat44::from_scale(1.0, 0.0, 1.0);
        assert!((rotation_cosine(&flat, &a) + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_request_priority() {
        let pose = Mat44::IDENTITY;
        let t = thresholds(false);
        let all = TeleportRequest {
            force_reset: true,
            force_teleport: true,
            returning_from_frozen: true,
        };
        assert_eq!(select_teleport_mode(all, Some(&pose), &pose, &t), TeleportMode::TeleportAndReset);
        let teleport = TeleportRequest {
            force_teleport: true,
            ..TeleportRequest::default()
        };
        assert_eq!(select_teleport_mode(teleport, None, &pose, &t), TeleportMode::Teleport);
        let thawed = TeleportRequest {
            returning_from_frozen: true,
            ..TeleportRequest::default()
        };
        assert_eq!(select_teleport_mode(thawed, None, &pose, &t), TeleportMode::TeleportAndReset);
    }

    #[test]
    fn test_disabled_checks_never_trip() {
        let t = TeleportThresholds::from_config(&ClothingConfig {
            continuous_rotation_threshold_deg: 0.0,
            continuous_distance_threshold: 0.0,
            ..ClothingConfig::default()
        });
        let far = Mat44::from_axis_angle(Vec3::X, 3.0).with_position(Vec3::new(100.0, 0.0, 0.0));
        assert_eq!(
            select_teleport_mode(TeleportRequest::default(), Some(&Mat44::IDENTITY), &far, &t),
            TeleportMode::Continuous
        );
    }
}
