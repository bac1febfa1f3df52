//! LOD-benefit decay and max-distance ramping.

use weft_shared::MIN_BENEFIT;

use crate::backend::MaxDistanceScaleMode;

/// Linear decay of a piece's LOD benefit while it is not visible.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodDecay {
    total: f32,
    elapsed: f32,
}

impl LodDecay {
    /// Decays to zero over `total` seconds. Disabled when `total <= 0`.
    #[must_use]
    pub const fn new(total: f32) -> Self {
        Self { total, elapsed: 0.0 }
    }

    /// Whether decay applies at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.total > 0.0
    }

    /// Seconds spent not visible.
    #[must_use]
    pub const fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Advances by `dt` and returns the benefit multiplier in `[0, 1]`.
    ///
    /// A visible tick resets the decay at once.
    pub fn tick(&mut self, dt: f32, visible: bool) -> f32 {
        if visible || !self.is_enabled() {
            self.elapsed = 0.0;
            return 1.0;
        }
        self.elapsed += dt.max(0.0);
        (1.0 - self.elapsed / self.total).clamp(0.0, 1.0)
    }
}

/// Benefit handed to the backend for one piece.
#[must_use]
pub fn lod_benefit(distance_weight: f32, multiplier: f32) -> f32 {
    (distance_weight * multiplier.clamp(0.0, 1.0)).max(MIN_BENEFIT)
}

/// Max-distance scale moving linearly toward a target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaxDistanceRamp {
    scale: f32,
    target: f32,
    velocity: f32,
    ramping: bool,
    mode: MaxDistanceScaleMode,
}

impl Default for MaxDistanceRamp {
    fn default() -> Self {
        Self {
            scale: 1.0,
            target: 1.0,
            velocity: 0.0,
            ramping: false,
            mode: MaxDistanceScaleMode::default(),
        }
    }
}

impl MaxDistanceRamp {
    /// Starts a ramp from `start` to `end` over `duration` seconds and
    /// returns the scale to apply now. A non-positive duration snaps to `end`.
    pub fn start(&mut self, start: f32, end: f32, mode: MaxDistanceScaleMode, duration: f32) -> f32 {
        self.mode = mode;
        self.target = end;
        if duration > 0.0 {
            self.scale = start;
            self.velocity = (end - start) / duration;
            self.ramping = true;
        } else {
            self.scale = end;
            self.velocity = 0.0;
            self.ramping = false;
        }
        self.scale
    }

    /// Advances the ramp. Returns the new scale while ramping.
    pub fn tick(&mut self, dt: f32) -> Option<f32> {
        if !self.ramping {
            return None;
        }
        self.scale += self.velocity * dt;
        let arrived = if self.velocity >= 0.0 {
            self.scale >= self.target
        } else {
            self.scale <= self.target
        };
        if arrived {
            self.scale = self.target;
            self.ramping = false;
        }
        Some(self.scale)
    }

    /// Current scale.
    #[must_use]
    pub const fn scale(&self) -> f32 {
        self.scale
    }

    /// Mode the scale is applied with.
    #[must_use]
    pub const fn mode(&self) -> MaxDistanceScaleMode {
        self.mode
    }

    /// Whether a ramp is in progress.
    #[must_use]
    pub const fn is_ramping(&self) -> bool {
        self.ramping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_is_linear_and_resets() {
        let mut decay = LodDecay::new(1.0);
        assert!((decay.tick(0.25, false) - 0.75).abs() < 1e-6);
        assert!((decay.tick(0.25, false) - 0.5).abs() < 1e-6);
        assert!((decay.tick(1.0, false)).abs() < f32::EPSILON);
        assert!((decay.tick(0.1, true) - 1.0).abs() < f32::EPSILON);
        assert!(decay.elapsed().abs() < f32::EPSILON);
    }

    #[test]
    fn test_disabled_decay_keeps_full_benefit() {
        let mut decay = LodDecay::new(-1.0);
        assert!(!decay.is_enabled());
        for _ in 0..10 {
            assert!((decay.tick(1.0, false) - 1.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_benefit_floor() {
        assert!((lod_benefit(2.0, 0.5) - 1.0).abs() < f32::EPSILON);
        assert!((lod_benefit(2.0, 0.0) - MIN_BENEFIT).abs() < f32::EPSILON);
        assert!((lod_benefit(2.0, 7.0) - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_ramp_clamps_at_target() {
        let mut ramp = MaxDistanceRamp::default();
        assert!((ramp.start(1.0, 0.0, MaxDistanceScaleMode::Absolute, 1.0) - 1.0).abs() < f32::EPSILON);
        assert!((ramp.tick(0.5).unwrap() - 0.5).abs() < 1e-6);
        assert!(ramp.tick(0.75).unwrap().abs() < f32::EPSILON);
        assert_eq!(ramp.tick(0.1), None);
        assert_eq!(ramp.mode(), MaxDistanceScaleMode::Absolute);
    }

    #[test]
    fn test_zero_duration_snaps() {
        let mut ramp = MaxDistanceRamp::default();
        assert!((ramp.start(0.2, 0.8, MaxDistanceScaleMode::Multiply, 0.0) - 0.8).abs() < f32::EPSILON);
        assert!(!ramp.is_ramping());
        assert_eq!(ramp.tick(1.0), None);
    }
}
