//! # Runtime Constants
//!
//! Values shared by the queue and the clothing state machine.

// =============================================================================
// CLOTHING
// =============================================================================

/// An aggregate counts as visible if it was rendered within this many
/// simulation ticks.
pub const VISIBLE_FRAME_COUNT: u32 = 4;

/// Floor for the LOD distance-weight benefit of a non-visible piece.
pub const MIN_BENEFIT: f32 = 0.001;

/// Tolerance used when checking an actor transform for non-uniform scale.
pub const SCALE_EPSILON: f32 = 0.0001;

// =============================================================================
// RESOURCE QUEUE
// =============================================================================

/// Ticks a completed write may sit unused in the reuse pool before it is freed.
pub const DEFAULT_REUSE_IDLE_FRAMES: u32 = 2;
