//! # WEFT Shared
//!
//! Common types used by both the producer thread and the render thread.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on threading primitives or a render device.
//! If you need buffer types, put them in `weft_rendering`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;
pub mod tags;

pub use constants::{MIN_BENEFIT, VISIBLE_FRAME_COUNT, DEFAULT_REUSE_IDLE_FRAMES};
pub use math::{Mat33, Mat44, Vec3};
pub use tags::{AssetKind, TeleportMode};
