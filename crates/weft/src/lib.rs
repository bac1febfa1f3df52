//! # WEFT
//!
//! The runtime facade, integrating all units.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            FrameDriver                              │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌─────────────────┐     ┌─────────────────┐     ┌──────────────┐   │
//! │  │ weft_simulation │────>│ weft_rendering  │────>│ render thread│   │
//! │  │  Scene, Actor   │     │  resource queue │     │  RenderDevice│   │
//! │  │  Clothing       │     │  handoff        │     │              │   │
//! │  └────────┬────────┘     └─────────────────┘     └──────────────┘   │
//! │           │                                                         │
//! │           ▼                                                         │
//! │  ┌─────────────────┐     ┌─────────────────┐                        │
//! │  │ weft_core       │     │ weft_shared     │                        │
//! │  │  assets, cleanup│     │  math, tags     │                        │
//! │  └─────────────────┘     └─────────────────┘                        │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `driver`: Frame orchestration against a spawned render thread

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod driver;

pub use weft_core as core;
pub use weft_rendering as rendering;
pub use weft_shared as shared;
pub use weft_simulation as simulation;

pub use driver::{DriverError, DriverResult, FrameDriver, FrameDriverConfig, FrameStats, FrameStatsAccumulator};

pub use weft_core::{AssetData, AssetDataProvider, AssetRef, AssetStore, BackendAssetHandle, CleanupQueue};
pub use weft_rendering::{RenderDevice, SoftwareDevice};
pub use weft_shared::{AssetKind, Mat44, TeleportMode, Vec3};
pub use weft_simulation::{
    ActorParams, ClothingAggregate, ClothingId, FetchStatus, Scene, SceneConfig, SimulationBackend,
};
