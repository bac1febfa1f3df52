//! # WEFT Simulation
//!
//! Scene, actor and clothing scheduling around an opaque physics backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── Scene ────────────────────────────┐
//! │                                                               │
//! │  simulate(dt) / fetch_results(blocking)   SceneClock          │
//! │                                                               │
//! │  ┌──────────┐  ┌──────────┐   ┌───────────────────────────┐   │
//! │  │  Actor   │  │  Actor   │   │    ClothingAggregate      │   │
//! │  │ (asset)  │  │ (asset)  │   │  piece ─ piece ─ piece    │   │
//! │  └────┬─────┘  └────┬─────┘   └────────────┬──────────────┘   │
//! └───────┼─────────────┼──────────────────────┼──────────────────┘
//!         ▼             ▼                      ▼
//!  RenderResourceQueue (buffers)     SimulationBackend (opaque)
//! ```
//!
//! ## Rules
//!
//! 1. **One step at a time** - `simulate` panics if the last step was not fetched
//! 2. **Actors never outlive a render task** - release defers to a cleanup ticket
//! 3. **Soft failures degrade** - unmatched bones and missing LODs log and continue

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod actor;
pub mod backend;
pub mod clock;
pub mod clothing;
pub mod config;
pub mod error;
pub mod scene;

#[cfg(test)]
mod testing;

pub use actor::{Actor, ActorHandle, ActorId, ActorState, ReleaseOutcome, RenderContext};
pub use backend::{
    ActorDesc, ActorRenderData, BackendActorHandle, ClothingUpdate, MaxDistanceScaleMode, ScriptedActor,
    ScriptedAsset, ScriptedBackend, SimulationBackend,
};
pub use clock::SceneClock;
pub use clothing::{
    ClothingAggregate, ClothingId, ClothingPiece, PieceHandle, PieceState, TeleportRequest, TeleportThresholds,
};
pub use config::{ClothingConfig, SceneConfig};
pub use error::{SimulationError, SimulationResult};
pub use scene::{ActorParams, FetchStatus, Scene};
