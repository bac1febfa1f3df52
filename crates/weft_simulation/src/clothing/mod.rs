//! # Clothing
//!
//! Per-skeleton bone remapping and the per-piece readiness and teleport
//! state machine.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     ClothingAggregate                         │
//! │   skeleton names ─┐   sync_transforms(bones, local_to_world)  │
//! │                   ▼                                           │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐         │
//! │  │ ClothingPiece│  │ ClothingPiece│  │ ClothingPiece│  ...    │
//! │  │ bone mapping │  │ teleport sel │  │ LOD decay    │         │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘         │
//! └─────────┼─────────────────┼─────────────────┼─────────────────┘
//!           ▼                 ▼                 ▼
//!     SimulationBackend::update_clothing_state(mode for this step)
//! ```

mod aggregate;
mod bones;
mod lod;
mod piece;
mod teleport;

pub use aggregate::{ClothingAggregate, ClothingId};
pub use bones::{build_bone_mapping, normalize_bone_name};
pub use lod::{lod_benefit, LodDecay, MaxDistanceRamp};
pub use piece::{ClothingPiece, PieceHandle, PieceState};
pub use teleport::{rotation_cosine, select_teleport_mode, TeleportRequest, TeleportThresholds};
