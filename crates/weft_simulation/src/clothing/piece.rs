//! # Clothing Piece
//!
//! One simulated submesh of a clothing aggregate.
//!
//! ## States
//!
//! ```text
//!   Unbound ──refresh──> AwaitingFirstSync ──sync #1──> WarmingUp
//!      ▲                                                   │ sync #2, LOD available
//!      │ actor lost                                        ▼
//!      └──────────────── Frozen <──── not visible ────── Ready
//!                          └────── visible again ──────────┘
//! ```
//!
//! A piece binds its backend actor lazily on the first sync that carries
//! bone transforms. The first update always resets the cloth; warming-up
//! steps honor only explicit teleport requests; ready steps measure the
//! root-bone motion against the thresholds.

use std::fmt;
use std::sync::Arc;

use weft_core::AssetRef;
use weft_shared::{AssetKind, Mat44, TeleportMode, Vec3};

use super::bones::build_bone_mapping;
use super::lod::{lod_benefit, LodDecay};
use super::teleport::{select_teleport_mode, TeleportRequest, TeleportThresholds};
use crate::actor::{Actor, ActorId};
use crate::backend::{ActorDesc, BackendActorHandle, ClothingUpdate, MaxDistanceScaleMode, SimulationBackend};
use crate::clock::SceneClock;
use crate::config::ClothingConfig;

/// Aggregate-unique piece identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PieceHandle(pub u32);

impl fmt::Display for PieceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "piece#{}", self.0)
    }
}

/// Where a piece is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PieceState {
    /// No backend actor and none requested.
    Unbound,
    /// Actor will be created on the next sync with bones.
    AwaitingFirstSync,
    /// Bound, not yet drivable.
    WarmingUp,
    /// Drivable and renderable.
    Ready,
    /// Simulation suspended.
    Frozen,
}

/// Aggregate state every piece sync reads.
pub(crate) struct SyncContext<'a> {
    pub clock: &'a SceneClock,
    pub config: &'a ClothingConfig,
    pub thresholds: &'a TeleportThresholds,
    pub skeleton: &'a [String],
    pub local_to_world: Mat44,
    pub scale: f32,
    pub recently_rendered: bool,
    pub simulation_enabled: bool,
    pub wind: Option<(f32, Vec3)>,
    pub max_distance: (f32, MaxDistanceScaleMode),
}

/// One simulated submesh.
pub struct ClothingPiece {
    handle: PieceHandle,
    asset: AssetRef,
    material_index: u32,
    backend: Arc<dyn SimulationBackend>,
    actor: Option<Arc<Actor>>,
    state: PieceState,
    bone_mapping: Vec<u32>,
    root_pose: Option<Mat44>,
    simulate_count: u32,
    bound_generation: u64,
    lod: u32,
    lod_count: u32,
    distance_weight: f32,
    benefit: f32,
    decay: LodDecay,
    visible: bool,
    request: TeleportRequest,
}

impl ClothingPiece {
    pub(crate) fn new(
        handle: PieceHandle,
        asset: AssetRef,
        material_index: u32,
        backend: Arc<dyn SimulationBackend>,
        config: &ClothingConfig,
    ) -> Self {
        let state = if asset.backend_handle().is_some() {
            PieceState::AwaitingFirstSync
        } else {
            PieceState::Unbound
        };
        Self {
            handle,
            asset,
            material_index,
            backend,
            actor: None,
            state,
            bone_mapping: Vec::new(),
            root_pose: None,
            simulate_count: 0,
            bound_generation: 0,
            lod: 0,
            lod_count: 0,
            distance_weight: 1.0,
            benefit: 1.0,
            decay: LodDecay::new(config.lod_decay_time),
            visible: true,
            request: TeleportRequest::default(),
        }
    }

    /// Identity within the aggregate.
    #[must_use]
    pub const fn handle(&self) -> PieceHandle {
        self.handle
    }

    /// Material slot the piece renders with.
    #[must_use]
    pub const fn material_index(&self) -> u32 {
        self.material_index
    }

    /// Asset the piece simulates.
    #[must_use]
    pub const fn asset(&self) -> &AssetRef {
        &self.asset
    }

    /// Bound actor, if any.
    #[must_use]
    pub const fn actor(&self) -> Option<&Arc<Actor>> {
        self.actor.as_ref()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> PieceState {
        self.state
    }

    /// Whether the piece is drivable and renderable.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == PieceState::Ready
    }

    /// Synced steps since the actor was bound.
    #[must_use]
    pub const fn simulate_count(&self) -> u32 {
        self.simulate_count
    }

    /// Last LOD benefit handed to the backend.
    #[must_use]
    pub const fn lod_benefit(&self) -> f32 {
        self.benefit
    }

    /// Asset bone index to skeleton index.
    #[must_use]
    pub fn bone_mapping(&self) -> &[u32] {
        &self.bone_mapping
    }

    /// Requested graphical LOD.
    #[must_use]
    pub const fn graphical_lod(&self) -> u32 {
        self.lod
    }

    /// Whether the requested LOD exists on the asset.
    ///
    /// Unknown until the piece is bound.
    #[must_use]
    pub fn is_lod_available(&self) -> bool {
        self.lod < self.lod_count
    }

    /// Whether the host has this piece shown.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Teleports the cloth on the next sync.
    pub fn force_teleport(&mut self) {
        self.request.force_teleport = true;
    }

    /// Teleports and resets the cloth on the next sync.
    pub fn force_teleport_and_reset(&mut self) {
        self.request.force_reset = true;
    }

    /// Shows or hides the piece.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if let Some(handle) = self.backend_handle() {
            self.backend.set_visible(handle, visible);
        }
    }

    /// Selects the graphical LOD.
    ///
    /// An LOD the asset does not have is kept as requested and logged; the
    /// piece will not become ready with it.
    pub fn set_graphical_lod(&mut self, lod: u32) {
        self.lod = lod;
        let Some(handle) = self.backend_handle() else {
            return;
        };
        if self.is_lod_available() {
            self.backend.set_graphical_lod(handle, lod);
        } else {
            tracing::warn!(
                "Clothing {} ({}): graphical LOD {} unavailable ({} levels)",
                self.handle,
                self.asset.name(),
                lod,
                self.lod_count
            );
        }
    }

    pub(crate) fn set_wind(&self, adapt_time: f32, velocity: Vec3) {
        if let Some(handle) = self.backend_handle() {
            self.backend.set_wind(handle, adapt_time, velocity);
        }
    }

    pub(crate) fn set_max_distance_scale(&self, scale: f32, mode: MaxDistanceScaleMode) {
        if let Some(handle) = self.backend_handle() {
            self.backend.set_max_distance_scale(handle, scale, mode);
        }
    }

    /// Unbound piece whose asset has a backend handle again goes back to
    /// waiting for its first sync. Returns true if it did.
    pub(crate) fn refresh(&mut self) -> bool {
        if self.state != PieceState::Unbound || self.asset.backend_handle().is_none() {
            return false;
        }
        self.set_state(PieceState::AwaitingFirstSync);
        true
    }

    /// Drives one step.
    pub(crate) fn sync(&mut self, ctx: &SyncContext<'_>, bones: &[Mat44]) {
        match self.state {
            PieceState::Unbound => {}
            PieceState::AwaitingFirstSync => self.bind(ctx, bones),
            PieceState::WarmingUp | PieceState::Ready | PieceState::Frozen => self.step(ctx, bones),
        }
    }

    /// Post-fetch upkeep. Returns the actor if the backend lost it.
    pub(crate) fn pump(&mut self, dt: f32, recently_rendered: bool) -> Option<Arc<Actor>> {
        let actor = self.actor.as_ref()?;
        let alive = actor.backend_handle().filter(|h| self.backend.is_actor_alive(*h));
        let Some(handle) = alive else {
            tracing::warn!("Clothing {} ({}) lost its backend actor", self.handle, self.asset.name());
            self.simulate_count = 0;
            self.root_pose = None;
            self.set_state(PieceState::Unbound);
            return self.actor.take();
        };

        let multiplier = self.decay.tick(dt, self.visible && recently_rendered);
        self.benefit = lod_benefit(self.distance_weight, multiplier);
        self.backend.set_lod_benefit(handle, self.benefit);
        None
    }

    /// Detaches the actor for release.
    pub(crate) fn take_actor(&mut self) -> Option<Arc<Actor>> {
        self.simulate_count = 0;
        self.root_pose = None;
        self.state = PieceState::Unbound;
        self.actor.take()
    }

    fn bind(&mut self, ctx: &SyncContext<'_>, bones: &[Mat44]) {
        let Some(asset_handle) = self.asset.backend_handle() else {
            self.set_state(PieceState::Unbound);
            return;
        };

        let bone_names = self.backend.asset_bone_names(asset_handle);
        self.bone_mapping = build_bone_mapping(&bone_names, ctx.skeleton);

        let mut desc = ActorDesc::new(AssetKind::Clothing, ctx.local_to_world);
        desc.scale = ctx.scale;
        desc.bone_mapping.clone_from(&self.bone_mapping);
        let id = ActorId(ctx.clock.next_actor_id());
        let actor = match Actor::create(id, Arc::clone(&self.backend), self.asset.clone(), desc) {
            Ok(actor) => actor,
            Err(err) => {
                tracing::warn!("Clothing {} ({}) could not bind: {}", self.handle, self.asset.name(), err);
                return;
            }
        };
        let Some(handle) = actor.backend_handle() else {
            return;
        };

        self.lod_count = self.backend.graphical_lod_count(asset_handle);
        self.distance_weight = self.backend.lod_distance_weight(asset_handle);
        self.bound_generation = actor.bind_generation();
        self.actor = Some(actor);

        self.apply_parameters(handle, ctx);
        let mapped = self.mapped_bones(bones);
        self.root_pose = Some(root_pose(ctx.local_to_world, &mapped));
        self.backend.update_clothing_state(
            handle,
            &ClothingUpdate {
                local_to_world: ctx.local_to_world,
                bones: &mapped,
                mode: TeleportMode::TeleportAndReset,
            },
        );
        self.request = TeleportRequest::default();
        self.simulate_count = 1;
        self.set_state(PieceState::WarmingUp);
    }

    fn step(&mut self, ctx: &SyncContext<'_>, bones: &[Mat44]) {
        let Some(actor) = self.actor.as_ref() else {
            return;
        };
        let Some(handle) = actor.backend_handle() else {
            return;
        };

        let generation = actor.bind_generation();
        if generation != self.bound_generation {
            // Rebound behind our back: start over from a reset.
            self.bound_generation = generation;
            self.simulate_count = 0;
            self.root_pose = None;
            self.request.force_reset = true;
            self.apply_parameters(handle, ctx);
            if self.state != PieceState::Frozen {
                self.set_state(PieceState::WarmingUp);
            }
        }

        let auto_freeze = ctx.config.auto_freeze_when_not_rendered;
        let active = ctx.simulation_enabled
            && ((self.visible && ctx.recently_rendered) || !auto_freeze)
            && (self.is_lod_available() || !auto_freeze);
        if !active {
            if self.state != PieceState::Frozen {
                self.backend.set_frozen(handle, true);
                self.set_state(PieceState::Frozen);
            }
            return;
        }

        let returning = self.state == PieceState::Frozen;
        if returning {
            self.backend.set_frozen(handle, false);
            self.request.returning_from_frozen = true;
        }

        let mapped = self.mapped_bones(bones);
        let root = root_pose(ctx.local_to_world, &mapped);
        let mode = if self.state == PieceState::Ready || returning {
            select_teleport_mode(self.request, self.root_pose.as_ref(), &root, ctx.thresholds)
        } else {
            self.request.forced_mode().unwrap_or(TeleportMode::Continuous)
        };

        self.backend.update_clothing_state(
            handle,
            &ClothingUpdate {
                local_to_world: ctx.local_to_world,
                bones: &mapped,
                mode,
            },
        );
        if mode != TeleportMode::Continuous {
            tracing::debug!("Clothing {} stepped with {:?}", self.handle, mode);
        }
        self.request = TeleportRequest::default();
        self.root_pose = Some(root);
        self.simulate_count = self.simulate_count.saturating_add(1);

        let ready = self.simulate_count > 1 && self.is_lod_available();
        self.set_state(if ready { PieceState::Ready } else { PieceState::WarmingUp });
    }

    fn apply_parameters(&self, handle: BackendActorHandle, ctx: &SyncContext<'_>) {
        if let Some((adapt_time, velocity)) = ctx.wind {
            self.backend.set_wind(handle, adapt_time, velocity);
        }
        let (scale, mode) = ctx.max_distance;
        self.backend.set_max_distance_scale(handle, scale, mode);
        self.backend.set_visible(handle, self.visible);
        if self.is_lod_available() {
            self.backend.set_graphical_lod(handle, self.lod);
        } else {
            tracing::warn!(
                "Clothing {} ({}): graphical LOD {} unavailable ({} levels)",
                self.handle,
                self.asset.name(),
                self.lod,
                self.lod_count
            );
        }
    }

    fn mapped_bones(&self, bones: &[Mat44]) -> Vec<Mat44> {
        self.bone_mapping
            .iter()
            .map(|&index| bones.get(index as usize).copied().unwrap_or(Mat44::IDENTITY))
            .collect()
    }

    fn backend_handle(&self) -> Option<BackendActorHandle> {
        self.actor.as_ref().and_then(|actor| actor.backend_handle())
    }

    fn set_state(&mut self, state: PieceState) {
        if self.state != state {
            tracing::info!(
                "Clothing {} ({}): {:?} -> {:?}",
                self.handle,
                self.asset.name(),
                self.state,
                state
            );
            self.state = state;
        }
    }
}

impl fmt::Debug for ClothingPiece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClothingPiece")
            .field("handle", &self.handle)
            .field("asset", &self.asset.name())
            .field("state", &self.state)
            .field("simulate_count", &self.simulate_count)
            .finish_non_exhaustive()
    }
}

/// World pose of the first mapped bone.
fn root_pose(local_to_world: Mat44, mapped: &[Mat44]) -> Mat44 {
    match mapped.first() {
        Some(root) => local_to_world * *root,
        None => local_to_world,
    }
}
