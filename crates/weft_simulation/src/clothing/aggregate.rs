//! # Clothing Aggregate
//!
//! All clothing pieces driven by one host skeleton.
//!
//! The host pushes bone transforms once per frame through
//! [`ClothingAggregate::sync_transforms`]; the scene pumps the aggregate
//! after each fetch. Actors a piece gives up are parked here until the
//! scene releases them.

use std::fmt;
use std::sync::Arc;

use weft_core::AssetRef;
use weft_shared::constants::SCALE_EPSILON;
use weft_shared::{AssetKind, Mat44, Vec3, VISIBLE_FRAME_COUNT};

use super::lod::MaxDistanceRamp;
use super::piece::{ClothingPiece, PieceHandle, SyncContext};
use super::teleport::TeleportThresholds;
use crate::actor::Actor;
use crate::backend::{MaxDistanceScaleMode, SimulationBackend};
use crate::clock::SceneClock;
use crate::config::ClothingConfig;
use crate::error::{SimulationError, SimulationResult};

/// Scene-unique aggregate identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClothingId(pub u64);

impl fmt::Display for ClothingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clothing#{}", self.0)
    }
}

/// Clothing pieces sharing one skeleton.
pub struct ClothingAggregate {
    id: ClothingId,
    skeleton: Vec<String>,
    pieces: Vec<ClothingPiece>,
    next_piece: u32,
    backend: Arc<dyn SimulationBackend>,
    clock: Arc<SceneClock>,
    config: ClothingConfig,
    thresholds: TeleportThresholds,
    local_to_world: Mat44,
    scale: f32,
    wind: Option<(f32, Vec3)>,
    max_distance: MaxDistanceRamp,
    simulation_enabled: bool,
    hidden: bool,
    /// Simulate count at the last render submission.
    rendered_at: u64,
    needs_refresh: bool,
    retired: Vec<Arc<Actor>>,
}

impl ClothingAggregate {
    pub(crate) fn new(
        id: ClothingId,
        skeleton: Vec<String>,
        backend: Arc<dyn SimulationBackend>,
        clock: Arc<SceneClock>,
        config: ClothingConfig,
    ) -> Self {
        let rendered_at = clock.simulate_count();
        Self {
            id,
            skeleton,
            pieces: Vec::new(),
            next_piece: 0,
            backend,
            clock,
            thresholds: TeleportThresholds::from_config(&config),
            config,
            local_to_world: Mat44::IDENTITY,
            scale: 1.0,
            wind: None,
            max_distance: MaxDistanceRamp::default(),
            simulation_enabled: true,
            hidden: false,
            rendered_at,
            needs_refresh: false,
            retired: Vec::new(),
        }
    }

    /// Identity.
    #[must_use]
    pub const fn id(&self) -> ClothingId {
        self.id
    }

    /// Host skeleton bone names.
    #[must_use]
    pub fn skeleton(&self) -> &[String] {
        &self.skeleton
    }

    /// Adds a piece simulating `asset` with material slot `material_index`.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if the asset is not clothing.
    pub fn add_piece(&mut self, asset: &AssetRef, material_index: u32) -> SimulationResult<PieceHandle> {
        if asset.kind() != AssetKind::Clothing {
            return Err(SimulationError::TypeMismatch {
                name: asset.name().to_string(),
                expected: AssetKind::Clothing,
                found: asset.kind(),
            });
        }
        self.next_piece += 1;
        let handle = PieceHandle(self.next_piece);
        let piece = ClothingPiece::new(handle, asset.clone(), material_index, Arc::clone(&self.backend), &self.config);
        if piece.state() == super::PieceState::Unbound {
            self.needs_refresh = true;
        }
        self.pieces.push(piece);
        tracing::info!("{} added {} ({})", self.id, handle, asset.name());
        Ok(handle)
    }

    /// Removes a piece. Its actor is released by the scene.
    pub fn remove_piece(&mut self, handle: PieceHandle) -> bool {
        let Some(index) = self.pieces.iter().position(|p| p.handle() == handle) else {
            return false;
        };
        let mut piece = self.pieces.remove(index);
        self.retired.extend(piece.take_actor());
        tracing::info!("{} removed {}", self.id, handle);
        true
    }

    /// Looks up a piece.
    #[must_use]
    pub fn piece(&self, handle: PieceHandle) -> Option<&ClothingPiece> {
        self.pieces.iter().find(|p| p.handle() == handle)
    }

    /// Looks up a piece mutably.
    pub fn piece_mut(&mut self, handle: PieceHandle) -> Option<&mut ClothingPiece> {
        self.pieces.iter_mut().find(|p| p.handle() == handle)
    }

    /// All pieces, in insertion order.
    pub fn pieces(&self) -> impl Iterator<Item = &ClothingPiece> {
        self.pieces.iter()
    }

    /// Number of pieces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    /// Whether the aggregate has no pieces.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Pushes this frame's skeleton pose to every piece.
    ///
    /// `bones` is indexed like the skeleton. An empty array only updates the
    /// transform. Non-uniform scale is not supported; the previous scale is
    /// kept and a warning logged.
    pub fn sync_transforms(&mut self, bones: &[Mat44], local_to_world: Mat44) {
        let [sx, sy, sz] = local_to_world.column_scales();
        if (sx - sy).abs() > SCALE_EPSILON || (sx - sz).abs() > SCALE_EPSILON {
            tracing::warn!("{} has non-uniform scale ({}, {}, {}); keeping {}", self.id, sx, sy, sz, self.scale);
        } else {
            self.scale = sx;
        }
        self.local_to_world = local_to_world;

        if bones.is_empty() {
            return;
        }
        if self.clock.clothing_paused() {
            tracing::trace!("{} sync skipped: step too long", self.id);
            return;
        }

        let ctx = SyncContext {
            clock: &self.clock,
            config: &self.config,
            thresholds: &self.thresholds,
            skeleton: &self.skeleton,
            local_to_world,
            scale: self.scale,
            recently_rendered: self.is_recently_visible(),
            simulation_enabled: self.simulation_enabled,
            wind: self.wind,
            max_distance: (self.max_distance.scale(), self.max_distance.mode()),
        };
        for piece in &mut self.pieces {
            piece.sync(&ctx, bones);
        }
    }

    /// Last local-to-world transform pushed.
    #[must_use]
    pub const fn local_to_world(&self) -> Mat44 {
        self.local_to_world
    }

    /// Uniform scale in use.
    #[must_use]
    pub const fn scale(&self) -> f32 {
        self.scale
    }

    /// Teleports every piece on the next sync.
    pub fn force_teleport(&mut self) {
        self.pieces.iter_mut().for_each(ClothingPiece::force_teleport);
    }

    /// Teleports and resets every piece on the next sync.
    pub fn force_teleport_and_reset(&mut self) {
        self.pieces.iter_mut().for_each(ClothingPiece::force_teleport_and_reset);
    }

    /// Shows or hides the whole aggregate.
    pub fn set_visible(&mut self, visible: bool) {
        self.hidden = !visible;
        for piece in &mut self.pieces {
            piece.set_visible(visible);
        }
    }

    /// Whether the host has the aggregate shown.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        !self.hidden
    }

    /// Rendered within the last [`VISIBLE_FRAME_COUNT`] ticks and not hidden.
    #[must_use]
    pub fn is_recently_visible(&self) -> bool {
        !self.hidden
            && self.clock.simulate_count().saturating_sub(self.rendered_at) < u64::from(VISIBLE_FRAME_COUNT)
    }

    /// Sets wind on every piece, now and on later binds.
    pub fn set_wind(&mut self, adapt_time: f32, velocity: Vec3) {
        self.wind = Some((adapt_time, velocity));
        for piece in &self.pieces {
            piece.set_wind(adapt_time, velocity);
        }
    }

    /// Ramps the max-distance scale from `start` to `end` over `duration`
    /// seconds of simulation.
    pub fn set_max_distance_scale(&mut self, start: f32, end: f32, mode: MaxDistanceScaleMode, duration: f32) {
        let scale = self.max_distance.start(start, end, mode, duration);
        self.apply_max_distance(scale);
    }

    /// Current max-distance scale.
    #[must_use]
    pub const fn max_distance_scale(&self) -> f32 {
        self.max_distance.scale()
    }

    /// Enables or suspends simulation. Suspended pieces freeze.
    pub fn set_simulation_enabled(&mut self, enabled: bool) {
        if self.simulation_enabled != enabled {
            tracing::info!("{} simulation {}", self.id, if enabled { "enabled" } else { "disabled" });
        }
        self.simulation_enabled = enabled;
    }

    /// Whether simulation is enabled.
    #[must_use]
    pub const fn is_simulation_enabled(&self) -> bool {
        self.simulation_enabled
    }

    /// Selects the graphical LOD on every piece.
    pub fn set_graphical_lod(&mut self, lod: u32) {
        for piece in &mut self.pieces {
            piece.set_graphical_lod(lod);
        }
    }

    /// Whether some piece needs [`refresh`](Self::refresh).
    #[must_use]
    pub const fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    /// Re-arms unbound pieces whose asset is loaded.
    ///
    /// Returns the number of pieces re-armed.
    pub fn refresh(&mut self) -> usize {
        let mut rearmed = 0;
        for piece in &mut self.pieces {
            if piece.refresh() {
                rearmed += 1;
            }
        }
        self.needs_refresh = self
            .pieces
            .iter()
            .any(|p| p.state() == super::PieceState::Unbound);
        if rearmed > 0 {
            tracing::info!("{} refreshed {} pieces", self.id, rearmed);
        }
        rearmed
    }

    pub(crate) fn pump(&mut self, dt: f32) {
        if let Some(scale) = self.max_distance.tick(dt) {
            self.apply_max_distance(scale);
        }
        let recently_rendered = self.is_recently_visible();
        for piece in &mut self.pieces {
            if let Some(actor) = piece.pump(dt, recently_rendered) {
                self.needs_refresh = true;
                self.retired.push(actor);
            }
        }
    }

    pub(crate) fn mark_rendered(&mut self) {
        self.rendered_at = self.clock.simulate_count();
    }

    pub(crate) fn actors(&self) -> impl Iterator<Item = &Arc<Actor>> {
        self.pieces.iter().filter_map(ClothingPiece::actor)
    }

    /// Actors of shown pieces that are past warm-up.
    pub(crate) fn renderable_actors(&self) -> impl Iterator<Item = &Arc<Actor>> {
        self.pieces
            .iter()
            .filter(|p| p.is_visible() && matches!(p.state(), super::PieceState::Ready | super::PieceState::Frozen))
            .filter_map(ClothingPiece::actor)
    }

    pub(crate) fn take_retired(&mut self) -> Vec<Arc<Actor>> {
        std::mem::take(&mut self.retired)
    }

    /// Detaches every actor for release.
    pub(crate) fn teardown(&mut self) -> Vec<Arc<Actor>> {
        let mut actors = self.take_retired();
        actors.extend(self.pieces.iter_mut().filter_map(ClothingPiece::take_actor));
        self.pieces.clear();
        actors
    }

    fn apply_max_distance(&self, scale: f32) {
        let mode = self.max_distance.mode();
        for piece in &self.pieces {
            piece.set_max_distance_scale(scale, mode);
        }
    }
}

impl fmt::Debug for ClothingAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClothingAggregate")
            .field("id", &self.id)
            .field("pieces", &self.pieces)
            .field("needs_refresh", &self.needs_refresh)
            .finish_non_exhaustive()
    }
}
