//! # Simulation Backend Seam
//!
//! The physics middleware is opaque. The scene only starts a step, waits for
//! it, and pokes per-actor parameters; everything numerical happens behind
//! [`SimulationBackend`].
//!
//! [`ScriptedBackend`] is an in-memory implementation whose steps, failures
//! and actor losses are driven by the caller. It backs headless runs and the
//! test suite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use weft_core::BackendAssetHandle;
use weft_shared::{AssetKind, Mat44, TeleportMode, Vec3};

use crate::error::{SimulationError, SimulationResult};

/// Opaque handle into the backend's actor table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendActorHandle(pub u64);

/// How a max-distance scale combines with the asset's authored distances.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MaxDistanceScaleMode {
    /// Scale replaces the authored value.
    Absolute,
    /// Scale multiplies the authored value.
    #[default]
    Multiply,
}

/// What an actor is created from, retained so it can be recreated.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorDesc {
    /// Kind of the asset the actor instantiates.
    pub kind: AssetKind,
    /// Initial local-to-world transform.
    pub transform: Mat44,
    /// Uniform actor scale.
    pub scale: f32,
    /// Host skeleton index for each bone the asset uses.
    pub bone_mapping: Vec<u32>,
}

impl ActorDesc {
    /// Description of an actor of `kind` at `transform`.
    #[must_use]
    pub fn new(kind: AssetKind, transform: Mat44) -> Self {
        Self { kind, transform, scale: 1.0, bone_mapping: Vec::new() }
    }
}

/// Geometry the backend produced for one actor in the last step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActorRenderData {
    /// Vertex positions.
    pub positions: Vec<Vec3>,
    /// Triangle indices.
    pub indices: Vec<u32>,
    /// Skinning matrices.
    pub bones: Vec<Mat44>,
    /// Graphical LOD the data belongs to.
    pub lod: u32,
    /// Local-to-world transform.
    pub transform: Mat44,
}

/// Driving state for one clothing step.
#[derive(Clone, Copy, Debug)]
pub struct ClothingUpdate<'a> {
    /// Aggregate local-to-world transform.
    pub local_to_world: Mat44,
    /// One matrix per bone the asset uses, in asset order.
    pub bones: &'a [Mat44],
    /// Integration mode for this step only.
    pub mode: TeleportMode,
}

/// The opaque physics/destruction middleware.
pub trait SimulationBackend: Send + Sync {
    /// Creates an actor from an asset.
    ///
    /// # Errors
    ///
    /// `SimulationError::Backend` if the backend refuses.
    fn create_actor(&self, asset: BackendAssetHandle, desc: &ActorDesc) -> SimulationResult<BackendActorHandle>;

    /// Releases an actor. Unknown handles are ignored.
    fn release_actor(&self, actor: BackendActorHandle);

    /// Whether the backend still holds `actor`.
    fn is_actor_alive(&self, actor: BackendActorHandle) -> bool;

    /// Starts a step.
    ///
    /// # Errors
    ///
    /// `SimulationError::Backend` if the step cannot start.
    fn simulate(&self, dt: f32) -> SimulationResult<()>;

    /// Waits for (or polls) the in-flight step. `Ok(false)` means still running.
    ///
    /// # Errors
    ///
    /// `SimulationError::Backend` if the step failed.
    fn fetch_results(&self, blocking: bool) -> SimulationResult<bool>;

    /// Geometry of the last completed step.
    fn render_data(&self, actor: BackendActorHandle) -> Option<ActorRenderData>;

    /// Drives a clothing actor for the next step.
    fn update_clothing_state(&self, actor: BackendActorHandle, update: &ClothingUpdate<'_>);

    /// Graphical LOD levels an asset provides.
    fn graphical_lod_count(&self, asset: BackendAssetHandle) -> u32;

    /// Bones the asset is skinned to, in asset order.
    fn asset_bone_names(&self, asset: BackendAssetHandle) -> Vec<String>;

    /// Authored LOD distance weight of an asset.
    fn lod_distance_weight(&self, _asset: BackendAssetHandle) -> f32 {
        1.0
    }

    /// Selects a graphical LOD.
    fn set_graphical_lod(&self, actor: BackendActorHandle, lod: u32);

    /// Sets the LOD benefit used to budget simulation.
    fn set_lod_benefit(&self, actor: BackendActorHandle, benefit: f32);

    /// Sets wind velocity, reached over `adapt_time` seconds.
    fn set_wind(&self, actor: BackendActorHandle, adapt_time: f32, velocity: Vec3);

    /// Scales the maximum distance particles may leave their skinned position.
    fn set_max_distance_scale(&self, actor: BackendActorHandle, scale: f32, mode: MaxDistanceScaleMode);

    /// Suspends or resumes simulation.
    fn set_frozen(&self, actor: BackendActorHandle, frozen: bool);

    /// Shows or hides the actor.
    fn set_visible(&self, actor: BackendActorHandle, visible: bool);
}

/// Asset description for [`ScriptedBackend`].
#[derive(Clone, Debug, Default)]
pub struct ScriptedAsset {
    /// Graphical LOD levels.
    pub lod_count: u32,
    /// Bone names in asset order.
    pub bone_names: Vec<String>,
    /// Vertex positions reported for every actor.
    pub positions: Vec<Vec3>,
    /// Indices reported for every actor.
    pub indices: Vec<u32>,
    /// LOD distance weight.
    pub distance_weight: f32,
}

/// Per-actor record kept by [`ScriptedBackend`].
#[derive(Clone, Debug)]
pub struct ScriptedActor {
    /// Asset the actor instantiates.
    pub asset: BackendAssetHandle,
    /// Creation description.
    pub desc: ActorDesc,
    /// Modes received through `update_clothing_state`, in order.
    pub modes: Vec<TeleportMode>,
    /// Bones of the last clothing update.
    pub bones: Vec<Mat44>,
    /// Last LOD benefit.
    pub benefit: Option<f32>,
    /// Selected graphical LOD.
    pub lod: u32,
    /// Frozen flag.
    pub frozen: bool,
    /// Visible flag.
    pub visible: bool,
    /// Last wind `(adapt_time, velocity)`.
    pub wind: Option<(f32, Vec3)>,
    /// Last max-distance scale.
    pub max_distance_scale: Option<(f32, MaxDistanceScaleMode)>,
}

#[derive(Default)]
struct ScriptState {
    assets: HashMap<BackendAssetHandle, ScriptedAsset>,
    actors: HashMap<BackendActorHandle, ScriptedActor>,
    step_in_flight: bool,
    steps: u64,
    /// Non-blocking polls left before the current step completes.
    polls_remaining: u32,
    polls_per_step: u32,
    fail_next_simulate: Option<String>,
    fail_next_fetch: Option<String>,
    refuse_create: bool,
}

/// Caller-driven backend.
#[derive(Default)]
pub struct ScriptedBackend {
    state: Mutex<ScriptState>,
    next_actor: AtomicU64,
}

impl ScriptedBackend {
    /// Creates a backend with no assets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Describes an asset handle.
    pub fn define_asset(&self, handle: BackendAssetHandle, asset: ScriptedAsset) {
        self.state.lock().assets.insert(handle, asset);
    }

    /// Non-blocking fetches needed before each step completes.
    pub fn set_polls_per_step(&self, polls: u32) {
        self.state.lock().polls_per_step = polls;
    }

    /// Makes the next `simulate` fail.
    pub fn fail_next_simulate(&self, message: impl Into<String>) {
        self.state.lock().fail_next_simulate = Some(message.into());
    }

    /// Makes the next completing fetch fail.
    pub fn fail_next_fetch(&self, message: impl Into<String>) {
        self.state.lock().fail_next_fetch = Some(message.into());
    }

    /// Makes `create_actor` fail until cleared.
    pub fn set_refuse_create(&self, refuse: bool) {
        self.state.lock().refuse_create = refuse;
    }

    /// Drops an actor as if the middleware had lost it.
    pub fn lose_actor(&self, actor: BackendActorHandle) {
        self.state.lock().actors.remove(&actor);
    }

    /// Snapshot of one actor.
    #[must_use]
    pub fn actor(&self, actor: BackendActorHandle) -> Option<ScriptedActor> {
        self.state.lock().actors.get(&actor).cloned()
    }

    /// Actors currently alive.
    #[must_use]
    pub fn live_actor_count(&self) -> usize {
        self.state.lock().actors.len()
    }

    /// Steps completed.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.state.lock().steps
    }

    fn with_actor(&self, actor: BackendActorHandle, f: impl FnOnce(&mut ScriptedActor)) {
        if let Some(record) = self.state.lock().actors.get_mut(&actor) {
            f(record);
        }
    }
}

impl SimulationBackend for ScriptedBackend {
    fn create_actor(&self, asset: BackendAssetHandle, desc: &ActorDesc) -> SimulationResult<BackendActorHandle> {
        let mut state = self.state.lock();
        if state.refuse_create {
            return Err(SimulationError::Backend(format!("actor creation refused for {asset:?}")));
        }
        let handle = BackendActorHandle(self.next_actor.fetch_add(1, Ordering::Relaxed) + 1);
        state.actors.insert(
            handle,
            ScriptedActor {
                asset,
                desc: desc.clone(),
                modes: Vec::new(),
                bones: Vec::new(),
                benefit: None,
                lod: 0,
                frozen: false,
                visible: true,
                wind: None,
                max_distance_scale: None,
            },
        );
        Ok(handle)
    }

    fn release_actor(&self, actor: BackendActorHandle) {
        self.state.lock().actors.remove(&actor);
    }

    fn is_actor_alive(&self, actor: BackendActorHandle) -> bool {
        self.state.lock().actors.contains_key(&actor)
    }

    fn simulate(&self, _dt: f32) -> SimulationResult<()> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_next_simulate.take() {
            return Err(SimulationError::Backend(message));
        }
        state.step_in_flight = true;
        state.polls_remaining = state.polls_per_step;
        Ok(())
    }

    fn fetch_results(&self, blocking: bool) -> SimulationResult<bool> {
        let mut state = self.state.lock();
        if !state.step_in_flight {
            return Ok(true);
        }
        if !blocking && state.polls_remaining > 0 {
            state.polls_remaining -= 1;
            return Ok(false);
        }
        state.step_in_flight = false;
        state.steps += 1;
        match state.fail_next_fetch.take() {
            Some(message) => Err(SimulationError::Backend(message)),
            None => Ok(true),
        }
    }

    fn render_data(&self, actor: BackendActorHandle) -> Option<ActorRenderData> {
        let state = self.state.lock();
        let record = state.actors.get(&actor)?;
        let asset = state.assets.get(&record.asset).cloned().unwrap_or_default();
        Some(ActorRenderData {
            positions: asset.positions,
            indices: asset.indices,
            bones: record.bones.clone(),
            lod: record.lod,
            transform: record.desc.transform,
        })
    }

    fn update_clothing_state(&self, actor: BackendActorHandle, update: &ClothingUpdate<'_>) {
        self.with_actor(actor, |record| {
            record.modes.push(update.mode);
            record.bones = update.bones.to_vec();
            record.desc.transform = update.local_to_world;
        });
    }

    fn graphical_lod_count(&self, asset: BackendAssetHandle) -> u32 {
        self.state.lock().assets.get(&asset).map_or(0, |a| a.lod_count)
    }

    fn asset_bone_names(&self, asset: BackendAssetHandle) -> Vec<String> {
        self.state.lock().assets.get(&asset).map(|a| a.bone_names.clone()).unwrap_or_default()
    }

    fn lod_distance_weight(&self, asset: BackendAssetHandle) -> f32 {
        self.state.lock().assets.get(&asset).map_or(1.0, |a| a.distance_weight)
    }

    fn set_graphical_lod(&self, actor: BackendActorHandle, lod: u32) {
        self.with_actor(actor, |record| record.lod = lod);
    }

    fn set_lod_benefit(&self, actor: BackendActorHandle, benefit: f32) {
        self.with_actor(actor, |record| record.benefit = Some(benefit));
    }

    fn set_wind(&self, actor: BackendActorHandle, adapt_time: f32, velocity: Vec3) {
        self.with_actor(actor, |record| record.wind = Some((adapt_time, velocity)));
    }

    fn set_max_distance_scale(&self, actor: BackendActorHandle, scale: f32, mode: MaxDistanceScaleMode) {
        self.with_actor(actor, |record| record.max_distance_scale = Some((scale, mode)));
    }

    fn set_frozen(&self, actor: BackendActorHandle, frozen: bool) {
        self.with_actor(actor, |record| record.frozen = frozen);
    }

    fn set_visible(&self, actor: BackendActorHandle, visible: bool) {
        self.with_actor(actor, |record| record.visible = visible);
    }
}
