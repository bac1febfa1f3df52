//! # Scene
//!
//! Owns the simulate/fetch cycle, the live actors and the clothing
//! aggregates of one simulation world.
//!
//! ## Frame
//!
//! ```text
//!  simulate(dt) ──> fetch_results ──> host sync_transforms ──> update_render_resources ──> submit_render
//!   │ pump force-resolve   │ pump clothing (LOD decay,          │ stage render contexts       │ draw tasks on
//!   │ reclaim queue pool   │ ramps, lost actors)                │ post buffer work            │ the render thread
//!   │ release retired      │ release retired
//! ```
//!
//! `simulate` must be matched by a completed `fetch_results` before it is
//! called again. Overlap is a programmer error and panics.

use std::collections::BTreeMap;
use std::sync::Arc;

use weft_core::{AssetRef, AssetStore, BackendAssetHandle, CleanupQueue};
use weft_rendering::{Fence, RenderResourceQueue, RenderSubmitter};
use weft_shared::{AssetKind, Mat44};

use crate::actor::{Actor, ActorHandle, ActorId, ReleaseOutcome};
use crate::backend::{ActorDesc, SimulationBackend};
use crate::clock::SceneClock;
use crate::clothing::{ClothingAggregate, ClothingId};
use crate::config::SceneConfig;
use crate::error::{SimulationError, SimulationResult};

/// What to create an actor as.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorParams {
    /// Kind the asset must have.
    pub kind: AssetKind,
    /// Initial local-to-world transform.
    pub transform: Mat44,
}

impl ActorParams {
    /// Actor of `kind` at the origin.
    #[must_use]
    pub const fn new(kind: AssetKind) -> Self {
        Self { kind, transform: Mat44::IDENTITY }
    }

    /// Sets the initial transform.
    #[must_use]
    pub const fn with_transform(mut self, transform: Mat44) -> Self {
        self.transform = transform;
        self
    }
}

/// Outcome of [`Scene::fetch_results`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchStatus {
    /// Step complete, or no step was in flight.
    Ok,
    /// Non-blocking fetch; the step is still running.
    Pending,
    /// The backend failed the step. The scene is ready for the next one.
    BackendError(String),
}

impl FetchStatus {
    /// Whether the step is finished, successfully or not.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One simulation world.
pub struct Scene {
    backend: Arc<dyn SimulationBackend>,
    store: Arc<AssetStore>,
    cleanup: Arc<CleanupQueue>,
    queue: RenderResourceQueue,
    clock: Arc<SceneClock>,
    config: SceneConfig,
    actors: BTreeMap<ActorId, ActorHandle>,
    clothing: BTreeMap<ClothingId, ClothingAggregate>,
    next_clothing: u64,
    step_in_flight: bool,
    pending_error: Option<String>,
    last_dt: f32,
    /// Simulate count at the last render update.
    updated_at: u64,
    shut_down: bool,
}

impl Scene {
    /// Creates a scene posting render work through `submitter`.
    ///
    /// # Errors
    ///
    /// `Config` if the configuration is out of range.
    pub fn new(
        backend: Arc<dyn SimulationBackend>,
        store: Arc<AssetStore>,
        cleanup: Arc<CleanupQueue>,
        submitter: RenderSubmitter,
        config: SceneConfig,
    ) -> SimulationResult<Self> {
        config.validate()?;
        tracing::info!("Scene created");
        Ok(Self {
            backend,
            store,
            cleanup,
            queue: RenderResourceQueue::new(submitter, config.queue.clone()),
            clock: Arc::new(SceneClock::default()),
            config,
            actors: BTreeMap::new(),
            clothing: BTreeMap::new(),
            next_clothing: 0,
            step_in_flight: false,
            pending_error: None,
            last_dt: 0.0,
            updated_at: 0,
            shut_down: false,
        })
    }

    // =========================================================================
    // ACTORS
    // =========================================================================

    /// Instantiates `asset` in this scene.
    ///
    /// # Errors
    ///
    /// - `NotReady` if the scene is shut down or the asset has no backend handle
    /// - `TypeMismatch` if the asset is not of `params.kind`
    /// - `Backend` if the backend refuses the actor
    pub fn create_actor(&mut self, asset: &AssetRef, params: ActorParams) -> SimulationResult<ActorHandle> {
        if self.shut_down {
            return Err(SimulationError::NotReady { reason: "scene is shut down".to_string() });
        }
        if asset.kind() != params.kind {
            return Err(SimulationError::TypeMismatch {
                name: asset.name().to_string(),
                expected: params.kind,
                found: asset.kind(),
            });
        }
        let id = ActorId(self.clock.next_actor_id());
        let desc = ActorDesc::new(params.kind, params.transform);
        let actor = Actor::create(id, Arc::clone(&self.backend), asset.clone(), desc)?;
        self.actors.insert(id, Arc::clone(&actor));
        Ok(actor)
    }

    /// Releases an actor created by this scene.
    ///
    /// # Panics
    ///
    /// Panics if the actor was already released.
    pub fn release_actor(&mut self, actor: &ActorHandle) -> ReleaseOutcome {
        self.actors.remove(&actor.id());
        actor.release(&mut self.queue, &self.cleanup)
    }

    /// Looks up a live actor.
    #[must_use]
    pub fn actor(&self, id: ActorId) -> Option<&ActorHandle> {
        self.actors.get(&id)
    }

    /// Live actors created through [`create_actor`](Self::create_actor).
    #[must_use]
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    // =========================================================================
    // CLOTHING
    // =========================================================================

    /// Creates an aggregate driven by a skeleton with these bone names.
    ///
    /// # Errors
    ///
    /// `NotReady` if the scene is shut down.
    pub fn create_clothing(&mut self, skeleton: Vec<String>) -> SimulationResult<ClothingId> {
        if self.shut_down {
            return Err(SimulationError::NotReady { reason: "scene is shut down".to_string() });
        }
        self.next_clothing += 1;
        let id = ClothingId(self.next_clothing);
        let aggregate = ClothingAggregate::new(
            id,
            skeleton,
            Arc::clone(&self.backend),
            Arc::clone(&self.clock),
            self.config.clothing.clone(),
        );
        self.clothing.insert(id, aggregate);
        tracing::info!("{} created", id);
        Ok(id)
    }

    /// Looks up an aggregate.
    #[must_use]
    pub fn clothing(&self, id: ClothingId) -> Option<&ClothingAggregate> {
        self.clothing.get(&id)
    }

    /// Looks up an aggregate mutably.
    pub fn clothing_mut(&mut self, id: ClothingId) -> Option<&mut ClothingAggregate> {
        self.clothing.get_mut(&id)
    }

    /// Every aggregate, by id.
    pub fn clothing_iter_mut(&mut self) -> impl Iterator<Item = (ClothingId, &mut ClothingAggregate)> {
        self.clothing.iter_mut().map(|(id, aggregate)| (*id, aggregate))
    }

    /// Tears an aggregate down and releases its actors.
    pub fn release_clothing(&mut self, id: ClothingId) -> bool {
        let Some(mut aggregate) = self.clothing.remove(&id) else {
            return false;
        };
        for actor in aggregate.teardown() {
            actor.release(&mut self.queue, &self.cleanup);
        }
        tracing::info!("{} released", id);
        true
    }

    // =========================================================================
    // SIMULATE / FETCH
    // =========================================================================

    /// Starts a step of `dt` seconds.
    ///
    /// A backend failure is held and reported by the next
    /// [`fetch_results`](Self::fetch_results).
    ///
    /// # Panics
    ///
    /// Panics if the previous step has not been fetched.
    pub fn simulate(&mut self, dt: f32) {
        assert!(
            !self.step_in_flight,
            "Scene::simulate called while a step is in flight; fetch_results must complete first"
        );
        if self.shut_down {
            tracing::warn!("Scene::simulate after shutdown ignored");
            return;
        }

        self.store.pump_force_resolve();
        self.queue.reclaim_unused();
        self.release_retired();

        let paused = self.config.clothing.max_simulation_dt.is_some_and(|max| dt > max);
        if paused {
            tracing::debug!("step of {}s exceeds max_simulation_dt; clothing paused", dt);
        }
        self.clock.advance(paused);
        self.last_dt = dt;
        self.step_in_flight = true;

        if let Err(err) = self.backend.simulate(dt) {
            tracing::warn!("Scene step failed to start: {}", err);
            self.pending_error = Some(err.to_string());
        }
    }

    /// Waits for (or polls) the step in flight, then pumps clothing.
    pub fn fetch_results(&mut self, blocking: bool) -> FetchStatus {
        if !self.step_in_flight {
            return FetchStatus::Ok;
        }
        if let Some(message) = self.pending_error.take() {
            self.step_in_flight = false;
            return FetchStatus::BackendError(message);
        }

        match self.backend.fetch_results(blocking) {
            Ok(false) => FetchStatus::Pending,
            Ok(true) => {
                self.step_in_flight = false;
                if !self.clock.clothing_paused() {
                    let dt = self.last_dt;
                    for aggregate in self.clothing.values_mut() {
                        aggregate.pump(dt);
                    }
                }
                self.release_retired();
                FetchStatus::Ok
            }
            Err(err) => {
                self.step_in_flight = false;
                tracing::warn!("Scene step failed: {}", err);
                FetchStatus::BackendError(err.to_string())
            }
        }
    }

    /// Whether a step awaits `fetch_results`.
    #[must_use]
    pub const fn is_step_in_flight(&self) -> bool {
        self.step_in_flight
    }

    // =========================================================================
    // RENDERING
    // =========================================================================

    /// Stages render contexts for every bound actor.
    ///
    /// After a completed step every actor is staged; otherwise only the
    /// dirty ones. Returns how many were staged.
    pub fn update_render_resources(&mut self) -> usize {
        let stepped = self.clock.simulate_count() != self.updated_at;
        self.updated_at = self.clock.simulate_count();

        let mut staged = 0;
        let clothing_actors = self.clothing.values().flat_map(|aggregate| aggregate.actors());
        for actor in self.actors.values().chain(clothing_actors) {
            if (stepped || actor.is_render_dirty()) && actor.update_render_resources(&mut self.queue) {
                staged += 1;
            }
        }
        staged
    }

    /// Queues a draw task per renderable actor and stamps shown aggregates
    /// as rendered. Returns how many draws were queued.
    pub fn submit_render(&mut self) -> usize {
        let submitter = self.queue.submitter();
        let mut submitted = self.actors.values().filter(|actor| actor.submit_render(submitter)).count();
        for aggregate in self.clothing.values_mut() {
            if !aggregate.is_visible() {
                continue;
            }
            submitted += aggregate.renderable_actors().filter(|actor| actor.submit_render(submitter)).count();
            aggregate.mark_rendered();
        }
        submitted
    }

    // =========================================================================
    // ASSETS
    // =========================================================================

    /// Swaps `asset`'s backend handle in place.
    ///
    /// Bound actors go away and rebind to the new handle; clothing pieces
    /// restart from a reset. Returns a fence behind every cleanup issued so
    /// far.
    pub fn refresh_asset(&mut self, asset: &AssetRef, handle: BackendAssetHandle) -> Fence {
        let fence = self.queue.submitter().fence();
        self.store.rebind(asset, handle);
        for aggregate in self.clothing.values_mut() {
            if aggregate.needs_refresh() {
                aggregate.refresh();
            }
        }
        fence
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    /// Releases every actor and aggregate.
    ///
    /// Finishes a step in flight first. Returns a fence behind every deferred
    /// cleanup; once it signals, `cleanup().pending()` is zero. Idempotent.
    pub fn shutdown(&mut self) -> Fence {
        if !self.shut_down {
            if self.step_in_flight {
                let status = self.fetch_results(true);
                tracing::debug!("final fetch before shutdown: {:?}", status);
            }
            self.shut_down = true;

            let mut deferred = 0;
            let actors = std::mem::take(&mut self.actors);
            let clothing = std::mem::take(&mut self.clothing);
            let clothing_actors = clothing.into_values().flat_map(|mut aggregate| aggregate.teardown());
            for actor in actors.into_values().chain(clothing_actors) {
                if actor.release(&mut self.queue, &self.cleanup) == ReleaseOutcome::Deferred {
                    deferred += 1;
                }
            }
            tracing::info!("Scene shut down ({} deferred cleanups)", deferred);
        }
        self.queue.submitter().fence()
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    #[must_use]
    pub const fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Resource queue.
    #[must_use]
    pub const fn queue(&self) -> &RenderResourceQueue {
        &self.queue
    }

    /// Resource queue, mutably.
    pub fn queue_mut(&mut self) -> &mut RenderResourceQueue {
        &mut self.queue
    }

    /// Deferred cleanup bookkeeping.
    #[must_use]
    pub const fn cleanup(&self) -> &Arc<CleanupQueue> {
        &self.cleanup
    }

    /// Asset registry.
    #[must_use]
    pub const fn store(&self) -> &Arc<AssetStore> {
        &self.store
    }

    /// Tick counter.
    #[must_use]
    pub const fn clock(&self) -> &Arc<SceneClock> {
        &self.clock
    }

    /// Configuration the scene was built with.
    #[must_use]
    pub const fn config(&self) -> &SceneConfig {
        &self.config
    }

    fn release_retired(&mut self) {
        for aggregate in self.clothing.values_mut() {
            for actor in aggregate.take_retired() {
                actor.release(&mut self.queue, &self.cleanup);
            }
        }
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        if !self.shut_down {
            drop(self.shutdown());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorState;
    use crate::backend::ScriptedBackend;
    use crate::testing::{asset, pose, skeleton, store};
    use weft_rendering::{render_channel, DeviceOp, RenderExecutor, SoftwareDevice};

    struct Fixture {
        backend: Arc<ScriptedBackend>,
        scene: Scene,
        executor: RenderExecutor<SoftwareDevice>,
    }

    fn fixture(config: SceneConfig) -> Fixture {
        let backend = Arc::new(ScriptedBackend::new());
        let (submitter, executor) = render_channel(SoftwareDevice::new());
        let scene = Scene::new(backend.clone(), store(), CleanupQueue::new(), submitter, config).unwrap();
        Fixture { backend, scene, executor }
    }

    #[test]
    fn test_create_actor_checks_kind() {
        let mut f = fixture(SceneConfig::default());
        let cloth = asset(f.scene.store(), &f.backend, "cloth", 1, AssetKind::Clothing);
        let err = f.scene.create_actor(&cloth, ActorParams::new(AssetKind::Destructible)).unwrap_err();
        assert!(matches!(err, SimulationError::TypeMismatch { expected: AssetKind::Destructible, .. }));
        assert_eq!(cloth.ref_count(), 1);

        let actor = f.scene.create_actor(&cloth, ActorParams::new(AssetKind::Clothing)).unwrap();
        assert_eq!(cloth.ref_count(), 2);
        assert_eq!(f.scene.actor_count(), 1);
        assert_eq!(actor.state(), ActorState::Bound);
    }

    #[test]
    fn test_backend_refusal_propagates() {
        let mut f = fixture(SceneConfig::default());
        let wall = asset(f.scene.store(), &f.backend, "wall", 1, AssetKind::Destructible);
        f.backend.set_refuse_create(true);
        let err = f.scene.create_actor(&wall, ActorParams::new(AssetKind::Destructible)).unwrap_err();
        assert!(matches!(err, SimulationError::Backend(_)));
        assert_eq!(wall.ref_count(), 1);
    }

    #[test]
    fn test_non_blocking_fetch_polls() {
        let mut f = fixture(SceneConfig::default());
        f.backend.set_polls_per_step(2);
        f.scene.simulate(0.016);
        assert_eq!(f.scene.fetch_results(false), FetchStatus::Pending);
        assert_eq!(f.scene.fetch_results(false), FetchStatus::Pending);
        assert_eq!(f.scene.fetch_results(false), FetchStatus::Ok);
        assert!(!f.scene.is_step_in_flight());
        assert_eq!(f.scene.fetch_results(true), FetchStatus::Ok);
    }

    #[test]
    fn test_backend_errors_surface_without_retry() {
        let mut f = fixture(SceneConfig::default());
        f.backend.fail_next_simulate("solver missing");
        f.scene.simulate(0.016);
        assert_eq!(f.scene.fetch_results(true), FetchStatus::BackendError("backend error: solver missing".into()));

        f.scene.simulate(0.016);
        f.backend.fail_next_fetch("diverged");
        assert!(matches!(f.scene.fetch_results(true), FetchStatus::BackendError(_)));

        f.scene.simulate(0.016);
        assert_eq!(f.scene.fetch_results(true), FetchStatus::Ok);
        assert_eq!(f.backend.steps(), 2);
    }

    #[test]
    #[should_panic(expected = "step is in flight")]
    fn test_overlapping_simulate_panics() {
        let mut f = fixture(SceneConfig::default());
        f.scene.simulate(0.016);
        f.scene.simulate(0.016);
    }

    #[test]
    fn test_long_step_pauses_clothing() {
        let mut config = SceneConfig::default();
        config.clothing.max_simulation_dt = Some(0.1);
        let mut f = fixture(config);
        f.scene.simulate(0.5);
        assert!(f.scene.clock().clothing_paused());
        f.scene.fetch_results(true);
        f.scene.simulate(0.05);
        assert!(!f.scene.clock().clothing_paused());
    }

    #[test]
    fn test_release_defers_while_render_holds_actor() {
        let mut f = fixture(SceneConfig::default());
        let wall = asset(f.scene.store(), &f.backend, "wall", 1, AssetKind::Destructible);
        let actor = f.scene.create_actor(&wall, ActorParams::new(AssetKind::Destructible)).unwrap();

        f.scene.simulate(0.016);
        f.scene.fetch_results(true);
        assert_eq!(f.scene.update_render_resources(), 1);
        assert_eq!(f.scene.submit_render(), 1);
        assert_eq!(actor.render_refs(), 1);

        assert_eq!(f.scene.release_actor(&actor), ReleaseOutcome::Deferred);
        assert_eq!(actor.state(), ActorState::PendingCleanup);
        assert_eq!(f.scene.cleanup().pending(), 1);
        assert_eq!(wall.ref_count(), 2);

        f.executor.drain();
        assert_eq!(actor.state(), ActorState::Destroyed);
        assert_eq!(f.scene.cleanup().pending(), 0);
        assert_eq!(wall.ref_count(), 1);
        assert_eq!(f.backend.live_actor_count(), 0);
        let device = f.executor.device();
        assert_eq!(device.draws().len(), 1);
        assert_eq!(device.dangling_draws(), 0);
        assert_eq!(device.live_buffers(), 0);

        // Staged work lands before the draw, teardown after it.
        let ops = device.ops();
        let draw = ops.iter().position(|op| matches!(op, DeviceOp::Draw { .. })).unwrap();
        let (before, after) = ops.split_at(draw);
        assert!(before.iter().any(|op| matches!(op, DeviceOp::Write { .. })));
        assert!(before.iter().all(|op| matches!(op, DeviceOp::Create(_) | DeviceOp::Write { .. })));
        assert!(after[1..].iter().all(|op| matches!(op, DeviceOp::Destroy(_))));
        let created = before.iter().filter(|op| matches!(op, DeviceOp::Create(_))).count();
        assert_eq!(after.len() - 1, created);
    }

    #[test]
    fn test_release_without_render_is_immediate() {
        let mut f = fixture(SceneConfig::default());
        let wall = asset(f.scene.store(), &f.backend, "wall", 1, AssetKind::Destructible);
        let actor = f.scene.create_actor(&wall, ActorParams::new(AssetKind::Destructible)).unwrap();
        assert_eq!(f.scene.release_actor(&actor), ReleaseOutcome::Destroyed);
        assert_eq!(wall.ref_count(), 1);
        assert_eq!(wall.bound_observer_count(), 0);
        assert_eq!(f.scene.cleanup().pending(), 0);
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn test_double_release_panics() {
        let mut f = fixture(SceneConfig::default());
        let wall = asset(f.scene.store(), &f.backend, "wall", 1, AssetKind::Destructible);
        let actor = f.scene.create_actor(&wall, ActorParams::new(AssetKind::Destructible)).unwrap();
        f.scene.release_actor(&actor);
        f.scene.release_actor(&actor);
    }

    #[test]
    fn test_refresh_asset_rebinds_actors() {
        let mut f = fixture(SceneConfig::default());
        let wall = asset(f.scene.store(), &f.backend, "wall", 1, AssetKind::Destructible);
        let actor = f.scene.create_actor(&wall, ActorParams::new(AssetKind::Destructible)).unwrap();
        let before = actor.backend_handle().unwrap();

        let fence = f.scene.refresh_asset(&wall, BackendAssetHandle(2));
        f.executor.drain();
        assert!(fence.wait());

        assert_eq!(actor.state(), ActorState::Bound);
        assert_eq!(actor.bind_generation(), 2);
        assert_ne!(actor.backend_handle(), Some(before));
        assert_eq!(f.backend.actor(actor.backend_handle().unwrap()).unwrap().asset, BackendAssetHandle(2));
        assert_eq!(f.backend.live_actor_count(), 1);
        assert_eq!(wall.ref_count(), 2);
    }

    #[test]
    fn test_clothing_pumped_after_fetch() {
        let mut config = SceneConfig::default();
        config.clothing.lod_decay_time = 1.0;
        let mut f = fixture(config);
        let shirt = asset(f.scene.store(), &f.backend, "shirt", 1, AssetKind::Clothing);
        let id = f.scene.create_clothing(skeleton()).unwrap();
        let piece = f.scene.clothing_mut(id).unwrap().add_piece(&shirt, 0).unwrap();

        for _ in 0..2 {
            f.scene.simulate(0.25);
            f.scene.fetch_results(true);
            f.scene.clothing_mut(id).unwrap().sync_transforms(&pose(0.0), Mat44::IDENTITY);
            f.scene.update_render_resources();
            f.scene.submit_render();
            f.executor.drain();
        }
        let aggregate = f.scene.clothing(id).unwrap();
        assert!(aggregate.piece(piece).unwrap().is_ready());

        f.scene.clothing_mut(id).unwrap().piece_mut(piece).unwrap().set_visible(false);
        f.scene.simulate(0.25);
        f.scene.fetch_results(true);
        let benefit = f.scene.clothing(id).unwrap().piece(piece).unwrap().lod_benefit();
        assert!((benefit - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_shutdown_releases_everything_once() {
        let mut f = fixture(SceneConfig::default());
        let wall = asset(f.scene.store(), &f.backend, "wall", 1, AssetKind::Destructible);
        let shirt = asset(f.scene.store(), &f.backend, "shirt", 2, AssetKind::Clothing);
        f.scene.create_actor(&wall, ActorParams::new(AssetKind::Destructible)).unwrap();
        let id = f.scene.create_clothing(skeleton()).unwrap();
        f.scene.clothing_mut(id).unwrap().add_piece(&shirt, 0).unwrap();
        f.scene.simulate(0.016);
        f.scene.clothing_mut(id).unwrap().sync_transforms(&pose(0.0), Mat44::IDENTITY);
        f.scene.update_render_resources();
        f.scene.submit_render();

        let fence = f.scene.shutdown();
        f.executor.drain();
        assert!(fence.wait());
        assert_eq!(f.scene.cleanup().pending(), 0);
        assert_eq!(f.backend.live_actor_count(), 0);
        assert_eq!(wall.ref_count(), 1);
        assert_eq!(shirt.ref_count(), 1);

        let again = f.scene.shutdown();
        f.executor.drain();
        assert!(again.wait());
        assert!(f.scene.create_clothing(skeleton()).is_err());
    }
}
