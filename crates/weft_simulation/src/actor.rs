//! # Actor
//!
//! One live simulation instance bound to one asset.
//!
//! ## State Machine
//!
//! ```text
//!                  asset going away            asset imported
//!   ┌─────────┐ ──────────────────> ┌─────────┐ ──────────────┐
//!   │  Bound  │                     │ Unbound │               │
//!   └─────────┘ <───────────────────└─────────┘ <─────────────┘
//!        │                               │
//!        │ release, no render ref        │ release
//!        ▼                               ▼
//!   ┌───────────┐   release, render ref   ┌────────────────┐
//!   │ Destroyed │ <────── ticket ──────── │ PendingCleanup │
//!   └───────────┘    finalized at fence   └────────────────┘
//! ```
//!
//! The producer stages a [`RenderContext`] into a double buffer; the render
//! thread only ever reads the last published one.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use bytemuck::Pod;
use parking_lot::Mutex;
use weft_core::{Asset, AssetObserver, AssetRef, CleanupQueue, DoubleBuffer};
use weft_rendering::{
    BufferDesc, BufferId, BufferKind, DrawSubmission, RenderFrame, RenderResourceQueue, RenderSubmitter,
    VertexSemantic,
};
use weft_shared::{AssetKind, Mat44, Vec3};

use crate::backend::{ActorDesc, BackendActorHandle, SimulationBackend};
use crate::error::{SimulationError, SimulationResult};

/// Scene-unique actor identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Shared handle the scene hands out.
pub type ActorHandle = Arc<Actor>;

/// Lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorState {
    /// No backend actor; waiting for the asset to be imported again.
    Unbound,
    /// Backend actor live.
    Bound,
    /// Released while the render thread still held it.
    PendingCleanup,
    /// Gone.
    Destroyed,
}

/// What [`Actor::release`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Destroyed before returning.
    Destroyed,
    /// Handed to a cleanup ticket finalized on the render thread.
    Deferred,
}

/// Render-side view of an actor, published once per update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderContext {
    /// Vertex positions.
    pub vertex_buffer: Option<BufferId>,
    /// Indices.
    pub index_buffer: Option<BufferId>,
    /// Skinning matrices.
    pub bone_buffer: Option<BufferId>,
    /// Elements to draw.
    pub element_count: u32,
    /// Graphical LOD.
    pub lod: u32,
    /// Local-to-world transform.
    pub transform: Mat44,
    /// False until the first update is published.
    pub valid: bool,
}

#[derive(Clone, Copy, Debug)]
struct StreamBuffer {
    id: BufferId,
    capacity: u32,
}

#[derive(Debug, Default)]
struct ActorBuffers {
    vertex: Option<StreamBuffer>,
    index: Option<StreamBuffer>,
    bone: Option<StreamBuffer>,
}

impl ActorBuffers {
    fn take_ids(&mut self) -> Vec<BufferId> {
        [self.vertex.take(), self.index.take(), self.bone.take()]
            .into_iter()
            .flatten()
            .map(|b| b.id)
            .collect()
    }
}

struct ActorInner {
    state: ActorState,
    handle: Option<BackendActorHandle>,
    desc: ActorDesc,
    buffers: ActorBuffers,
    /// Bumped every time a backend actor is bound.
    bind_generation: u64,
}

/// Simulation instance bound to one asset within one scene.
pub struct Actor {
    id: ActorId,
    kind: AssetKind,
    backend: Arc<dyn SimulationBackend>,
    asset: Mutex<Option<AssetRef>>,
    inner: Mutex<ActorInner>,
    snapshot: Arc<DoubleBuffer<RenderContext>>,
    /// Render tasks submitted and not yet run.
    render_refs: AtomicUsize,
    render_dirty: AtomicBool,
    this: Weak<Actor>,
}

impl Actor {
    /// Creates the backend actor, takes `asset` and registers as its observer.
    ///
    /// # Errors
    ///
    /// - `NotReady` if the asset has no backend handle
    /// - `Backend` if the backend refuses the actor
    pub fn create(
        id: ActorId,
        backend: Arc<dyn SimulationBackend>,
        asset: AssetRef,
        desc: ActorDesc,
    ) -> SimulationResult<Arc<Self>> {
        let asset_handle = asset.backend_handle().ok_or_else(|| SimulationError::NotReady {
            reason: format!("asset {} has no backend handle", asset.name()),
        })?;
        let handle = backend.create_actor(asset_handle, &desc)?;
        let kind = asset.kind();
        let asset_name = asset.name().to_string();

        let actor = Arc::new_cyclic(|this| Self {
            id,
            kind,
            backend,
            asset: Mutex::new(Some(asset)),
            inner: Mutex::new(ActorInner {
                state: ActorState::Bound,
                handle: Some(handle),
                desc,
                buffers: ActorBuffers::default(),
                bind_generation: 1,
            }),
            snapshot: DoubleBuffer::new(RenderContext::default()),
            render_refs: AtomicUsize::new(0),
            render_dirty: AtomicBool::new(true),
            this: Weak::clone(this),
        });

        if let Some(asset) = actor.asset.lock().as_ref() {
            asset.bind_observer(actor.observer());
        }
        tracing::info!("{} created from {} ({})", id, asset_name, kind);
        Ok(actor)
    }

    /// Identity.
    #[must_use]
    pub const fn id(&self) -> ActorId {
        self.id
    }

    /// Kind of the bound asset.
    #[must_use]
    pub const fn kind(&self) -> AssetKind {
        self.kind
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ActorState {
        self.inner.lock().state
    }

    /// Whether a backend actor is live.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.state() == ActorState::Bound
    }

    /// Backend actor, if bound.
    #[must_use]
    pub fn backend_handle(&self) -> Option<BackendActorHandle> {
        self.inner.lock().handle
    }

    /// Number of times a backend actor has been bound.
    #[must_use]
    pub fn bind_generation(&self) -> u64 {
        self.inner.lock().bind_generation
    }

    /// Name of the asset held, if any.
    #[must_use]
    pub fn asset_name(&self) -> Option<String> {
        self.asset.lock().as_ref().map(|a| a.name().to_string())
    }

    /// Render tasks in flight.
    #[must_use]
    pub fn render_refs(&self) -> usize {
        self.render_refs.load(Ordering::Acquire)
    }

    /// Whether the render context is stale.
    #[must_use]
    pub fn is_render_dirty(&self) -> bool {
        self.render_dirty.load(Ordering::Acquire)
    }

    /// Flags the render context as stale.
    pub fn mark_render_dirty(&self) {
        self.render_dirty.store(true, Ordering::Release);
    }

    /// Publish generation of the render context.
    #[must_use]
    pub fn snapshot_generation(&self) -> u64 {
        self.snapshot.generation()
    }

    /// Moves the actor.
    ///
    /// The transform is kept for the next rebind either way.
    ///
    /// # Errors
    ///
    /// `StaleReference` if the actor has no backend actor right now.
    pub fn set_transform(&self, transform: Mat44) -> SimulationResult<()> {
        let mut inner = self.inner.lock();
        inner.desc.transform = transform;
        if inner.state != ActorState::Bound {
            return Err(SimulationError::StaleReference(format!("{} is not bound", self.id)));
        }
        self.render_dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Nulls the backend actor; the actor stays inert until reimported.
    pub fn notify_asset_gone(&self) {
        let mut inner = self.inner.lock();
        if inner.state != ActorState::Bound {
            return;
        }
        if let Some(handle) = inner.handle.take() {
            self.backend.release_actor(handle);
        }
        inner.state = ActorState::Unbound;
        tracing::info!("{} unbound", self.id);
    }

    /// Recreates the backend actor from the asset's current handle.
    ///
    /// Returns true if the actor is bound afterwards.
    pub fn notify_asset_import(&self) -> bool {
        let asset_handle = self.asset.lock().as_ref().and_then(|a| a.backend_handle());
        match asset_handle {
            Some(handle) => self.rebind_to(handle),
            None => false,
        }
    }

    fn rebind_to(&self, asset_handle: weft_core::BackendAssetHandle) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            ActorState::Bound => return true,
            ActorState::PendingCleanup | ActorState::Destroyed => return false,
            ActorState::Unbound => {}
        }
        match self.backend.create_actor(asset_handle, &inner.desc) {
            Ok(handle) => {
                inner.handle = Some(handle);
                inner.state = ActorState::Bound;
                inner.bind_generation += 1;
                self.render_dirty.store(true, Ordering::Release);
                tracing::info!("{} rebound to {:?}", self.id, asset_handle);
                true
            }
            Err(err) => {
                tracing::warn!("{} could not rebind: {}", self.id, err);
                false
            }
        }
    }

    /// Stages a render context and posts the buffer work it needs.
    ///
    /// Producer thread. Returns false if nothing was staged.
    pub fn update_render_resources(&self, queue: &mut RenderResourceQueue) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != ActorState::Bound {
            return false;
        }
        let Some(handle) = inner.handle else {
            return false;
        };
        let Some(data) = self.backend.render_data(handle) else {
            tracing::debug!("{} has no render data yet", self.id);
            return false;
        };

        let buffers = &mut inner.buffers;
        let vertex_buffer = write_stream(
            queue,
            &mut buffers.vertex,
            |capacity| {
                BufferDesc::dynamic_of::<Vec3>(BufferKind::Vertex, capacity).with_semantic(VertexSemantic::Position)
            },
            BufferKind::Vertex,
            &data.positions,
        );
        let index_buffer = write_stream(
            queue,
            &mut buffers.index,
            |capacity| BufferDesc::dynamic_of::<u32>(BufferKind::Index, capacity),
            BufferKind::Index,
            &data.indices,
        );
        let bone_buffer = write_stream(
            queue,
            &mut buffers.bone,
            |capacity| BufferDesc::dynamic_of::<Mat44>(BufferKind::Bone, capacity),
            BufferKind::Bone,
            &data.bones,
        );

        let element_count = if data.indices.is_empty() {
            stream_len(&data.positions)
        } else {
            stream_len(&data.indices)
        };

        // Inner stays locked so only one producer stages at a time.
        let mut snapshot = self.snapshot.write_handle();
        *snapshot = RenderContext {
            vertex_buffer,
            index_buffer,
            bone_buffer,
            element_count,
            lod: data.lod,
            transform: data.transform,
            valid: true,
        };
        snapshot.publish();
        drop(inner);

        self.render_dirty.store(false, Ordering::Release);
        true
    }

    /// Issues a draw from the last published render context.
    ///
    /// Render thread. Returns false if nothing has been published yet.
    pub fn render(&self, frame: &mut RenderFrame<'_>) -> bool {
        let snapshot = self.snapshot.read_handle();
        self.draw(frame, &snapshot, snapshot.generation())
    }

    fn draw(&self, frame: &mut RenderFrame<'_>, context: &RenderContext, generation: u64) -> bool {
        if !context.valid {
            return false;
        }
        frame.submit_draw(&DrawSubmission {
            actor: self.id.0,
            vertex_buffer: context.vertex_buffer,
            index_buffer: context.index_buffer,
            bone_buffer: context.bone_buffer,
            element_count: context.element_count,
            lod: context.lod,
            transform: context.transform,
            snapshot_generation: generation,
        });
        true
    }

    /// Queues a draw of the context published so far.
    ///
    /// The context is taken now, so the draw only names buffers whose
    /// creation is already ahead of it in the stream. The actor counts as
    /// held by the render thread until the task runs.
    pub fn submit_render(self: &Arc<Self>, submitter: &RenderSubmitter) -> bool {
        if self.state() != ActorState::Bound {
            return false;
        }
        let (context, generation) = {
            let snapshot = self.snapshot.read_handle();
            ((*snapshot).clone(), snapshot.generation())
        };
        self.render_refs.fetch_add(1, Ordering::AcqRel);
        let actor = Arc::clone(self);
        let submitted = submitter.run_on_render_thread(move |frame| {
            actor.draw(frame, &context, generation);
            actor.render_refs.fetch_sub(1, Ordering::AcqRel);
        });
        if !submitted {
            self.render_refs.fetch_sub(1, Ordering::AcqRel);
        }
        submitted
    }

    /// Releases the actor.
    ///
    /// Buffer destroys are posted behind every draw already queued, so those
    /// draws still find their buffers.
    ///
    /// Destroys it now if no render task holds it; otherwise wraps the
    /// backend actor and the asset reference in a cleanup ticket finalized
    /// on the render thread after every earlier command.
    ///
    /// # Panics
    ///
    /// Panics if the actor was already released.
    pub fn release(&self, queue: &mut RenderResourceQueue, cleanup: &Arc<CleanupQueue>) -> ReleaseOutcome {
        let mut inner = self.inner.lock();
        assert!(
            !matches!(inner.state, ActorState::PendingCleanup | ActorState::Destroyed),
            "{} released twice",
            self.id
        );

        let handle = inner.handle.take();
        for id in inner.buffers.take_ids() {
            queue.destroy_buffer(id);
        }
        let asset = self.asset.lock().take();
        if let Some(asset) = &asset {
            asset.unbind_observer(&self.observer());
        }

        if self.render_refs.load(Ordering::Acquire) == 0 {
            if let Some(handle) = handle {
                self.backend.release_actor(handle);
            }
            inner.state = ActorState::Destroyed;
            drop(inner);
            drop(asset);
            tracing::info!("{} destroyed", self.id);
            return ReleaseOutcome::Destroyed;
        }

        inner.state = ActorState::PendingCleanup;
        drop(inner);

        let backend = Arc::clone(&self.backend);
        let this = Weak::clone(&self.this);
        let ticket = cleanup.issue(self.id.to_string(), asset, move || {
            if let Some(handle) = handle {
                backend.release_actor(handle);
            }
            if let Some(actor) = this.upgrade() {
                actor.inner.lock().state = ActorState::Destroyed;
            }
        });
        queue.submitter().run_on_render_thread(move |_| ticket.finalize());
        tracing::info!("{} pending cleanup ({} render refs)", self.id, self.render_refs());
        ReleaseOutcome::Deferred
    }

    fn observer(&self) -> Weak<dyn AssetObserver> {
        let weak: Weak<dyn AssetObserver> = self.this.clone();
        weak
    }
}

impl AssetObserver for Actor {
    fn asset_going_away(&self, _asset: &Asset) {
        self.notify_asset_gone();
    }

    fn asset_imported(&self, asset: &Asset) {
        if let Some(handle) = asset.backend_handle() {
            self.rebind_to(handle);
        }
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Grows the buffer in `slot` to fit `data` and posts the write.
fn write_stream<T: Pod>(
    queue: &mut RenderResourceQueue,
    slot: &mut Option<StreamBuffer>,
    describe: impl FnOnce(u32) -> BufferDesc,
    kind: BufferKind,
    data: &[T],
) -> Option<BufferId> {
    if data.is_empty() {
        return slot.map(|s| s.id);
    }
    let needed = stream_len(data);
    let id = match *slot {
        Some(stream) if stream.capacity >= needed => stream.id,
        _ => {
            if let Some(old) = slot.take() {
                queue.destroy_buffer(old.id);
            }
            let capacity = needed.checked_next_power_of_two().unwrap_or(needed);
            let id = queue.create_buffer(describe(capacity));
            *slot = Some(StreamBuffer { id, capacity });
            id
        }
    };
    queue.write_pod(id, kind, 0, data);
    Some(id)
}

fn stream_len<T>(data: &[T]) -> u32 {
    u32::try_from(data.len()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScriptedBackend;
    use crate::testing::{asset, scripted_cloth, store};
    use weft_core::BackendAssetHandle;
    use weft_rendering::{render_channel, DeviceOp, QueueConfig, SoftwareDevice};

    fn wall_actor(backend: &Arc<ScriptedBackend>, asset: &AssetRef) -> Arc<Actor> {
        let desc = ActorDesc::new(AssetKind::Destructible, Mat44::IDENTITY);
        Actor::create(ActorId(1), backend.clone(), asset.clone(), desc).unwrap()
    }

    #[test]
    fn test_going_away_then_import_rebinds() {
        let store = store();
        let backend = Arc::new(ScriptedBackend::new());
        let wall = asset(&store, &backend, "wall", 1, AssetKind::Destructible);
        let actor = wall_actor(&backend, &wall);
        assert_eq!(wall.bound_observer_count(), 1);

        store.notify_going_away(&wall);
        assert_eq!(actor.state(), ActorState::Unbound);
        assert_eq!(backend.live_actor_count(), 0);
        assert!(matches!(
            actor.set_transform(Mat44::from_translation(Vec3::X)),
            Err(SimulationError::StaleReference(_))
        ));

        assert!(actor.notify_asset_import());
        assert_eq!(actor.bind_generation(), 2);
        let record = backend.actor(actor.backend_handle().unwrap()).unwrap();
        assert_eq!(record.desc.transform, Mat44::from_translation(Vec3::X));
    }

    #[test]
    fn test_backend_refusal_keeps_refcount() {
        let store = store();
        let backend = Arc::new(ScriptedBackend::new());
        let wall = asset(&store, &backend, "wall", 1, AssetKind::Destructible);
        backend.set_refuse_create(true);
        let desc = ActorDesc::new(AssetKind::Destructible, Mat44::IDENTITY);
        assert!(matches!(
            Actor::create(ActorId(2), backend.clone(), wall.clone(), desc),
            Err(SimulationError::Backend(_))
        ));
        assert_eq!(wall.ref_count(), 1);
        assert_eq!(wall.bound_observer_count(), 0);
    }

    #[test]
    fn test_render_reads_only_published_snapshot() {
        let store = store();
        let backend = Arc::new(ScriptedBackend::new());
        let wall = asset(&store, &backend, "wall", 1, AssetKind::Destructible);
        let actor = wall_actor(&backend, &wall);
        let (submitter, mut executor) = render_channel(SoftwareDevice::new());
        let mut queue = RenderResourceQueue::new(submitter.clone(), QueueConfig::default());

        assert!(actor.submit_render(&submitter));
        executor.drain();
        assert!(executor.device().draws().is_empty());
        assert_eq!(actor.render_refs(), 0);

        assert!(actor.is_render_dirty());
        assert!(actor.update_render_resources(&mut queue));
        assert!(!actor.is_render_dirty());
        assert!(actor.submit_render(&submitter));
        executor.drain();

        let draw = &executor.device().draws()[0];
        assert_eq!(draw.element_count, 3);
        assert_eq!(draw.snapshot_generation, 1);
        let vertex = draw.vertex_buffer.unwrap();
        assert_eq!(executor.device().buffer_desc(vertex).unwrap().capacity, 4);
    }

    #[test]
    fn test_queued_draw_keeps_buffers_across_regrowth() {
        let store = store();
        let backend = Arc::new(ScriptedBackend::new());
        let wall = asset(&store, &backend, "wall", 1, AssetKind::Destructible);
        let actor = wall_actor(&backend, &wall);
        let (submitter, mut executor) = render_channel(SoftwareDevice::new());
        let mut queue = RenderResourceQueue::new(submitter.clone(), QueueConfig::default());

        assert!(actor.update_render_resources(&mut queue));
        assert!(actor.submit_render(&submitter));

        let mut grown = scripted_cloth(&["root", "spine"]);
        grown.positions = vec![Vec3::Z; 9];
        grown.indices = (0..9).collect();
        backend.define_asset(BackendAssetHandle(1), grown);
        assert!(actor.update_render_resources(&mut queue));
        assert!(actor.submit_render(&submitter));
        executor.drain();

        let device = executor.device();
        assert_eq!(device.dangling_draws(), 0);
        let first = device.draws()[0].vertex_buffer.unwrap();
        let second = device.draws()[1].vertex_buffer.unwrap();
        assert_ne!(first, second);
        assert_eq!(device.draws()[1].element_count, 9);

        let ops = device.ops();
        let at = |wanted: &DeviceOp| ops.iter().position(|op| op == wanted).unwrap();
        let draws: Vec<_> = ops
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, DeviceOp::Draw { .. }))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(draws.len(), 2);
        assert!(at(&DeviceOp::Create(first)) < draws[0]);
        assert!(draws[0] < at(&DeviceOp::Destroy(first)));
        assert!(at(&DeviceOp::Create(second)) < draws[1]);
        assert_eq!(device.buffer_desc(second).unwrap().capacity, 16);
    }

    #[test]
    fn test_growing_stream_replaces_buffer() {
        let mut queue = {
            let (submitter, _executor) = render_channel(SoftwareDevice::new());
            RenderResourceQueue::new(submitter, QueueConfig::default())
        };
        let mut slot = None;
        let describe = |capacity| BufferDesc::dynamic_of::<u32>(BufferKind::Index, capacity);
        let first = write_stream(&mut queue, &mut slot, describe, BufferKind::Index, &[1_u32, 2]).unwrap();
        let same = write_stream(&mut queue, &mut slot, describe, BufferKind::Index, &[3_u32]).unwrap();
        assert_eq!(first, same);
        let grown = write_stream(&mut queue, &mut slot, describe, BufferKind::Index, &[0_u32; 5]).unwrap();
        assert_ne!(first, grown);
        assert!(queue.is_destroyed(first));
        assert_eq!(slot.map(|s| s.capacity), Some(8));
    }
}
