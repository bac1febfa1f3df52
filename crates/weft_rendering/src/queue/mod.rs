//! # Render Resource Queue
//!
//! The only legal path by which producer-thread code causes buffers to be
//! created, written or destroyed.
//!
//! ```text
//! Producer                                  Render thread
//! ────────                                  ─────────────
//! post(Write B) ──┬─ merge into pending? ──> (nothing new sent)
//!                 ├─ reuse pooled shape? ──> Resource(req, seq) ─┐
//!                 └─ new request ──────────> Resource(req, seq) ─┤
//!                                                                ▼
//! reclaim_unused()                            drain(): apply, clear in-flight
//!   completed writes -> reuse pool
//!   pool entries idle > N ticks -> freed
//! ```
//!
//! Ordering: the command stream is FIFO, and a write merges only into the
//! newest pending request for its buffer, so per-buffer post order holds.

mod config;
pub(crate) mod request;
pub(crate) mod shared;

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

use bytemuck::Pod;
use weft_core::PoolAllocator;

pub use config::QueueConfig;
pub use request::{PostOutcome, RenderResourceRequest, WriteLayout};

use crate::buffer::{BufferDesc, BufferId, BufferKind};
use crate::handoff::{RenderCommand, RenderSubmitter};
use request::{RequestBody, ResourceRequest};
use shared::QueueShared;

/// Cumulative queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Requests posted.
    pub posted: u64,
    /// Fresh requests queued.
    pub queued: u64,
    /// Writes merged into a pending request.
    pub merged: u64,
    /// Writes that re-armed a pooled request.
    pub reused: u64,
    /// Posts to destroyed buffers.
    pub dropped: u64,
    /// Pool entries freed after going idle.
    pub reclaimed: u64,
}

/// Result of one [`RenderResourceQueue::reclaim_unused`] tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Completed writes moved into the pool.
    pub pooled: usize,
    /// Completed requests discarded.
    pub discarded: usize,
    /// Pool entries freed.
    pub freed: usize,
}

struct PooledWrite {
    target: BufferId,
    layout: WriteLayout,
    request: Arc<ResourceRequest>,
    idle_frames: u32,
}

/// Producer half of the resource queue.
pub struct RenderResourceQueue {
    submitter: RenderSubmitter,
    shared: Arc<QueueShared>,
    pool: PoolAllocator<PooledWrite>,
    /// Buffers this producer asked to destroy.
    retired: HashSet<BufferId>,
    config: QueueConfig,
    next_seq: u64,
    stats: QueueStats,
}

impl RenderResourceQueue {
    /// Creates the producer half on top of a render channel.
    #[must_use]
    pub fn new(submitter: RenderSubmitter, config: QueueConfig) -> Self {
        let shared = Arc::clone(submitter.shared());
        Self {
            submitter,
            shared,
            pool: PoolAllocator::new(config.max_pool_entries.max(1)),
            retired: HashSet::new(),
            config,
            next_seq: 0,
            stats: QueueStats::default(),
        }
    }

    /// The submitter this queue posts through.
    #[must_use]
    pub fn submitter(&self) -> &RenderSubmitter {
        &self.submitter
    }

    /// Allocates a buffer id and posts its creation.
    pub fn create_buffer(&mut self, desc: BufferDesc) -> BufferId {
        let target = self.shared.allocate_buffer_id();
        self.post(RenderResourceRequest::CreateBuffer { target, desc });
        target
    }

    /// Posts a request. Never fails; see [`PostOutcome`].
    pub fn post(&mut self, request: RenderResourceRequest) -> PostOutcome {
        match request {
            RenderResourceRequest::CreateBuffer { target, desc } => {
                self.stats.posted += 1;
                if self.is_destroyed(target) || !self.shared.register(target) {
                    return self.drop_post(target);
                }
                let seq = self.next_seq();
                let request = Arc::new(ResourceRequest::new(target, RequestBody::Create(desc), seq));
                self.enqueue(request, seq);
                self.stats.queued += 1;
                PostOutcome::Queued
            }
            RenderResourceRequest::WriteBuffer { target, layout, payload } => {
                self.post_write(target, layout, Cow::Owned(payload))
            }
        }
    }

    /// Posts a write from borrowed bytes; copies only when a request is queued.
    pub fn write_buffer(&mut self, target: BufferId, layout: WriteLayout, bytes: &[u8]) -> PostOutcome {
        self.post_write(target, layout, Cow::Borrowed(bytes))
    }

    /// Posts a write of `data` starting at element `first`.
    pub fn write_pod<T: Pod>(&mut self, target: BufferId, kind: BufferKind, first: u32, data: &[T]) -> PostOutcome {
        let stride = u32::try_from(std::mem::size_of::<T>()).unwrap_or(u32::MAX);
        let count = u32::try_from(data.len()).unwrap_or(u32::MAX);
        let layout = WriteLayout::new(kind, first, count, stride);
        self.write_buffer(target, layout, bytemuck::cast_slice(data))
    }

    /// Posts destruction of a buffer.
    ///
    /// Work posted earlier still applies first; posts after this call are
    /// dropped.
    pub fn destroy_buffer(&mut self, target: BufferId) {
        if !self.retired.insert(target) {
            return;
        }
        let stale = self.pool.free_where(|entry| entry.target == target).len();
        if stale > 0 {
            tracing::debug!("destroy {:?}: dropped {} pooled", target, stale);
        }
        self.submitter.submit(RenderCommand::Destroy(target));
    }

    fn post_write(&mut self, target: BufferId, layout: WriteLayout, payload: Cow<'_, [u8]>) -> PostOutcome {
        self.stats.posted += 1;
        if self.is_destroyed(target) {
            return self.drop_post(target);
        }

        // Merge into the newest pending request for this buffer, if it is a
        // write of the same shape. Anything older would reorder the buffer.
        let newest = self
            .shared
            .pending()
            .iter()
            .rev()
            .find(|r| r.target() == target && r.is_in_flight())
            .cloned();
        if let Some(newest) = newest {
            if newest.try_merge(&layout, &payload) {
                self.stats.merged += 1;
                tracing::trace!("merged write into pending request for {:?}", target);
                return PostOutcome::Merged;
            }
        }

        if let Some(handle) = self.pool.find(|e| e.target == target && e.layout == layout) {
            if let Some(entry) = self.pool.free(handle) {
                let seq = self.next_seq();
                entry.request.rearm(&payload, seq);
                self.enqueue(entry.request, seq);
                self.stats.reused += 1;
                return PostOutcome::Reused;
            }
        }

        let seq = self.next_seq();
        let body = RequestBody::Write { layout, payload: payload.into_owned() };
        self.enqueue(Arc::new(ResourceRequest::new(target, body, seq)), seq);
        self.stats.queued += 1;
        PostOutcome::Queued
    }

    /// Once-per-tick maintenance on the producer thread.
    ///
    /// Ages the pool and frees entries idle longer than the configured
    /// threshold, then moves completed writes into the pool.
    pub fn reclaim_unused(&mut self) -> ReclaimStats {
        let mut result = ReclaimStats::default();
        let threshold = self.config.reuse_idle_frames;

        for (_, entry) in self.pool.iter_mut() {
            entry.idle_frames += 1;
        }
        result.freed = self.pool.free_where(|entry| entry.idle_frames > threshold).len();

        let completed: Vec<Arc<ResourceRequest>> = {
            let mut pending = self.shared.pending();
            let (done, still): (Vec<_>, Vec<_>) = pending.drain(..).partition(|r| !r.is_in_flight());
            *pending = still;
            done
        };

        for request in completed {
            let target = request.target();
            let layout = request.write_layout();
            match layout {
                Some(layout) if !self.is_destroyed(target) => {
                    let entry = PooledWrite { target, layout, request, idle_frames: 0 };
                    if self.pool.allocate(entry).is_some() {
                        result.pooled += 1;
                    } else {
                        result.discarded += 1;
                    }
                }
                _ => result.discarded += 1,
            }
        }

        // Once the render thread has run the destroy, the shared state answers.
        let shared = &self.shared;
        self.retired.retain(|id| !shared.is_destroyed(*id));

        self.stats.reclaimed += result.freed as u64;
        if result.freed > 0 || result.pooled > 0 {
            tracing::debug!(
                "reclaim: pooled {} discarded {} freed {} (pool {})",
                result.pooled,
                result.discarded,
                result.freed,
                self.pool.allocated_count()
            );
        }
        result
    }

    /// Whether any request for `target` is still in flight.
    #[must_use]
    pub fn has_in_flight(&self, target: BufferId) -> bool {
        self.shared.pending().iter().any(|r| r.target() == target && r.is_in_flight())
    }

    /// In-flight requests for `target`.
    #[must_use]
    pub fn in_flight_for(&self, target: BufferId) -> usize {
        self.shared
            .pending()
            .iter()
            .filter(|r| r.target() == target && r.is_in_flight())
            .count()
    }

    /// Requests posted and not yet reclaimed.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.pending().len()
    }

    /// Buffers created and not yet destroyed on the render thread.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.shared.live_len()
    }

    /// Destroys posted whose execution has not been observed yet.
    #[must_use]
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// Writes sitting in the reuse pool.
    #[must_use]
    pub fn pooled_len(&self) -> usize {
        self.pool.allocated_count()
    }

    /// Cumulative counters.
    #[must_use]
    pub const fn stats(&self) -> QueueStats {
        self.stats
    }

    /// Whether posts to `target` are dropped.
    #[must_use]
    pub fn is_destroyed(&self, target: BufferId) -> bool {
        self.retired.contains(&target) || self.shared.is_destroyed(target)
    }

    fn drop_post(&mut self, target: BufferId) -> PostOutcome {
        self.stats.dropped += 1;
        tracing::debug!("post to destroyed {:?} dropped", target);
        PostOutcome::Dropped
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn enqueue(&mut self, request: Arc<ResourceRequest>, seq: u64) {
        self.shared.pending().push(Arc::clone(&request));
        self.submitter.submit(RenderCommand::Resource { request, seq });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferKind;
    use crate::device::{DeviceOp, DrawSubmission, SoftwareDevice};
    use weft_shared::Mat44;
    use crate::handoff::render_channel;
    use crate::RenderExecutor;

    fn setup() -> (RenderResourceQueue, RenderExecutor<SoftwareDevice>) {
        let (submitter, executor) = render_channel(SoftwareDevice::new());
        (RenderResourceQueue::new(submitter, QueueConfig::default()), executor)
    }

    fn vertex_desc() -> BufferDesc {
        BufferDesc { kind: BufferKind::Vertex, stride: 4, capacity: 4, semantic: None, dynamic: true }
    }

    fn layout() -> WriteLayout {
        WriteLayout::new(BufferKind::Vertex, 0, 1, 4)
    }

    #[test]
    fn test_pending_write_merges() {
        let (mut queue, mut executor) = setup();
        let b = queue.create_buffer(vertex_desc());

        assert_eq!(queue.write_buffer(b, layout(), &[1; 4]), PostOutcome::Queued);
        assert_eq!(queue.write_buffer(b, layout(), &[2; 4]), PostOutcome::Merged);
        assert_eq!(queue.in_flight_for(b), 2); // create + one write

        let stats = executor.drain();
        assert_eq!(stats.written, 1);
        assert_eq!(executor.device().write_count(b), 1);
        assert_eq!(&executor.device().buffer_bytes(b).unwrap()[0..4], &[2; 4]);
    }

    #[test]
    fn test_shape_mismatch_queues_new_request() {
        let (mut queue, mut executor) = setup();
        let b = queue.create_buffer(vertex_desc());

        queue.write_buffer(b, layout(), &[1; 4]);
        let other = WriteLayout::new(BufferKind::Vertex, 1, 1, 4);
        assert_eq!(queue.write_buffer(b, other, &[2; 4]), PostOutcome::Queued);

        assert_eq!(executor.drain().written, 2);
    }

    #[test]
    fn test_merge_never_jumps_a_newer_request() {
        let (mut queue, mut executor) = setup();
        let b = queue.create_buffer(vertex_desc());

        queue.write_buffer(b, layout(), &[1; 4]);
        queue.write_buffer(b, WriteLayout::new(BufferKind::Vertex, 0, 2, 4), &[2; 8]);
        // Newest pending write has a different shape: must not merge backwards.
        assert_eq!(queue.write_buffer(b, layout(), &[3; 4]), PostOutcome::Queued);

        executor.drain();
        assert_eq!(&executor.device().buffer_bytes(b).unwrap()[0..8], &[3, 3, 3, 3, 2, 2, 2, 2]);
    }

    #[test]
    fn test_reuse_pool_lifecycle() {
        let (mut queue, mut executor) = setup();
        let b = queue.create_buffer(vertex_desc());
        queue.write_buffer(b, layout(), &[1; 4]);
        executor.drain();

        let tick = queue.reclaim_unused();
        assert_eq!(tick.pooled, 1);
        assert_eq!(tick.discarded, 1); // the create
        assert_eq!(queue.pooled_len(), 1);

        assert_eq!(queue.write_buffer(b, layout(), &[9; 4]), PostOutcome::Reused);
        assert_eq!(queue.pooled_len(), 0);
        executor.drain();
        assert_eq!(&executor.device().buffer_bytes(b).unwrap()[0..4], &[9; 4]);
    }

    #[test]
    fn test_idle_entries_freed_exactly_once() {
        let (mut queue, mut executor) = setup();
        let b = queue.create_buffer(vertex_desc());
        queue.write_buffer(b, layout(), &[1; 4]);
        executor.drain();

        queue.reclaim_unused(); // enters pool, idle 0
        let threshold = QueueConfig::default().reuse_idle_frames;
        let mut freed = 0;
        for _ in 0..threshold + 3 {
            freed += queue.reclaim_unused().freed;
        }
        assert_eq!(freed, 1);
        assert_eq!(queue.pooled_len(), 0);
        assert_eq!(queue.stats().reclaimed, 1);
    }

    #[test]
    fn test_destroy_runs_after_earlier_work() {
        let (mut queue, mut executor) = setup();
        let b = queue.create_buffer(vertex_desc());
        executor.drain();

        queue.write_pod(b, BufferKind::Vertex, 0, &[42_u32]);
        queue.submitter().run_on_render_thread(move |frame| {
            frame.submit_draw(&DrawSubmission {
                actor: 1,
                vertex_buffer: Some(b),
                index_buffer: None,
                bone_buffer: None,
                element_count: 1,
                lod: 0,
                transform: Mat44::IDENTITY,
                snapshot_generation: 1,
            });
        });
        queue.destroy_buffer(b);
        assert_eq!(queue.write_buffer(b, layout(), &[2; 4]), PostOutcome::Dropped);

        let stats = executor.drain();
        assert_eq!(stats.written, 1);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.destroyed, 1);
        let ops = executor.device().ops();
        let write = ops.iter().position(|op| matches!(op, DeviceOp::Write { id, .. } if *id == b));
        let draw = ops.iter().position(|op| *op == DeviceOp::Draw { actor: 1 });
        let destroy = ops.iter().position(|op| *op == DeviceOp::Destroy(b));
        assert!(write.is_some() && write < draw && draw < destroy, "{ops:?}");
        assert_eq!(executor.device().dangling_draws(), 0);
    }

    #[test]
    fn test_destroy_tracking_stays_bounded() {
        let (mut queue, mut executor) = setup();
        for round in 0..500_u32 {
            let b = queue.create_buffer(vertex_desc());
            queue.write_pod(b, BufferKind::Vertex, 0, &[round]);
            queue.destroy_buffer(b);
            executor.drain();
            queue.reclaim_unused();
            assert!(queue.is_destroyed(b));
        }
        assert_eq!(queue.retired_len(), 0);
        assert_eq!(queue.live_buffers(), 0);
        assert_eq!(queue.pending_len(), 0);
        assert_eq!(executor.device().live_buffers(), 0);
        assert_eq!(executor.totals().written, 500);
    }

    #[test]
    fn test_render_side_destroy_observed_by_producer() {
        let (mut queue, mut executor) = setup();
        let b = queue.create_buffer(vertex_desc());
        executor.drain();

        queue.write_buffer(b, layout(), &[1; 4]);
        assert_eq!(executor.notify_buffer_destroyed(b), 1);
        assert!(!queue.has_in_flight(b));

        assert_eq!(executor.drain().written, 0);
        assert_eq!(queue.write_buffer(b, layout(), &[2; 4]), PostOutcome::Dropped);
        assert_eq!(queue.stats().dropped, 1);
    }

    #[test]
    fn test_write_pod() {
        let (mut queue, mut executor) = setup();
        let b = queue.create_buffer(vertex_desc());
        queue.write_pod(b, BufferKind::Vertex, 2, &[7_u32, 8_u32]);
        executor.drain();
        let bytes = executor.device().buffer_bytes(b).unwrap();
        assert_eq!(bytemuck::cast_slice::<u8, u32>(bytes), &[0, 0, 7, 8]);
    }
}
