//! State both halves of the queue can see.
//!
//! Buffer ids are allocated monotonically and never reused, so "destroyed"
//! is tracked as the complement of the live set below the allocation mark.
//! Memory stays proportional to the buffers alive on the render thread.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::request::ResourceRequest;
use crate::buffer::BufferId;

#[derive(Debug, Default)]
pub(crate) struct QueueShared {
    /// Highest id handed out or registered.
    high_water: AtomicU64,
    /// Ids at or below the mark the render thread has not destroyed.
    live: Mutex<HashSet<BufferId>>,
    /// Requests posted and not yet reclaimed by the producer.
    pending: Mutex<Vec<Arc<ResourceRequest>>>,
}

impl QueueShared {
    pub(crate) fn allocate_buffer_id(&self) -> BufferId {
        let mut live = self.live.lock();
        let id = BufferId(self.high_water.fetch_add(1, Ordering::AcqRel) + 1);
        live.insert(id);
        id
    }

    /// Tracks an id the caller chose. Returns false if it was already destroyed.
    pub(crate) fn register(&self, id: BufferId) -> bool {
        let mut live = self.live.lock();
        if self.is_destroyed_locked(&live, id) {
            return false;
        }
        self.high_water.fetch_max(id.0, Ordering::AcqRel);
        live.insert(id);
        true
    }

    pub(crate) fn is_destroyed(&self, id: BufferId) -> bool {
        let live = self.live.lock();
        self.is_destroyed_locked(&live, id)
    }

    fn is_destroyed_locked(&self, live: &HashSet<BufferId>, id: BufferId) -> bool {
        id.0 <= self.high_water.load(Ordering::Acquire) && !live.contains(&id)
    }

    /// Render thread: records the destruction and cancels every request for
    /// `id` still in flight.
    ///
    /// Returns the number of requests cancelled.
    pub(crate) fn mark_destroyed(&self, id: BufferId) -> usize {
        {
            let mut live = self.live.lock();
            self.high_water.fetch_max(id.0, Ordering::AcqRel);
            live.remove(&id);
        }
        self.pending
            .lock()
            .iter()
            .filter(|r| r.target() == id)
            .filter(|r| r.cancel())
            .count()
    }

    /// Buffers not yet destroyed on the render thread.
    pub(crate) fn live_len(&self) -> usize {
        self.live.lock().len()
    }

    pub(crate) fn pending(&self) -> parking_lot::MutexGuard<'_, Vec<Arc<ResourceRequest>>> {
        self.pending.lock()
    }
}
