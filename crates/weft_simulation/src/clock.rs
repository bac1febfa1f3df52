//! Scene-wide counters read by actors and clothing pieces.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Simulation tick counter and id source shared by one scene.
#[derive(Debug, Default)]
pub struct SceneClock {
    simulate_count: AtomicU64,
    next_actor_id: AtomicU64,
    clothing_paused: AtomicBool,
}

impl SceneClock {
    /// Number of `simulate` calls so far.
    #[inline]
    #[must_use]
    pub fn simulate_count(&self) -> u64 {
        self.simulate_count.load(Ordering::Acquire)
    }

    /// Whether the current step skips clothing updates.
    #[inline]
    #[must_use]
    pub fn clothing_paused(&self) -> bool {
        self.clothing_paused.load(Ordering::Acquire)
    }

    pub(crate) fn advance(&self, clothing_paused: bool) -> u64 {
        self.clothing_paused.store(clothing_paused, Ordering::Release);
        self.simulate_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn next_actor_id(&self) -> u64 {
        self.next_actor_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}
