//! # Deferred Cleanup
//!
//! A native handle that the render thread may still touch cannot be released
//! from the producer thread. It is wrapped in a [`CleanupTicket`] that rides
//! the render-thread command stream behind every command that could use it,
//! and is finalized there.
//!
//! The pending counter is the only state both threads mutate. It goes up once
//! per ticket issued and down once per ticket finalized.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::asset::AssetRef;

/// Process-wide bookkeeping for deferred releases.
#[derive(Debug, Default)]
pub struct CleanupQueue {
    pending: AtomicUsize,
    issued_total: AtomicU64,
    finalized_total: AtomicU64,
}

impl CleanupQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Issues a ticket.
    ///
    /// # Arguments
    ///
    /// * `label` - Name used in diagnostics
    /// * `asset` - Asset reference dropped when the ticket finalizes
    /// * `release` - Releases the native handle
    #[must_use]
    pub fn issue<F>(self: &Arc<Self>, label: impl Into<String>, asset: Option<AssetRef>, release: F) -> CleanupTicket
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.issued_total.fetch_add(1, Ordering::Relaxed);
        let label = label.into();
        tracing::trace!("cleanup ticket issued: {}", label);

        CleanupTicket {
            label,
            release: Some(Box::new(release)),
            asset,
            queue: Arc::clone(self),
        }
    }

    /// Tickets issued but not yet finalized.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// True when no ticket is outstanding.
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Total tickets ever issued.
    #[must_use]
    pub fn issued_total(&self) -> u64 {
        self.issued_total.load(Ordering::Relaxed)
    }

    /// Total tickets ever finalized.
    #[must_use]
    pub fn finalized_total(&self) -> u64 {
        self.finalized_total.load(Ordering::Relaxed)
    }
}

/// Deferred-release record for one native handle.
///
/// Finalizing (or dropping) the ticket runs the release, drops the held asset
/// reference and decrements the pending counter, exactly once.
pub struct CleanupTicket {
    label: String,
    release: Option<Box<dyn FnOnce() + Send>>,
    asset: Option<AssetRef>,
    queue: Arc<CleanupQueue>,
}

impl CleanupTicket {
    /// Diagnostic label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Finalizes the ticket. Call from the render thread at a fence.
    pub fn finalize(self) {}
}

impl fmt::Debug for CleanupTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupTicket")
            .field("label", &self.label)
            .field("holds_asset", &self.asset.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for CleanupTicket {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        // Asset refcount drops after the handle that used it is gone.
        drop(self.asset.take());
        self.queue.pending.fetch_sub(1, Ordering::AcqRel);
        self.queue.finalized_total.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("cleanup ticket finalized: {}", self.label);
    }
}
