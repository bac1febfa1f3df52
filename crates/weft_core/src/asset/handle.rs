//! Asset record, strong references and observer back-references.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use weft_shared::AssetKind;

use super::store::StoreInner;

/// Opaque handle into the simulation backend's asset table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendAssetHandle(pub u64);

/// Receives lifecycle broadcasts for an asset an observer is bound to.
///
/// Back-references are weak; binding never extends the observer's life.
pub trait AssetObserver: Send + Sync {
    /// The asset's backend handle is about to be swapped or dropped.
    fn asset_going_away(&self, asset: &Asset);

    /// The asset has a fresh backend handle.
    fn asset_imported(&self, asset: &Asset);
}

/// Named simulation asset.
pub struct Asset {
    name: String,
    kind: AssetKind,
    original_name: String,
    handle: Mutex<Option<BackendAssetHandle>>,
    refcount: AtomicI32,
    force_resolved: AtomicBool,
    observers: Mutex<Vec<Weak<dyn AssetObserver>>>,
}

impl Asset {
    pub(super) fn new(name: String, kind: AssetKind, original_name: String, handle: BackendAssetHandle) -> Self {
        Self {
            name,
            kind,
            original_name,
            handle: Mutex::new(Some(handle)),
            refcount: AtomicI32::new(0),
            force_resolved: AtomicBool::new(false),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Registry name (case-sensitive, unique per store).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type tag.
    #[must_use]
    pub const fn kind(&self) -> AssetKind {
        self.kind
    }

    /// Import name.
    #[must_use]
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Current backend handle, `None` once destroyed.
    #[must_use]
    pub fn backend_handle(&self) -> Option<BackendAssetHandle> {
        *self.handle.lock()
    }

    /// Live strong references.
    #[must_use]
    pub fn ref_count(&self) -> i32 {
        self.refcount.load(Ordering::Acquire)
    }

    /// Whether named sub-resources have been resolved for the current handle.
    #[must_use]
    pub fn is_force_resolved(&self) -> bool {
        self.force_resolved.load(Ordering::Acquire)
    }

    /// Adds a weak back-reference. Order of binding is broadcast order.
    pub fn bind_observer(&self, observer: Weak<dyn AssetObserver>) {
        let mut observers = self.observers.lock();
        observers.retain(|o| o.strong_count() > 0);
        observers.push(observer);
    }

    /// Removes a back-reference previously bound.
    pub fn unbind_observer(&self, observer: &Weak<dyn AssetObserver>) {
        let target = observer.as_ptr().cast::<()>();
        self.observers
            .lock()
            .retain(|o| o.strong_count() > 0 && o.as_ptr().cast::<()>() != target);
    }

    /// Number of observers still alive.
    #[must_use]
    pub fn bound_observer_count(&self) -> usize {
        self.observers.lock().iter().filter(|o| o.strong_count() > 0).count()
    }

    /// Live observers, upgraded outside the lock so callbacks may rebind.
    pub(super) fn live_observers(&self) -> Vec<Arc<dyn AssetObserver>> {
        self.observers.lock().iter().filter_map(Weak::upgrade).collect()
    }

    pub(super) fn swap_handle(&self, handle: Option<BackendAssetHandle>) -> Option<BackendAssetHandle> {
        std::mem::replace(&mut *self.handle.lock(), handle)
    }

    pub(super) fn set_force_resolved(&self, resolved: bool) {
        self.force_resolved.store(resolved, Ordering::Release);
    }

    pub(super) fn increment(&self) -> i32 {
        self.refcount.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(super) fn decrement(&self) -> i32 {
        let now = self.refcount.fetch_sub(1, Ordering::AcqRel) - 1;
        debug_assert!(now >= 0, "asset {} refcount went negative", self.name);
        now
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("refcount", &self.ref_count())
            .field("handle", &self.backend_handle())
            .finish_non_exhaustive()
    }
}

/// Strong, counted reference to an asset.
///
/// Cloning increments the refcount; dropping decrements it. The last drop
/// destroys the asset synchronously.
pub struct AssetRef {
    asset: Arc<Asset>,
    store: Weak<StoreInner>,
}

impl AssetRef {
    /// Wraps an asset whose refcount the caller has already incremented.
    pub(super) fn adopt(asset: Arc<Asset>, store: Weak<StoreInner>) -> Self {
        Self { asset, store }
    }

    /// The shared asset record.
    #[must_use]
    pub fn asset(&self) -> &Arc<Asset> {
        &self.asset
    }

    /// True if both references point at the same asset.
    #[must_use]
    pub fn same_asset(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.asset, &other.asset)
    }
}

impl Clone for AssetRef {
    fn clone(&self) -> Self {
        // Holding `self` keeps the count above zero, so no store lock is needed.
        self.asset.increment();
        Self { asset: Arc::clone(&self.asset), store: Weak::clone(&self.store) }
    }
}

impl Deref for AssetRef {
    type Target = Asset;

    fn deref(&self) -> &Asset {
        &self.asset
    }
}

impl fmt::Debug for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AssetRef").field(&self.asset.name).finish()
    }
}

impl Drop for AssetRef {
    fn drop(&mut self) {
        match self.store.upgrade() {
            Some(store) => store.release(&self.asset),
            None => {
                self.asset.decrement();
            }
        }
    }
}
