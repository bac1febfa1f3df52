//! # Asset Store
//!
//! Registry mapping string names to reference-counted assets.
//!
//! Every fresh asset goes on a pending force-resolve list. The producer
//! thread drains it once per frame (`pump_force_resolve`) so lazily triggered
//! sub-resource lookups resolve on a known thread.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use weft_shared::AssetKind;

use super::{Asset, AssetData, AssetDataProvider, AssetRef, BackendAssetHandle};
use crate::error::{CoreError, CoreResult};

/// Shared state behind an [`AssetStore`]. `AssetRef` points back at it weakly.
pub(crate) struct StoreInner {
    entries: Mutex<HashMap<String, Arc<Asset>>>,
    /// Kinds ever registered per name; survives destruction.
    known_kinds: Mutex<HashMap<String, AssetKind>>,
    pending_force_resolve: Mutex<Vec<Weak<Asset>>>,
    provider: Arc<dyn AssetDataProvider>,
}

impl StoreInner {
    /// Drops one reference. At zero the asset leaves the registry and its
    /// backend handle is released before this returns.
    pub(crate) fn release(&self, asset: &Arc<Asset>) {
        let mut entries = self.entries.lock();
        if asset.decrement() > 0 {
            return;
        }
        let registered = entries
            .get(asset.name())
            .is_some_and(|entry| Arc::ptr_eq(entry, asset));
        if registered {
            entries.remove(asset.name());
        }
        drop(entries);

        if let Some(handle) = asset.swap_handle(None) {
            self.provider.release(handle);
        }
        tracing::info!("Asset destroyed: {} ({})", asset.name(), asset.kind());
    }
}

/// Named asset registry. One per process, constructed explicitly.
pub struct AssetStore {
    inner: Arc<StoreInner>,
}

impl AssetStore {
    /// Creates an empty store backed by `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn AssetDataProvider>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: Mutex::new(HashMap::new()),
                known_kinds: Mutex::new(HashMap::new()),
                pending_force_resolve: Mutex::new(Vec::new()),
                provider,
            }),
        }
    }

    /// The provider this store loads through.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn AssetDataProvider> {
        &self.inner.provider
    }

    /// Looks up an existing asset and takes a reference.
    ///
    /// # Errors
    ///
    /// `NotFound` if no asset is registered under `name`.
    pub fn get(&self, name: &str) -> CoreResult<AssetRef> {
        let entries = self.inner.entries.lock();
        let asset = entries
            .get(name)
            .ok_or_else(|| CoreError::NotFound { name: name.to_string() })?;
        asset.increment();
        Ok(AssetRef::adopt(Arc::clone(asset), Arc::downgrade(&self.inner)))
    }

    /// Takes a reference to `name`, constructing it with `loader` if absent.
    ///
    /// # Errors
    ///
    /// - Whatever `loader` returns
    /// - `TypeMismatch` if the loaded kind disagrees with the kind previously
    ///   registered for `name`
    pub fn get_or_create<F>(&self, name: &str, loader: F) -> CoreResult<AssetRef>
    where
        F: FnOnce() -> CoreResult<AssetData>,
    {
        if let Ok(existing) = self.get(name) {
            return Ok(existing);
        }

        // Load outside the lock; the loader may be slow or re-enter the store.
        let data = loader()?;
        self.insert(name, data)
    }

    /// Like [`get_or_create`](Self::get_or_create), but also checks an
    /// existing entry against `kind`.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if the existing or loaded asset is not of `kind`.
    pub fn get_or_create_kind<F>(&self, name: &str, kind: AssetKind, loader: F) -> CoreResult<AssetRef>
    where
        F: FnOnce() -> CoreResult<AssetData>,
    {
        let asset = self.get_or_create(name, loader)?;
        if asset.kind() != kind {
            return Err(CoreError::TypeMismatch {
                name: name.to_string(),
                expected: kind,
                found: asset.kind(),
            });
        }
        Ok(asset)
    }

    /// Registers an asset decoded from a serialized blob.
    ///
    /// # Errors
    ///
    /// Provider decode errors or `TypeMismatch`.
    pub fn load_from_bytes(&self, name: &str, bytes: &[u8]) -> CoreResult<AssetRef> {
        let provider = Arc::clone(&self.inner.provider);
        self.get_or_create(name, || provider.deserialize(bytes))
    }

    /// Serializes a live asset through the provider.
    ///
    /// # Errors
    ///
    /// `StaleReference` if the asset has no backend handle.
    pub fn export(&self, asset: &Asset) -> CoreResult<Vec<u8>> {
        let handle = asset
            .backend_handle()
            .ok_or_else(|| CoreError::StaleReference { name: asset.name().to_string() })?;
        self.inner.provider.serialize(handle)
    }

    fn insert(&self, name: &str, data: AssetData) -> CoreResult<AssetRef> {
        let mut entries = self.inner.entries.lock();

        // Someone else may have created it while we were loading.
        if let Some(existing) = entries.get(name) {
            existing.increment();
            let existing = Arc::clone(existing);
            drop(entries);
            self.inner.provider.release(data.handle);
            return Ok(AssetRef::adopt(existing, Arc::downgrade(&self.inner)));
        }

        {
            let mut kinds = self.inner.known_kinds.lock();
            match kinds.get(name) {
                Some(&expected) if expected != data.kind => {
                    drop(kinds);
                    drop(entries);
                    self.inner.provider.release(data.handle);
                    return Err(CoreError::TypeMismatch {
                        name: name.to_string(),
                        expected,
                        found: data.kind,
                    });
                }
                Some(_) => {}
                None => {
                    kinds.insert(name.to_string(), data.kind);
                }
            }
        }

        let asset = Arc::new(Asset::new(name.to_string(), data.kind, data.original_name, data.handle));
        asset.increment();
        entries.insert(name.to_string(), Arc::clone(&asset));
        drop(entries);

        self.inner.pending_force_resolve.lock().push(Arc::downgrade(&asset));
        tracing::info!("Asset created: {} ({})", name, asset.kind());

        Ok(AssetRef::adopt(asset, Arc::downgrade(&self.inner)))
    }

    /// Drops a reference. Same as dropping the `AssetRef`.
    pub fn release(&self, asset: AssetRef) {
        drop(asset);
    }

    /// Broadcasts `asset_going_away` to every bound observer.
    ///
    /// Must precede any backend-handle swap so observers see null-then-rebind.
    pub fn notify_going_away(&self, asset: &Asset) {
        let observers = asset.live_observers();
        tracing::info!("Asset going away: {} ({} observers)", asset.name(), observers.len());
        for observer in observers {
            observer.asset_going_away(asset);
        }
    }

    /// Swaps the backend handle in place, keeping identity and refcount.
    ///
    /// Broadcasts going-away first, releases the old handle, re-queues the
    /// asset for force-resolve, then broadcasts import.
    pub fn rebind(&self, asset: &Asset, handle: BackendAssetHandle) {
        self.notify_going_away(asset);

        if let Some(old) = asset.swap_handle(Some(handle)) {
            self.inner.provider.release(old);
        }
        asset.set_force_resolved(false);

        let strong = self.inner.entries.lock().get(asset.name()).cloned();
        if let Some(strong) = strong {
            self.inner.pending_force_resolve.lock().push(Arc::downgrade(&strong));
        }

        for observer in asset.live_observers() {
            observer.asset_imported(asset);
        }
        tracing::info!("Asset rebound: {} -> {:?}", asset.name(), handle);
    }

    /// Resolves every asset queued since the last pump.
    ///
    /// # Returns
    ///
    /// Number of assets resolved.
    pub fn pump_force_resolve(&self) -> usize {
        let pending = std::mem::take(&mut *self.inner.pending_force_resolve.lock());
        let mut resolved = 0;
        for asset in pending.iter().filter_map(Weak::upgrade) {
            if let Some(handle) = asset.backend_handle() {
                self.inner.provider.force_resolve(handle);
                asset.set_force_resolved(true);
                resolved += 1;
            }
        }
        if resolved > 0 {
            tracing::debug!("force-resolved {} assets", resolved);
        }
        resolved
    }

    /// Assets waiting for the next force-resolve pump.
    #[must_use]
    pub fn pending_force_resolve(&self) -> usize {
        self.inner.pending_force_resolve.lock().len()
    }

    /// Whether `name` is currently registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.entries.lock().contains_key(name)
    }

    /// Number of registered assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// True when no asset is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
