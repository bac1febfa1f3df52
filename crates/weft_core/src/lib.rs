//! # WEFT Core
//!
//! Lifetime services shared by the producer thread and the render thread:
//! - Named, reference-counted assets with weak actor back-references
//! - Deferred cleanup tickets finalized at render-thread fences
//! - Double-buffered snapshots (writer never disturbs the reader)
//! - A generational pool allocator for short-lived reusable records
//!
//! ## Architecture Rules
//!
//! 1. **Services are constructed explicitly** - no ambient globals
//! 2. **Back-references are weak** - only `AssetRef` extends an asset's life
//! 3. **Counters shared across threads are atomics** - never check-then-act
//!
//! ## Example
//!
//! ```rust,ignore
//! use weft_core::{AssetStore, AssetData};
//!
//! let store = AssetStore::new(provider);
//! let cloth = store.get_or_create("cloth_a", || Ok(data))?;
//! assert_eq!(cloth.ref_count(), 1);
//! drop(cloth); // refcount 0, destroyed synchronously
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod asset;
pub mod error;
pub mod memory;
pub mod sync;

pub use asset::{
    Asset, AssetData, AssetDataProvider, AssetObserver, AssetRef, AssetStore,
    BackendAssetHandle,
};
pub use error::{CoreError, CoreResult};
pub use memory::{PoolAllocator, PoolHandle};
pub use sync::{CleanupQueue, CleanupTicket, DoubleBuffer, ReadHandle, WriteHandle};
