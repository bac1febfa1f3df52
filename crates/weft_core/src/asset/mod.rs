//! # Asset Lifetime
//!
//! Named, reference-counted simulation assets.
//!
//! ```text
//! AssetStore ──owns──> Arc<Asset> <──strong── AssetRef (refcount +1 each)
//!                          │
//!                          └──weak──> AssetObserver (bound actors)
//! ```
//!
//! Refcount reaching zero removes the asset from the store and releases its
//! backend handle on the spot. Anything that must keep it alive across a
//! render-thread round trip holds an `AssetRef` inside a cleanup ticket.

mod handle;
mod provider;
mod store;

pub use handle::{Asset, AssetObserver, AssetRef, BackendAssetHandle};
pub use provider::{AssetData, AssetDataProvider};
pub use store::AssetStore;
