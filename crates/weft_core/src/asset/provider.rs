//! Seam to the external asset import pipeline.

use weft_shared::AssetKind;

use super::BackendAssetHandle;
use crate::error::CoreResult;

/// What the provider hands back for one asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetData {
    /// Type tag.
    pub kind: AssetKind,
    /// Opaque simulation-backend handle.
    pub handle: BackendAssetHandle,
    /// Name the asset was imported under, distinct from its registry name.
    pub original_name: String,
}

impl AssetData {
    /// Convenience constructor.
    #[must_use]
    pub fn new(kind: AssetKind, handle: BackendAssetHandle, original_name: impl Into<String>) -> Self {
        Self { kind, handle, original_name: original_name.into() }
    }
}

/// Opaque source of compiled simulation data.
///
/// Encoding and versioning are the provider's concern. The store only needs
/// a type tag and a handle back.
pub trait AssetDataProvider: Send + Sync {
    /// Decodes a parameter blob.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Provider` if the blob cannot be decoded.
    fn deserialize(&self, bytes: &[u8]) -> CoreResult<AssetData>;

    /// Encodes the data behind a live handle.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Provider` if the handle cannot be encoded.
    fn serialize(&self, handle: BackendAssetHandle) -> CoreResult<Vec<u8>>;

    /// Resolves named sub-resources of a freshly created asset.
    fn force_resolve(&self, _handle: BackendAssetHandle) {}

    /// Releases a handle whose asset was destroyed or rebound.
    fn release(&self, _handle: BackendAssetHandle) {}
}
