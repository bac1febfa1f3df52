//! Fixtures shared by the unit tests.

use std::sync::Arc;

use weft_core::{AssetData, AssetDataProvider, AssetRef, AssetStore, BackendAssetHandle, CoreError, CoreResult};
use weft_shared::{AssetKind, Mat44, Vec3};

use crate::backend::{ScriptedAsset, ScriptedBackend};

pub(crate) struct NullProvider;

impl AssetDataProvider for NullProvider {
    fn deserialize(&self, _bytes: &[u8]) -> CoreResult<AssetData> {
        Err(CoreError::Provider { message: "no blobs in tests".into() })
    }

    fn serialize(&self, _handle: BackendAssetHandle) -> CoreResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

pub(crate) fn store() -> Arc<AssetStore> {
    Arc::new(AssetStore::new(Arc::new(NullProvider)))
}

pub(crate) fn scripted_cloth(bones: &[&str]) -> ScriptedAsset {
    ScriptedAsset {
        lod_count: 2,
        bone_names: bones.iter().map(|b| (*b).to_string()).collect(),
        positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
        indices: vec![0, 1, 2],
        distance_weight: 1.0,
    }
}

/// Registers an asset of `kind` on both the backend and the store, resolved.
pub(crate) fn asset(
    store: &AssetStore,
    backend: &ScriptedBackend,
    name: &str,
    handle: u64,
    kind: AssetKind,
) -> AssetRef {
    backend.define_asset(BackendAssetHandle(handle), scripted_cloth(&["root", "spine"]));
    let asset = store
        .get_or_create(name, || Ok(AssetData::new(kind, BackendAssetHandle(handle), name)))
        .unwrap();
    store.pump_force_resolve();
    asset
}

pub(crate) fn skeleton() -> Vec<String> {
    vec!["Root".to_string(), "Spine".to_string()]
}

pub(crate) fn pose(x: f32) -> Vec<Mat44> {
    vec![Mat44::from_translation(Vec3::new(x, 0.0, 0.0)), Mat44::IDENTITY]
}
