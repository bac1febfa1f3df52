//! # Frame Driver Test
//!
//! Whole ticks against a real render thread: staging, drawing, refresh and
//! teardown with every deferred cleanup accounted for.

use std::sync::Arc;

use weft::core::{CoreError, CoreResult};
use weft::simulation::{ScriptedAsset, ScriptedBackend};
use weft::{
    AssetData, AssetDataProvider, AssetKind, AssetRef, AssetStore, BackendAssetHandle, ClothingId, FetchStatus,
    FrameDriver, FrameDriverConfig, Mat44, SoftwareDevice, Vec3,
};

struct NullProvider;

impl AssetDataProvider for NullProvider {
    fn deserialize(&self, _bytes: &[u8]) -> CoreResult<AssetData> {
        Err(CoreError::Provider { message: "no blobs".into() })
    }

    fn serialize(&self, _handle: BackendAssetHandle) -> CoreResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

struct Rig {
    backend: Arc<ScriptedBackend>,
    store: Arc<AssetStore>,
    driver: FrameDriver<SoftwareDevice>,
}

impl Rig {
    fn new(config: FrameDriverConfig) -> Self {
        let backend = Arc::new(ScriptedBackend::new());
        let store = Arc::new(AssetStore::new(Arc::new(NullProvider)));
        let driver = FrameDriver::new(SoftwareDevice::new(), backend.clone(), store.clone(), config).unwrap();
        Self { backend, store, driver }
    }

    fn cloth(&self, name: &str, handle: u64) -> AssetRef {
        self.define(handle);
        self.store
            .get_or_create(name, || Ok(AssetData::new(AssetKind::Clothing, BackendAssetHandle(handle), name)))
            .unwrap()
    }

    fn define(&self, handle: u64) {
        self.backend.define_asset(
            BackendAssetHandle(handle),
            ScriptedAsset {
                lod_count: 1,
                bone_names: vec!["root".into()],
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z],
                indices: vec![0, 1, 2, 0, 2, 3],
                distance_weight: 1.0,
            },
        );
    }

    fn dress(&mut self, asset: &AssetRef) -> ClothingId {
        let scene = self.driver.scene_mut();
        let clothing = scene.create_clothing(vec!["Root".into()]).unwrap();
        scene.clothing_mut(clothing).unwrap().add_piece(asset, 0).unwrap();
        clothing
    }

    fn run(&mut self, ticks: usize) -> Vec<FetchStatus> {
        (0..ticks)
            .map(|_| {
                self.driver
                    .tick(1.0 / 60.0, |_, aggregate| aggregate.sync_transforms(&[Mat44::IDENTITY], Mat44::IDENTITY))
                    .fetch
            })
            .collect()
    }
}

#[test]
fn test_clothing_drawn_on_render_thread() {
    let mut rig = Rig::new(FrameDriverConfig::default());
    let shirt = rig.cloth("shirt", 1);
    let clothing = rig.dress(&shirt);

    assert!(rig.run(4).iter().all(|status| *status == FetchStatus::Ok));
    let aggregate = rig.driver.scene().clothing(clothing).unwrap();
    assert!(aggregate.pieces().all(weft::simulation::ClothingPiece::is_ready));
    assert_eq!(rig.driver.frame_count(), 4);
    assert_eq!(rig.driver.stats().steps, 4);
    assert!(rig.driver.stats().draws_submitted > 0);
    assert!(rig.driver.wait_render_idle());

    let cleanup = Arc::clone(rig.driver.scene().cleanup());
    let executor = rig.driver.shutdown().unwrap();
    assert!(!executor.device().draws().is_empty());
    assert_eq!(executor.device().live_buffers(), 0);
    assert_eq!(cleanup.pending(), 0);
    assert_eq!(rig.backend.live_actor_count(), 0);
    assert_eq!(shirt.ref_count(), 1);
}

#[test]
fn test_non_blocking_fetch_polls_outstanding_step() {
    let config = FrameDriverConfig { blocking_fetch: false, ..FrameDriverConfig::default() };
    let mut rig = Rig::new(config);
    rig.backend.set_polls_per_step(2);

    let first = rig.driver.tick(0.016, |_, _| {});
    assert!(first.stepped);
    assert_eq!(first.fetch, FetchStatus::Pending);
    assert!(rig.driver.is_step_outstanding());

    let second = rig.driver.tick(0.016, |_, _| {});
    assert!(!second.stepped);
    assert_eq!(second.fetch, FetchStatus::Pending);

    let third = rig.driver.tick(0.016, |_, _| {});
    assert!(!third.stepped);
    assert_eq!(third.fetch, FetchStatus::Ok);
    assert!(!rig.driver.is_step_outstanding());
    assert_eq!(rig.backend.steps(), 1);

    assert!(rig.driver.tick(0.016, |_, _| {}).stepped);
    assert_eq!(rig.driver.stats().pending_fetches, 3);
    drop(rig.driver.shutdown().unwrap());
}

#[test]
fn test_backend_failure_is_reported_and_recovered() {
    let mut rig = Rig::new(FrameDriverConfig::default());
    rig.backend.fail_next_fetch("solver diverged");

    assert_eq!(rig.run(1), vec![FetchStatus::BackendError("backend error: solver diverged".into())]);
    assert_eq!(rig.run(1), vec![FetchStatus::Ok]);
    assert_eq!(rig.driver.stats().backend_errors, 1);
    drop(rig.driver.shutdown().unwrap());
}

#[test]
fn test_refresh_waits_for_render_thread() {
    let mut rig = Rig::new(FrameDriverConfig::default());
    let shirt = rig.cloth("shirt", 1);
    let clothing = rig.dress(&shirt);
    rig.run(3);

    rig.define(2);
    assert!(rig.driver.refresh_asset(&shirt, BackendAssetHandle(2)));
    assert_eq!(shirt.backend_handle(), Some(BackendAssetHandle(2)));

    rig.run(3);
    let aggregate = rig.driver.scene().clothing(clothing).unwrap();
    assert!(aggregate.pieces().all(weft::simulation::ClothingPiece::is_ready));
    assert_eq!(rig.backend.live_actor_count(), 1);

    let executor = rig.driver.shutdown().unwrap();
    assert_eq!(executor.device().live_buffers(), 0);
}
