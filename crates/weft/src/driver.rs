//! # WEFT Frame Driver
//!
//! One producer tick against a render thread spawned at construction:
//! ```text
//! Tick N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. SIMULATE                                                         │
//! │    └─ Scene::simulate(dt) kicks the backend step                    │
//! │                                                                     │
//! │ 2. FETCH                                                            │
//! │    ├─ Scene::fetch_results(blocking)                                │
//! │    └─ Pending leaves the step outstanding; next tick only polls     │
//! │                                                                     │
//! │ 3. SYNC                                                             │
//! │    └─ Host callback per aggregate: sync_transforms(bones, l2w)      │
//! │                                                                     │
//! │ 4. STAGE                                                            │
//! │    └─ Scene::update_render_resources() posts buffer writes          │
//! │                                                                     │
//! │ 5. SUBMIT                                                           │
//! │    └─ Scene::submit_render() enqueues draw tasks                    │
//! └─────────────────────────────────────────────────────────────────────┘
//!                           │ commands
//!                           ▼
//!                ┌─────────────────────┐
//!                │  weft-render thread │
//!                └─────────────────────┘
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use weft_core::{AssetRef, AssetStore, BackendAssetHandle, CleanupQueue};
use weft_rendering::{render_channel, RenderDevice, RenderExecutor, RenderThread};
use weft_simulation::{
    ClothingAggregate, ClothingId, FetchStatus, Scene, SceneConfig, SimulationBackend, SimulationError,
};

/// Frame budget for 60 ticks per second.
pub const TARGET_FRAME_TIME: Duration = Duration::from_micros(16_666);

/// Errors raised while starting or stopping a driver.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The scene refused its configuration.
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// The render thread could not be started.
    #[error("failed to spawn render thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The render thread panicked.
    #[error("render thread panicked")]
    RenderThreadPanicked,

    /// Deferred cleanups were still outstanding after the render thread exited.
    #[error("{pending} cleanups still pending at shutdown")]
    CleanupPending {
        /// Tickets issued but never finalized.
        pending: usize,
    },
}

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Driver configuration.
///
/// ```toml
/// blocking_fetch = false
/// shutdown_timeout_ms = 2000
///
/// [scene.clothing]
/// lod_decay_time = 2.0
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameDriverConfig {
    /// Scene built by the driver.
    pub scene: SceneConfig,
    /// Wait for the backend step inside each tick.
    pub blocking_fetch: bool,
    /// How long fences are waited on before giving up.
    pub shutdown_timeout_ms: u64,
    /// Ticks longer than this are logged. Zero disables the check.
    pub frame_budget_us: u64,
}

impl Default for FrameDriverConfig {
    fn default() -> Self {
        Self {
            scene: SceneConfig::default(),
            blocking_fetch: true,
            shutdown_timeout_ms: 5_000,
            frame_budget_us: u64::try_from(TARGET_FRAME_TIME.as_micros()).unwrap_or(u64::MAX),
        }
    }
}

impl FrameDriverConfig {
    /// Parses a config from TOML text. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// `Config` on malformed input, `Simulation` if the scene section is out
    /// of range.
    pub fn from_toml_str(text: &str) -> DriverResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| DriverError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks ranges.
    ///
    /// # Errors
    ///
    /// The first bad field.
    pub fn validate(&self) -> DriverResult<()> {
        if self.shutdown_timeout_ms == 0 {
            return Err(DriverError::Config("shutdown_timeout_ms must be > 0".to_string()));
        }
        self.scene.validate()?;
        Ok(())
    }

    /// Fence wait limit.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Timing and counts for one tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameStats {
    /// Tick number.
    pub frame: u64,
    /// Outcome of the fetch.
    pub fetch: FetchStatus,
    /// Whether this tick started a new step.
    pub stepped: bool,
    /// Actors whose render resources were staged.
    pub actors_updated: usize,
    /// Draw tasks enqueued.
    pub draws_submitted: usize,
    /// Simulate plus fetch, in microseconds.
    pub simulate_us: u64,
    /// Host sync callbacks, in microseconds.
    pub sync_us: u64,
    /// Staging plus submission, in microseconds.
    pub render_us: u64,
    /// Whole tick, in microseconds.
    pub total_us: u64,
}

/// Accumulator for tick statistics.
#[derive(Clone, Debug)]
pub struct FrameStatsAccumulator {
    /// Ticks recorded.
    pub frames_recorded: u64,
    /// Ticks that started a step.
    pub steps: u64,
    /// Ticks whose fetch came back pending.
    pub pending_fetches: u64,
    /// Ticks whose backend step failed.
    pub backend_errors: u64,
    /// Sum of tick times.
    pub total_us_sum: u64,
    /// Fastest tick.
    pub min_frame_us: u64,
    /// Slowest tick.
    pub max_frame_us: u64,
    /// Ticks over the configured budget.
    pub frames_over_budget: u64,
    /// Draw tasks enqueued across all ticks.
    pub draws_submitted: u64,
}

impl FrameStatsAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frames_recorded: 0,
            steps: 0,
            pending_fetches: 0,
            backend_errors: 0,
            total_us_sum: 0,
            min_frame_us: u64::MAX,
            max_frame_us: 0,
            frames_over_budget: 0,
            draws_submitted: 0,
        }
    }

    /// Records one tick against `budget_us` (zero disables the budget).
    pub fn record(&mut self, stats: &FrameStats, budget_us: u64) {
        self.frames_recorded += 1;
        self.steps += u64::from(stats.stepped);
        match stats.fetch {
            FetchStatus::Ok => {}
            FetchStatus::Pending => self.pending_fetches += 1,
            FetchStatus::BackendError(_) => self.backend_errors += 1,
        }
        self.total_us_sum += stats.total_us;
        self.min_frame_us = self.min_frame_us.min(stats.total_us);
        self.max_frame_us = self.max_frame_us.max(stats.total_us);
        if budget_us > 0 && stats.total_us > budget_us {
            self.frames_over_budget += 1;
        }
        self.draws_submitted += stats.draws_submitted as u64;
    }

    /// Average tick time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_frame_ms(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        (self.total_us_sum as f64 / self.frames_recorded as f64) / 1000.0
    }
}

impl Default for FrameStatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives a [`Scene`] against a render thread it owns.
///
/// Dropping the driver shuts the scene down without waiting; call
/// [`shutdown`](Self::shutdown) to wait for every deferred cleanup and get
/// the device back.
pub struct FrameDriver<D: RenderDevice + 'static> {
    // Dropped before the render thread so the command stream closes.
    scene: Scene,
    render: RenderThread<D>,
    config: FrameDriverConfig,
    frame: u64,
    step_outstanding: bool,
    stats: FrameStatsAccumulator,
}

impl<D: RenderDevice + 'static> FrameDriver<D> {
    /// Builds a scene over `backend` and `store` and spawns the render
    /// thread that owns `device`.
    ///
    /// # Errors
    ///
    /// - `Config` / `Simulation` if the configuration is out of range
    /// - `Spawn` if the render thread cannot be started
    pub fn new(
        device: D,
        backend: Arc<dyn SimulationBackend>,
        store: Arc<AssetStore>,
        config: FrameDriverConfig,
    ) -> DriverResult<Self> {
        config.validate()?;
        let (submitter, executor) = render_channel(device);
        let scene = Scene::new(backend, store, CleanupQueue::new(), submitter, config.scene.clone())?;
        let render = executor.spawn()?;
        tracing::info!("FrameDriver started (blocking_fetch: {})", config.blocking_fetch);
        Ok(Self { scene, render, config, frame: 0, step_outstanding: false, stats: FrameStatsAccumulator::new() })
    }

    /// Runs one tick.
    ///
    /// `sync` is called once per clothing aggregate after a completed fetch,
    /// which is where the host calls
    /// [`ClothingAggregate::sync_transforms`]. A tick that finds the previous
    /// step still outstanding only polls it; `dt` is not simulated.
    pub fn tick<F>(&mut self, dt: f32, mut sync: F) -> FrameStats
    where
        F: FnMut(ClothingId, &mut ClothingAggregate),
    {
        let start = Instant::now();
        let stepped = !self.step_outstanding;
        if stepped {
            self.scene.simulate(dt);
        }
        let fetch = self.scene.fetch_results(self.config.blocking_fetch);
        self.step_outstanding = fetch == FetchStatus::Pending;
        if let FetchStatus::BackendError(message) = &fetch {
            tracing::warn!("tick {}: backend step failed: {}", self.frame, message);
        }
        let simulated = start.elapsed();

        if !self.step_outstanding {
            for (id, aggregate) in self.scene.clothing_iter_mut() {
                sync(id, aggregate);
            }
        }
        let synced = start.elapsed();

        let actors_updated = self.scene.update_render_resources();
        let draws_submitted = self.scene.submit_render();
        let total = start.elapsed();

        let stats = FrameStats {
            frame: self.frame,
            fetch,
            stepped,
            actors_updated,
            draws_submitted,
            simulate_us: micros(simulated),
            sync_us: micros(synced.saturating_sub(simulated)),
            render_us: micros(total.saturating_sub(synced)),
            total_us: micros(total),
        };
        if self.config.frame_budget_us > 0 && stats.total_us > self.config.frame_budget_us {
            tracing::warn!(
                "tick {} exceeded budget: {}us (budget {}us)",
                self.frame,
                stats.total_us,
                self.config.frame_budget_us
            );
        }
        tracing::trace!(
            "tick {}: {:?}, {} actors staged, {} draws",
            self.frame,
            stats.fetch,
            actors_updated,
            draws_submitted
        );
        self.stats.record(&stats, self.config.frame_budget_us);
        self.frame += 1;
        stats
    }

    /// Rebinds `asset` to `handle` and waits for the render thread to pass
    /// every cleanup issued before the swap.
    ///
    /// Returns false if the wait timed out.
    pub fn refresh_asset(&mut self, asset: &AssetRef, handle: BackendAssetHandle) -> bool {
        let mut fence = self.scene.refresh_asset(asset, handle);
        let flushed = fence.wait_timeout(self.config.shutdown_timeout());
        if !flushed {
            tracing::warn!("refresh of {} timed out waiting for the render thread", asset.name());
        }
        flushed
    }

    /// Blocks until the render thread has executed everything posted so far.
    ///
    /// Returns false if the wait timed out.
    pub fn wait_render_idle(&self) -> bool {
        let mut fence = self.scene.queue().submitter().fence();
        fence.wait_timeout(self.config.shutdown_timeout())
    }

    /// Tears the scene down, waits for every deferred cleanup and joins the
    /// render thread.
    ///
    /// # Errors
    ///
    /// - `RenderThreadPanicked` if the render thread did not exit cleanly
    /// - `CleanupPending` if tickets were never finalized
    pub fn shutdown(self) -> DriverResult<RenderExecutor<D>> {
        let Self { mut scene, render, config, frame, stats, .. } = self;

        let mut fence = scene.shutdown();
        if !fence.wait_timeout(config.shutdown_timeout()) {
            tracing::warn!("shutdown fence not reached within {}ms", config.shutdown_timeout_ms);
        }
        let cleanup = Arc::clone(scene.cleanup());
        drop(scene);

        let executor = render.join().ok_or(DriverError::RenderThreadPanicked)?;
        let pending = cleanup.pending();
        tracing::info!(
            "FrameDriver stopped after {} ticks ({} steps, avg {:.3}ms, {} over budget)",
            frame,
            stats.steps,
            stats.avg_frame_ms(),
            stats.frames_over_budget
        );
        if pending > 0 {
            return Err(DriverError::CleanupPending { pending });
        }
        Ok(executor)
    }

    /// The scene.
    #[must_use]
    pub const fn scene(&self) -> &Scene {
        &self.scene
    }

    /// The scene, mutably.
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Ticks run so far.
    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Whether a step is waiting on a non-blocking fetch.
    #[must_use]
    pub const fn is_step_outstanding(&self) -> bool {
        self.step_outstanding
    }

    /// Accumulated statistics.
    #[must_use]
    pub const fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &FrameDriverConfig {
        &self.config
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = FrameDriverConfig::from_toml_str("").unwrap();
        assert_eq!(config, FrameDriverConfig::default());
        assert!(config.blocking_fetch);
        assert_eq!(config.frame_budget_us, 16_666);
    }

    #[test]
    fn test_config_nested_scene() {
        let config = FrameDriverConfig::from_toml_str(
            r"
            blocking_fetch = false
            frame_budget_us = 0

            [scene.queue]
            reuse_idle_frames = 5

            [scene.clothing]
            lod_decay_time = 2.0
            ",
        )
        .unwrap();
        assert!(!config.blocking_fetch);
        assert_eq!(config.scene.queue.reuse_idle_frames, 5);
        assert!((config.scene.clothing.lod_decay_time - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(matches!(FrameDriverConfig::from_toml_str("shutdown_timeout_ms = 0"), Err(DriverError::Config(_))));
        assert!(matches!(
            FrameDriverConfig::from_toml_str("[scene.queue]\nmax_pool_entries = 0"),
            Err(DriverError::Simulation(_))
        ));
        assert!(matches!(FrameDriverConfig::from_toml_str("blocking_fetch = 3"), Err(DriverError::Config(_))));
    }

    #[test]
    fn test_accumulator() {
        let mut acc = FrameStatsAccumulator::new();
        let mut stats = FrameStats {
            frame: 0,
            fetch: FetchStatus::Ok,
            stepped: true,
            actors_updated: 2,
            draws_submitted: 3,
            simulate_us: 10,
            sync_us: 0,
            render_us: 10,
            total_us: 100,
        };
        acc.record(&stats, 50);
        stats.fetch = FetchStatus::Pending;
        stats.stepped = false;
        stats.total_us = 20;
        acc.record(&stats, 50);

        assert_eq!(acc.frames_recorded, 2);
        assert_eq!(acc.steps, 1);
        assert_eq!(acc.pending_fetches, 1);
        assert_eq!(acc.frames_over_budget, 1);
        assert_eq!(acc.min_frame_us, 20);
        assert_eq!(acc.max_frame_us, 100);
        assert_eq!(acc.draws_submitted, 6);
        assert!((acc.avg_frame_ms() - 0.06).abs() < 1e-9);
    }
}
