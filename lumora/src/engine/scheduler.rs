//! The frame loop.
//!
//! [`FrameScheduler`] owns the async runtime, the asset registry, the scene graph and the
//! orchestrator. Each [`tick`](FrameScheduler::tick) advances the scene and renders one
//! frame. Nothing in a tick waits on an asset or a pipeline build; whatever isn't ready
//! yet is skipped or replaced by a fallback until a later frame.

use crate::assets::{AssetId, AssetRegistry, RegistryStats};
use crate::config::EngineConfig;
use crate::gpu::GpuDevice;
use crate::rendering::cache::AssetCache;
use crate::rendering::{
    FrameReport, RenderError, RenderOrchestrator, Renderer, register_builtin_shaders,
};
use crate::scene::SceneGraph;
use crate::utils::FrameCounter;
use futures::Future;
use futures::future::join_all;
use itertools::Itertools;
use log::{debug, info, warn};
use snafu::{ResultExt, Snafu, ensure};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use web_time::Instant;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)), visibility(pub(crate)))]
pub enum SchedulerError {
    #[snafu(display("Failed to start the async runtime: {source}"))]
    Runtime { source: std::io::Error },

    #[snafu(display("Assets were never prepared, call prepare() before the first tick"))]
    NotPrepared,

    #[snafu(display("{source}"))]
    Render { source: RenderError },
}

/// Totals over every frame a scheduler rendered.
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    pub frames: u64,
    pub draws: u64,
    pub cameras_pending: u64,
    pub cameras_skipped: u64,
    counter: FrameCounter,
}

impl FrameStats {
    fn record(&mut self, report: &FrameReport, delta: Duration) {
        self.frames += 1;
        self.draws += report.draws as u64;
        self.cameras_pending += report.cameras_pending as u64;
        self.cameras_skipped += report.cameras_skipped as u64;
        self.counter.new_frame_from_duration(delta);
    }

    /// Frames per second, averaged over the last 60 frames.
    pub fn fps(&self) -> u32 {
        self.counter.fps()
    }

    pub fn mean_delta_time(&self) -> f32 {
        self.counter.mean_delta_time()
    }
}

/// Stops a running [`FrameScheduler::run`] from anywhere.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct FrameScheduler {
    config: EngineConfig,
    runtime: Runtime,
    registry: Arc<AssetRegistry>,
    orchestrator: RenderOrchestrator,
    graph: SceneGraph,
    stats: FrameStats,
    prepared: bool,
    stop: StopHandle,
}

impl FrameScheduler {
    pub fn new(config: EngineConfig, device: Arc<dyn GpuDevice>) -> Result<Self, SchedulerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("lumora-worker")
            .enable_all()
            .build()
            .context(RuntimeErr)?;

        let registry = Arc::new(AssetRegistry::new());
        register_builtin_shaders(&registry);

        let cache = AssetCache::new(device, registry.clone(), &config)
            .context(crate::rendering::GpuErr)
            .context(RenderErr)?
            .with_runtime(runtime.handle().clone());
        let orchestrator = RenderOrchestrator::new(Arc::new(cache), &config);

        info!(
            "[Scheduler] Started with {} worker thread(s)",
            config.worker_threads.max(1)
        );

        Ok(Self {
            config,
            runtime,
            registry,
            orchestrator,
            graph: SceneGraph::new(),
            stats: FrameStats::default(),
            prepared: false,
            stop: StopHandle::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AssetRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<AssetCache> {
        self.orchestrator.cache()
    }

    pub fn runtime(&self) -> Handle {
        self.runtime.handle().clone()
    }

    pub fn orchestrator(&self) -> &RenderOrchestrator {
        &self.orchestrator
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn add_renderer(&mut self, renderer: Arc<dyn Renderer>) {
        self.orchestrator.add_renderer(renderer);
    }

    /// Runs a future to completion on the scheduler's runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn assets_to_prepare(&self) -> Vec<AssetId> {
        self.graph
            .collect_assets()
            .into_iter()
            .chain(self.orchestrator.renderer_assets())
            .unique()
            .collect()
    }

    /// Loads everything the scene and the renderers need, and waits for it.
    ///
    /// Assets that fail stay failed and are drawn with fallbacks where possible.
    pub fn prepare(&mut self) -> RegistryStats {
        let ids = self.assets_to_prepare();
        debug!("[Scheduler] Preparing {} asset(s)", ids.len());

        let stats = self.runtime.block_on(self.registry.prepare_ids(&ids));
        self.prepared = true;

        info!(
            "[Scheduler] Prepared assets: {} ready, {} failed, {} unloaded",
            stats.ready, stats.failed, stats.unloaded
        );
        stats
    }

    /// Starts loading everything the scene and the renderers need without waiting for it.
    ///
    /// Frames can be ticked right away. Until the loads finish, whatever depends on them is
    /// skipped.
    pub fn prepare_in_background(&mut self) -> JoinHandle<RegistryStats> {
        let ids = self.assets_to_prepare();
        debug!("[Scheduler] Preparing {} asset(s) in the background", ids.len());

        let tasks = ids
            .iter()
            .filter_map(|id| {
                let asset = self.registry.get(id);
                if asset.is_none() {
                    warn!("[Scheduler] Asked to prepare unknown asset \"{id}\"");
                }
                asset
            })
            .map(|asset| {
                let registry = self.registry.clone();
                self.runtime.spawn(async move {
                    registry.ensure_ready(&asset).await;
                    asset.state()
                })
            })
            .collect_vec();
        self.prepared = true;

        self.runtime.spawn(async move {
            join_all(tasks)
                .await
                .into_iter()
                .filter_map(Result::ok)
                .collect()
        })
    }

    /// Advances the scene by `delta` and renders one frame.
    pub fn tick(&mut self, delta: Duration) -> Result<FrameReport, SchedulerError> {
        ensure!(self.prepared, NotPreparedErr);

        self.graph.update(delta.as_secs_f32());
        let cameras = self.graph.render_cameras();

        let report = self
            .orchestrator
            .render_frame(&self.graph, &cameras)
            .context(RenderErr)?;
        self.stats.record(&report, delta);

        Ok(report)
    }

    /// Ticks until stopped, or until `max_frames` frames were rendered.
    ///
    /// Frames are paced to the configured target fps, if there is one.
    pub fn run(&mut self, max_frames: Option<u64>) -> Result<&FrameStats, SchedulerError> {
        self.stop.reset();
        let frame_budget = self
            .config
            .target_fps
            .filter(|fps| *fps > 0)
            .map(|fps| Duration::from_secs_f64(1.0 / fps as f64));

        let start_frames = self.stats.frames;
        let mut last = Instant::now();

        while !self.stop.is_stopped() {
            if max_frames.is_some_and(|max| self.stats.frames - start_frames >= max) {
                break;
            }

            let frame_start = Instant::now();
            self.tick(frame_start - last)?;
            last = frame_start;

            if let Some(budget) = frame_budget {
                let spent = frame_start.elapsed();
                if spent < budget {
                    std::thread::sleep(budget - spent);
                }
            }
        }

        debug!(
            "[Scheduler] Stopped after {} frame(s), {} fps",
            self.stats.frames - start_frames,
            self.stats.fps()
        );
        Ok(&self.stats)
    }
}
