use crate::assets::AssetId;
use crate::config::EngineConfig;
use crate::gpu::{GpuDevice, TextureDescriptor, TextureId, TextureViewId};
use crate::rendering::cache::AssetCache;
use crate::rendering::{
    DEPTH_FORMAT, GpuErr, RenderContext, RenderError, RenderOutcome, RenderTarget, Renderer,
    ResolvedTarget, SurfaceRegistry, TargetUnresolvableErr,
};
use crate::scene::{CameraId, SceneGraph};
use itertools::Itertools;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use snafu::{OptionExt, ResultExt, ensure};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// What happened in one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    pub cameras_rendered: usize,
    /// Cameras whose renderer waits for a pipeline or for shaders.
    pub cameras_pending: usize,
    /// Cameras without a target, or whose renderer failed.
    pub cameras_skipped: usize,
    pub draws: usize,
    pub renderables_skipped: usize,
    pub submitted: bool,
}

/// An engine-owned texture backing an off-screen camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffscreenTexture {
    pub texture: TextureId,
    pub view: TextureViewId,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

#[derive(Debug, Clone, Copy)]
struct DepthTarget {
    texture: TextureId,
    view: TextureViewId,
    width: u32,
    height: u32,
}

/// Drives renderers over cameras, one command encoder and one submission per frame.
#[derive(Debug)]
pub struct RenderOrchestrator {
    device: Arc<dyn GpuDevice>,
    cache: Arc<AssetCache>,
    surfaces: Arc<SurfaceRegistry>,
    renderers: Vec<Arc<dyn Renderer>>,
    offscreen: Mutex<HashMap<CameraId, OffscreenTexture>>,
    depth: Mutex<HashMap<CameraId, DepthTarget>>,
    clear_color: wgpu::Color,
    default_format: wgpu::TextureFormat,
    frame: AtomicU64,
}

impl RenderOrchestrator {
    pub fn new(cache: Arc<AssetCache>, config: &EngineConfig) -> Self {
        Self {
            device: cache.device().clone(),
            cache,
            surfaces: Arc::new(SurfaceRegistry::new()),
            renderers: Vec::new(),
            offscreen: Mutex::new(HashMap::new()),
            depth: Mutex::new(HashMap::new()),
            clear_color: config.clear_color,
            default_format: config.surface_format,
            frame: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &Arc<AssetCache> {
        &self.cache
    }

    pub fn surfaces(&self) -> &Arc<SurfaceRegistry> {
        &self.surfaces
    }

    /// Adds a renderer, keeping the list sorted by ascending priority. Renderers of equal
    /// priority stay in the order they were added.
    pub fn add_renderer(&mut self, renderer: Arc<dyn Renderer>) {
        debug!(
            "[Render] Adding renderer \"{}\" with priority {}",
            renderer.name(),
            renderer.priority()
        );
        self.renderers.push(renderer);
        self.renderers.sort_by_key(|r| r.priority());
    }

    pub fn renderers(&self) -> &[Arc<dyn Renderer>] {
        &self.renderers
    }

    /// Assets every registered renderer needs.
    pub fn renderer_assets(&self) -> Vec<AssetId> {
        self.renderers
            .iter()
            .flat_map(|r| r.assets())
            .unique()
            .collect()
    }

    /// Number of frames rendered so far.
    pub fn frame_count(&self) -> u64 {
        self.frame.load(Ordering::Relaxed)
    }

    /// The texture an off-screen camera rendered into, if it has rendered yet.
    pub fn offscreen_texture(&self, camera: CameraId) -> Option<OffscreenTexture> {
        self.offscreen.lock().get(&camera).copied()
    }

    /// Renders `cameras` in the given order and submits the frame.
    ///
    /// Cameras whose target can't be resolved, or whose renderer fails, are skipped with a
    /// warning. The frame is submitted exactly once either way. Only a failed submission is
    /// an error.
    pub fn render_frame(
        &self,
        graph: &SceneGraph,
        cameras: &[CameraId],
    ) -> Result<FrameReport, RenderError> {
        let frame = self.frame.fetch_add(1, Ordering::Relaxed) + 1;
        let mut report = FrameReport {
            frame,
            ..FrameReport::default()
        };
        trace!("[Render] Frame {frame} with {} camera(s)", cameras.len());

        for renderer in &self.renderers {
            if let Err(e) = renderer.prepare(&self.cache) {
                warn!("[Render] Preparing renderer \"{}\" failed: {e}", renderer.name());
            }
        }

        let mut encoder = self.device.create_command_encoder(&format!("Frame {frame}"));

        for &camera_id in cameras {
            let Some(camera) = graph.camera(camera_id) else {
                warn!("[Render] Skipping unknown camera {camera_id:?}");
                report.cameras_skipped += 1;
                continue;
            };
            let Some(scene) = graph.scene(camera.scene()) else {
                warn!("[Render] Skipping camera \"{}\", its scene is gone", camera.name());
                report.cameras_skipped += 1;
                continue;
            };

            let target = match self.resolve_target(camera_id, camera.name(), camera.target()) {
                Ok(target) => target,
                Err(e) => {
                    warn!("[Render] Skipping camera: {e}");
                    report.cameras_skipped += 1;
                    continue;
                }
            };

            let ctx = RenderContext {
                camera_id,
                camera,
                scene,
                target,
                frame,
                clear_color: self.clear_color,
            };

            match camera.renderer().render(&mut encoder, &ctx, &self.cache) {
                Ok(RenderOutcome::Drawn { draws, skipped }) => {
                    report.cameras_rendered += 1;
                    report.draws += draws;
                    report.renderables_skipped += skipped;
                }
                Ok(RenderOutcome::PipelinePending | RenderOutcome::AssetsPending) => {
                    report.cameras_pending += 1;
                }
                Err(e) => {
                    warn!(
                        "[Render] Renderer \"{}\" failed for camera \"{}\": {e}",
                        camera.renderer().name(),
                        camera.name()
                    );
                    report.cameras_skipped += 1;
                }
            }
        }

        self.device
            .submit(vec![encoder.finish()])
            .context(GpuErr)?;
        report.submitted = true;

        Ok(report)
    }

    fn resolve_target(
        &self,
        camera_id: CameraId,
        camera: &str,
        target: &RenderTarget,
    ) -> Result<ResolvedTarget, RenderError> {
        let (view, width, height, format) = match target {
            RenderTarget::Surface(surface) => {
                let frame = self
                    .surfaces
                    .get(surface)
                    .with_context(|| TargetUnresolvableErr {
                        camera,
                        reason: format!("surface \"{surface}\" has no current texture"),
                    })?;
                (frame.view, frame.width, frame.height, frame.format)
            }
            RenderTarget::Offscreen(offscreen) => {
                let format = offscreen.format.unwrap_or(self.default_format);
                let texture = self.offscreen_target(
                    camera_id,
                    camera,
                    offscreen.width,
                    offscreen.height,
                    format,
                )?;
                (texture.view, texture.width, texture.height, texture.format)
            }
        };

        ensure!(
            width > 0 && height > 0,
            TargetUnresolvableErr {
                camera,
                reason: format!("target is {width}x{height}"),
            }
        );

        let depth_view = self.depth_view(camera_id, camera, width, height)?;
        Ok(ResolvedTarget {
            view,
            depth_view: Some(depth_view),
            width,
            height,
            format,
        })
    }

    fn offscreen_target(
        &self,
        camera_id: CameraId,
        camera: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<OffscreenTexture, RenderError> {
        ensure!(
            width > 0 && height > 0,
            TargetUnresolvableErr {
                camera,
                reason: format!("off-screen target is {width}x{height}"),
            }
        );

        let mut targets = self.offscreen.lock();
        if let Some(existing) = targets.get(&camera_id) {
            if existing.width == width && existing.height == height && existing.format == format
            {
                return Ok(*existing);
            }
        }
        if let Some(old) = targets.remove(&camera_id) {
            self.device.release_texture_view(old.view);
            self.device.release_texture(old.texture);
        }

        let desc = TextureDescriptor {
            label: format!("Off-screen Target ({camera})").into(),
            width,
            height,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
        };
        let texture = self.device.create_texture(&desc, None).context(GpuErr)?;
        let view = self.device.create_texture_view(texture).context(GpuErr)?;
        debug!("[Render] Allocated {width}x{height} {format:?} target for camera \"{camera}\"");

        let target = OffscreenTexture {
            texture,
            view,
            width,
            height,
            format,
        };
        targets.insert(camera_id, target);
        Ok(target)
    }

    fn depth_view(
        &self,
        camera_id: CameraId,
        camera: &str,
        width: u32,
        height: u32,
    ) -> Result<TextureViewId, RenderError> {
        let mut depth = self.depth.lock();
        if let Some(existing) = depth.get(&camera_id) {
            if existing.width == width && existing.height == height {
                return Ok(existing.view);
            }
        }
        if let Some(old) = depth.remove(&camera_id) {
            self.device.release_texture_view(old.view);
            self.device.release_texture(old.texture);
        }

        let desc = TextureDescriptor {
            label: format!("Depth ({camera})").into(),
            width,
            height,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        };
        let texture = self.device.create_texture(&desc, None).context(GpuErr)?;
        let view = self.device.create_texture_view(texture).context(GpuErr)?;
        trace!("[Render] Allocated depth buffer {width}x{height} for camera \"{camera}\"");

        depth.insert(
            camera_id,
            DepthTarget {
                texture,
                view,
                width,
                height,
            },
        );
        Ok(view)
    }
}
