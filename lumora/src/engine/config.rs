use bon::Builder;
use std::time::Duration;

/// Engine-wide settings. Everything has a default.
///
/// ```
/// use lumora::EngineConfig;
///
/// let config = EngineConfig::builder().target_fps(60).worker_threads(4).build();
/// assert_eq!(config.target_fps, Some(60));
/// ```
#[derive(Debug, Clone, Builder)]
pub struct EngineConfig {
    /// Frame pacing for [`FrameScheduler::run`](crate::FrameScheduler::run). `None` runs unpaced.
    pub target_fps: Option<u32>,

    /// Worker threads of the runtime driving asset loads and background pipeline builds.
    #[builder(default = 2)]
    pub worker_threads: usize,

    #[builder(default = wgpu::Color { r: 0.05, g: 0.05, b: 0.08, a: 1.0 })]
    pub clear_color: wgpu::Color,

    /// Cooldown after the first failed build of a pipeline. Doubles with every further
    /// failure of the same pipeline.
    #[builder(default = Duration::from_millis(500))]
    pub pipeline_retry_cooldown: Duration,

    #[builder(default = Duration::from_secs(30))]
    pub pipeline_retry_max_cooldown: Duration,

    /// Keep shader source around after compilation, for hot reloading.
    #[builder(default)]
    pub keep_shader_source: bool,

    /// Drop CPU copies of assets once they live on the GPU.
    #[builder(default = true)]
    pub discard_cpu_data: bool,

    /// Format of off-screen targets that don't name one.
    #[builder(default = wgpu::TextureFormat::Rgba8UnormSrgb)]
    pub surface_format: wgpu::TextureFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
