use super::*;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt::Debug;
use std::sync::Arc;

/// A graphics device the engine can create objects on and submit recorded frames to.
///
/// Created once at startup and shared by every cache and renderer for the lifetime of the
/// engine. Objects are named by the id newtypes of this module, which are only valid on
/// the device that minted them.
pub trait GpuDevice: Send + Sync + Debug + 'static {
    fn create_shader_module(
        &self,
        desc: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, GpuError>;

    fn create_bind_group_layout(
        &self,
        desc: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, GpuError>;

    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDescriptor,
    ) -> Result<PipelineId, GpuError>;

    /// Builds a pipeline without tying up the caller.
    ///
    /// The returned future owns everything it needs, so it can be spawned onto a runtime.
    /// Backends that can't compile in the background just build when first polled.
    fn create_render_pipeline_async(
        self: Arc<Self>,
        desc: RenderPipelineDescriptor,
    ) -> BoxFuture<'static, Result<PipelineId, GpuError>> {
        async move { self.create_render_pipeline(&desc) }.boxed()
    }

    /// Creates a buffer, optionally filled with `contents`. `contents` must not be larger
    /// than `desc.size`.
    fn create_buffer(
        &self,
        desc: &BufferDescriptor,
        contents: Option<&[u8]>,
    ) -> Result<BufferId, GpuError>;

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError>;

    /// Creates a 2D texture. `data` is tightly packed, row-major texel data.
    fn create_texture(
        &self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> Result<TextureId, GpuError>;

    fn create_texture_view(&self, texture: TextureId) -> Result<TextureViewId, GpuError>;

    /// Drops the device's reference to a texture. Views of it are released separately.
    /// Unknown ids are ignored.
    fn release_texture(&self, texture: TextureId);

    /// Drops a view, including views imported from outside the engine.
    fn release_texture_view(&self, view: TextureViewId);

    fn create_sampler(&self, desc: &SamplerDescriptor) -> Result<SamplerId, GpuError>;

    fn create_bind_group(&self, desc: &BindGroupDescriptor) -> Result<BindGroupId, GpuError>;

    fn create_command_encoder(&self, label: &str) -> FrameEncoder {
        FrameEncoder::new(label)
    }

    /// Hands finished command buffers to the queue, in order.
    fn submit(&self, commands: Vec<CommandBuffer>) -> Result<(), GpuError>;
}
