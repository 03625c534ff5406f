use super::*;
use dashmap::{DashMap, DashSet};
use futures::FutureExt;
use futures::future::BoxFuture;
use log::trace;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Snapshot of everything a [`HeadlessDevice`] has been asked to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub shader_modules: usize,
    pub bind_group_layouts: usize,
    pub pipeline_attempts: usize,
    pub pipelines: usize,
    pub buffers: usize,
    pub buffer_writes: usize,
    pub textures: usize,
    pub texture_views: usize,
    pub samplers: usize,
    pub bind_groups: usize,
    pub submits: usize,
}

#[derive(Debug, Default)]
struct Counters {
    shader_modules: AtomicUsize,
    bind_group_layouts: AtomicUsize,
    pipeline_attempts: AtomicUsize,
    pipelines: AtomicUsize,
    buffers: AtomicUsize,
    buffer_writes: AtomicUsize,
    textures: AtomicUsize,
    texture_views: AtomicUsize,
    samplers: AtomicUsize,
    bind_groups: AtomicUsize,
    submits: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// A device without a GPU behind it.
///
/// Every object is just an id plus the descriptor it was created from. Submitted command
/// buffers are checked against the known ids and kept around, so tests can look at exactly
/// what a frame recorded. Shader and pipeline creation can be told to fail, and background
/// pipeline builds can be slowed down.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_id: AtomicU64,
    counters: Counters,
    shader_modules: DashMap<ShaderModuleId, ShaderStage>,
    bind_group_layouts: DashSet<BindGroupLayoutId>,
    pipelines: DashMap<PipelineId, RenderPipelineDescriptor>,
    buffers: DashMap<BufferId, Vec<u8>>,
    textures: DashMap<TextureId, TextureDescriptor>,
    texture_views: DashMap<TextureViewId, Option<TextureId>>,
    samplers: DashSet<SamplerId>,
    bind_groups: DashMap<BindGroupId, BindGroupDescriptor>,
    submissions: Mutex<Vec<CommandBuffer>>,
    failing_shaders: AtomicUsize,
    failing_pipelines: AtomicUsize,
    pipeline_latency: Mutex<Option<Duration>>,
}

impl HeadlessDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn mint(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The next `count` shader module creations fail with a compilation error.
    pub fn fail_next_shader_modules(&self, count: usize) {
        self.failing_shaders.store(count, Ordering::SeqCst);
    }

    /// The next `count` pipeline creations fail, sync or async.
    pub fn fail_next_pipelines(&self, count: usize) {
        self.failing_pipelines.store(count, Ordering::SeqCst);
    }

    /// Background pipeline builds sleep this long before they complete.
    pub fn set_pipeline_latency(&self, latency: Option<Duration>) {
        *self.pipeline_latency.lock() = latency;
    }

    /// Registers a view that wasn't created through this device, like a swapchain image.
    pub fn import_texture_view(&self) -> TextureViewId {
        let id = TextureViewId(self.mint());
        self.texture_views.insert(id, None);
        id
    }

    /// Textures that were created and not released yet.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Views that were created or imported and not released yet.
    pub fn live_texture_views(&self) -> usize {
        self.texture_views.len()
    }

    pub fn stats(&self) -> HeadlessStats {
        let c = &self.counters;
        let load = |a: &AtomicUsize| a.load(Ordering::Relaxed);
        HeadlessStats {
            shader_modules: load(&c.shader_modules),
            bind_group_layouts: load(&c.bind_group_layouts),
            pipeline_attempts: load(&c.pipeline_attempts),
            pipelines: load(&c.pipelines),
            buffers: load(&c.buffers),
            buffer_writes: load(&c.buffer_writes),
            textures: load(&c.textures),
            texture_views: load(&c.texture_views),
            samplers: load(&c.samplers),
            bind_groups: load(&c.bind_groups),
            submits: load(&c.submits),
        }
    }

    pub fn submissions(&self) -> Vec<CommandBuffer> {
        self.submissions.lock().clone()
    }

    pub fn last_submission(&self) -> Option<CommandBuffer> {
        self.submissions.lock().last().cloned()
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.buffers.get(&buffer).map(|b| b.clone())
    }

    pub fn shader_stage(&self, module: ShaderModuleId) -> Option<ShaderStage> {
        self.shader_modules.get(&module).map(|s| *s)
    }

    pub fn pipeline_descriptor(&self, pipeline: PipelineId) -> Option<RenderPipelineDescriptor> {
        self.pipelines.get(&pipeline).map(|d| d.clone())
    }

    pub fn texture_descriptor(&self, texture: TextureId) -> Option<TextureDescriptor> {
        self.textures.get(&texture).map(|d| d.clone())
    }

    pub fn bind_group_descriptor(&self, group: BindGroupId) -> Option<BindGroupDescriptor> {
        self.bind_groups.get(&group).map(|d| d.clone())
    }

    fn take_injected(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_buffer(&self, buffer: BufferId) -> Result<(), GpuError> {
        if self.buffers.contains_key(&buffer) {
            Ok(())
        } else {
            UnknownResourceErr {
                kind: BufferId::KIND,
                id: buffer.0,
            }
            .fail()
        }
    }

    fn check_view(&self, view: TextureViewId) -> Result<(), GpuError> {
        if self.texture_views.contains_key(&view) {
            Ok(())
        } else {
            UnknownResourceErr {
                kind: TextureViewId::KIND,
                id: view.0,
            }
            .fail()
        }
    }

    fn check_command(&self, command: &RenderCommand) -> Result<(), GpuError> {
        match command {
            RenderCommand::SetPipeline(pipeline) if !self.pipelines.contains_key(pipeline) => {
                UnknownResourceErr {
                    kind: PipelineId::KIND,
                    id: pipeline.0,
                }
                .fail()
            }
            RenderCommand::SetBindGroup { group, .. } if !self.bind_groups.contains_key(group) => {
                UnknownResourceErr {
                    kind: BindGroupId::KIND,
                    id: group.0,
                }
                .fail()
            }
            RenderCommand::SetVertexBuffer { buffer, .. }
            | RenderCommand::SetIndexBuffer { buffer, .. } => self.check_buffer(*buffer),
            _ => Ok(()),
        }
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_shader_module(
        &self,
        desc: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, GpuError> {
        if Self::take_injected(&self.failing_shaders) {
            return ShaderCompilationErr {
                label: desc.label,
                message: "injected failure",
            }
            .fail();
        }

        let id = ShaderModuleId(self.mint());
        self.shader_modules.insert(id, desc.stage);
        bump(&self.counters.shader_modules);
        trace!("[Headless] Created {} shader module {id} \"{}\"", desc.stage, desc.label);
        Ok(id)
    }

    fn create_bind_group_layout(
        &self,
        _desc: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, GpuError> {
        let id = BindGroupLayoutId(self.mint());
        self.bind_group_layouts.insert(id);
        bump(&self.counters.bind_group_layouts);
        Ok(id)
    }

    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDescriptor,
    ) -> Result<PipelineId, GpuError> {
        bump(&self.counters.pipeline_attempts);

        if Self::take_injected(&self.failing_pipelines) {
            return PipelineCreationErr {
                label: desc.label.as_str(),
                message: "injected failure",
            }
            .fail();
        }

        for module in [desc.vertex_module, desc.fragment_module] {
            if !self.shader_modules.contains_key(&module) {
                return UnknownResourceErr {
                    kind: ShaderModuleId::KIND,
                    id: module.0,
                }
                .fail();
            }
        }
        for layout in &desc.bind_group_layouts {
            if !self.bind_group_layouts.contains(layout) {
                return UnknownResourceErr {
                    kind: BindGroupLayoutId::KIND,
                    id: layout.0,
                }
                .fail();
            }
        }

        let id = PipelineId(self.mint());
        self.pipelines.insert(id, desc.clone());
        bump(&self.counters.pipelines);
        trace!("[Headless] Created render pipeline {id} \"{}\"", desc.label);
        Ok(id)
    }

    fn create_render_pipeline_async(
        self: Arc<Self>,
        desc: RenderPipelineDescriptor,
    ) -> BoxFuture<'static, Result<PipelineId, GpuError>> {
        let latency = *self.pipeline_latency.lock();
        async move {
            match latency {
                Some(latency) => tokio::time::sleep(latency).await,
                None => tokio::task::yield_now().await,
            }
            self.create_render_pipeline(&desc)
        }
        .boxed()
    }

    fn create_buffer(
        &self,
        desc: &BufferDescriptor,
        contents: Option<&[u8]>,
    ) -> Result<BufferId, GpuError> {
        let mut data = vec![0; desc.size as usize];
        if let Some(contents) = contents {
            if contents.len() > data.len() {
                return RejectedErr {
                    message: format!(
                        "{} bytes of contents don't fit buffer \"{}\" of size {}",
                        contents.len(),
                        desc.label,
                        desc.size
                    ),
                }
                .fail();
            }
            data[..contents.len()].copy_from_slice(contents);
        }

        let id = BufferId(self.mint());
        self.buffers.insert(id, data);
        bump(&self.counters.buffers);
        Ok(id)
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        let Some(mut contents) = self.buffers.get_mut(&buffer) else {
            return UnknownResourceErr {
                kind: BufferId::KIND,
                id: buffer.0,
            }
            .fail();
        };

        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return RejectedErr {
                message: format!(
                    "write of {} bytes at offset {offset} overruns buffer {buffer} of size {}",
                    data.len(),
                    contents.len()
                ),
            }
            .fail();
        }

        contents[start..end].copy_from_slice(data);
        bump(&self.counters.buffer_writes);
        Ok(())
    }

    fn create_texture(
        &self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> Result<TextureId, GpuError> {
        let mismatch = match (data, desc.byte_size()) {
            (Some(data), Some(expected)) if data.len() as u64 != expected => {
                Some((data.len(), expected))
            }
            _ => None,
        };
        if let Some((got, expected)) = mismatch {
            return RejectedErr {
                message: format!(
                    "texture \"{}\" expects {expected} bytes, got {got}",
                    desc.label
                ),
            }
            .fail();
        }

        let id = TextureId(self.mint());
        self.textures.insert(id, desc.clone());
        bump(&self.counters.textures);
        Ok(id)
    }

    fn create_texture_view(&self, texture: TextureId) -> Result<TextureViewId, GpuError> {
        if !self.textures.contains_key(&texture) {
            return UnknownResourceErr {
                kind: TextureId::KIND,
                id: texture.0,
            }
            .fail();
        }

        let id = TextureViewId(self.mint());
        self.texture_views.insert(id, Some(texture));
        bump(&self.counters.texture_views);
        Ok(id)
    }

    fn release_texture(&self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn release_texture_view(&self, view: TextureViewId) {
        self.texture_views.remove(&view);
    }

    fn create_sampler(&self, _desc: &SamplerDescriptor) -> Result<SamplerId, GpuError> {
        let id = SamplerId(self.mint());
        self.samplers.insert(id);
        bump(&self.counters.samplers);
        Ok(id)
    }

    fn create_bind_group(&self, desc: &BindGroupDescriptor) -> Result<BindGroupId, GpuError> {
        if !self.bind_group_layouts.contains(&desc.layout) {
            return UnknownResourceErr {
                kind: BindGroupLayoutId::KIND,
                id: desc.layout.0,
            }
            .fail();
        }

        for entry in &desc.entries {
            match entry.resource {
                BindingResource::Buffer { buffer, .. } => self.check_buffer(buffer)?,
                BindingResource::TextureView(view) => self.check_view(view)?,
                BindingResource::Sampler(sampler) if !self.samplers.contains(&sampler) => {
                    return UnknownResourceErr {
                        kind: SamplerId::KIND,
                        id: sampler.0,
                    }
                    .fail();
                }
                BindingResource::Sampler(_) => {}
            }
        }

        let id = BindGroupId(self.mint());
        self.bind_groups.insert(id, desc.clone());
        bump(&self.counters.bind_groups);
        Ok(id)
    }

    fn submit(&self, commands: Vec<CommandBuffer>) -> Result<(), GpuError> {
        for buffer in &commands {
            for pass in buffer.passes() {
                self.check_view(pass.desc.color.view)?;
                if let Some(depth) = &pass.desc.depth {
                    self.check_view(depth.view)?;
                }
                for command in &pass.commands {
                    self.check_command(command)?;
                }
            }
        }

        bump(&self.counters.submits);
        self.submissions.lock().extend(commands);
        Ok(())
    }
}
