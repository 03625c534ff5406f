use crate::assets::{Asset, AssetId, AssetPayload, AssetRegistry, ShaderSource, Vertex3D};
use crate::gpu::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutDescriptor,
    BindGroupLayoutId, BindingResource, BufferId, ColorAttachment, DepthAttachment, FrameEncoder,
    GpuDevice, GpuError, PipelineId, RenderPassDescriptor, RenderPassRecorder,
    RenderPipelineDescriptor, SamplerId, ShaderModuleId, TextureViewId,
};
use crate::rendering::cache::{AssetCache, PipelineKey, PipelineSources};
use crate::rendering::uniform::{MODEL_UNIFORM_SIZE, ModelUniform, SlottedUniformBuffer};
use crate::rendering::{
    DEPTH_FORMAT, GpuErr, RenderContext, RenderError, RenderOutcome, Renderer, shaders,
};
use crate::scene::Renderable;
use bon::Builder;
use itertools::Itertools;
use log::{debug, trace};
use nalgebra::{Matrix4, Vector4};
use parking_lot::Mutex;
use snafu::ResultExt;
use std::collections::HashMap;

pub const FORWARD_VERTEX_SHADER: &str = "lumora/shaders/forward_vertex.wgsl";
pub const FORWARD_FRAGMENT_SHADER: &str = "lumora/shaders/forward_fragment.wgsl";

/// Registers the built-in forward shaders as static, always-ready assets.
pub fn register_builtin_shaders(registry: &AssetRegistry) {
    for (id, code) in [
        (FORWARD_VERTEX_SHADER, shaders::FORWARD_VERTEX),
        (FORWARD_FRAGMENT_SHADER, shaders::FORWARD_FRAGMENT),
    ] {
        registry.register(Asset::from_payload(
            id,
            AssetPayload::Shader(ShaderSource::new(code)),
        ));
    }
}

/// Draws every visible renderable of a scene, lit by a fixed directional light.
///
/// The pipeline is built in the background the first time a target format is seen. Until
/// it is ready, cameras using this renderer draw nothing. Without an async runtime it is
/// built on the spot instead.
#[derive(Debug, Builder)]
pub struct ForwardRenderer {
    #[builder(into, default = String::from("forward"))]
    name: String,
    #[builder(default)]
    priority: i32,
    #[builder(into, default = AssetId::new(FORWARD_VERTEX_SHADER))]
    vertex_shader: AssetId,
    #[builder(into, default = AssetId::new(FORWARD_FRAGMENT_SHADER))]
    fragment_shader: AssetId,
    /// Uniform slots allocated up front. The buffer grows on demand.
    #[builder(default = 16)]
    initial_capacity: u32,
    #[builder(skip)]
    state: Mutex<Option<ForwardState>>,
}

impl Default for ForwardRenderer {
    fn default() -> Self {
        Self::builder().build()
    }
}

type BindGroupKey = (BufferId, u32, TextureViewId);

#[derive(Debug, Clone, Copy)]
struct ShaderPair {
    vertex: ShaderModuleId,
    fragment: ShaderModuleId,
    fallback: bool,
}

impl ShaderPair {
    fn sources(self, layout: BindGroupLayoutId) -> PipelineSources {
        PipelineSources {
            layout,
            vertex: self.vertex,
            fragment: self.fragment,
        }
    }
}

#[derive(Debug)]
struct ForwardState {
    layout: BindGroupLayoutId,
    uniforms: SlottedUniformBuffer,
    bind_groups: HashMap<BindGroupKey, BindGroupId>,
}

impl ForwardState {
    fn new(device: &dyn GpuDevice, name: &str, capacity: u32) -> Result<Self, GpuError> {
        let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: format!("{name} Bind Group Layout").into(),
            entries: layout_entries(),
        })?;
        let uniforms = SlottedUniformBuffer::new(device, name, capacity)?;
        debug!("[Forward Renderer] \"{name}\" set up with {capacity} uniform slots");

        Ok(Self {
            layout,
            uniforms,
            bind_groups: HashMap::new(),
        })
    }

    fn bind_group(
        &mut self,
        device: &dyn GpuDevice,
        sampler: SamplerId,
        slot: u32,
        texture: TextureViewId,
    ) -> Result<BindGroupId, GpuError> {
        let key = (self.uniforms.buffer(), slot, texture);
        if let Some(group) = self.bind_groups.get(&key) {
            return Ok(*group);
        }

        let group = device.create_bind_group(&BindGroupDescriptor {
            label: format!("Model Bind Group (slot {slot})").into(),
            layout: self.layout,
            entries: vec![
                BindGroupEntry {
                    binding: 0,
                    resource: self.uniforms.binding(slot),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::TextureView(texture),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: BindingResource::Sampler(sampler),
                },
            ],
        })?;
        self.bind_groups.insert(key, group);
        Ok(group)
    }
}

fn layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    vec![
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(MODEL_UNIFORM_SIZE),
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    ]
}

impl ForwardRenderer {
    fn resolve_shaders(&self, cache: &AssetCache) -> Result<Option<ShaderPair>, RenderError> {
        let (vertex, fragment) = cache.shader_pair(&self.vertex_shader, &self.fragment_shader)?;
        let fallback = vertex.is_substitute() || fragment.is_substitute();
        Ok(match (vertex.value(), fragment.value()) {
            (Some(vertex), Some(fragment)) => Some(ShaderPair {
                vertex,
                fragment,
                fallback,
            }),
            _ => None,
        })
    }

    fn key_for(
        &self,
        format: wgpu::TextureFormat,
        sources: PipelineSources,
        fallback: bool,
    ) -> PipelineKey {
        let kind = if fallback {
            format!("{}/fallback", self.name)
        } else {
            self.name.clone()
        };
        PipelineKey::new(kind, format).with_sources(sources)
    }

    /// Key of the pipeline this renderer draws into `format` with right now, or `None` while
    /// one of its shaders is still loading. Pipelines built from fallback shaders get a key
    /// of their own so they never take the real one's place.
    pub fn pipeline_key(
        &self,
        cache: &AssetCache,
        format: wgpu::TextureFormat,
    ) -> Result<Option<PipelineKey>, RenderError> {
        let Some(shaders) = self.resolve_shaders(cache)? else {
            return Ok(None);
        };
        let mut state = self.state.lock();
        let state = self
            .ensure_state(&mut state, &**cache.device())
            .context(GpuErr)?;
        let sources = shaders.sources(state.layout);
        Ok(Some(self.key_for(format, sources, shaders.fallback)))
    }

    /// The pipeline for `key`, if it can be drawn with in this frame.
    ///
    /// Builds run in the background when a runtime can drive them. Without one the pipeline
    /// is built right here, since nothing would ever poll a background build.
    fn pipeline(
        &self,
        cache: &AssetCache,
        key: PipelineKey,
        sources: PipelineSources,
    ) -> Option<PipelineId> {
        let pipelines = cache.pipelines();
        if let Some(pipeline) = pipelines.get(&key) {
            return Some(pipeline);
        }

        if pipelines.can_build_in_background() {
            if !pipelines.has(&key) {
                let desc = self.pipeline_descriptor(&key, sources);
                let device = cache.device().clone();
                // The outcome lands in the cache, a later frame picks it up from there
                let _in_flight = pipelines
                    .get_or_create_async(key, move || device.create_render_pipeline_async(desc));
            }
            return None;
        }

        match pipelines.get_or_create(key.clone(), &**cache.device(), || {
            self.pipeline_descriptor(&key, sources)
        }) {
            Ok(pipeline) => Some(pipeline),
            Err(e) => {
                trace!("[Forward Renderer] No pipeline for \"{}\" yet: {e}", self.name);
                None
            }
        }
    }

    fn ensure_state<'s>(
        &self,
        state: &'s mut Option<ForwardState>,
        device: &dyn GpuDevice,
    ) -> Result<&'s mut ForwardState, GpuError> {
        match state {
            Some(state) => Ok(state),
            None => Ok(state.insert(ForwardState::new(
                device,
                &self.name,
                self.initial_capacity,
            )?)),
        }
    }

    fn pipeline_descriptor(
        &self,
        key: &PipelineKey,
        sources: PipelineSources,
    ) -> RenderPipelineDescriptor {
        RenderPipelineDescriptor {
            label: format!("{key} Pipeline"),
            bind_group_layouts: vec![sources.layout],
            vertex_module: sources.vertex,
            fragment_module: sources.fragment,
            vertex_layouts: vec![Vertex3D::layout()],
            color_format: key.format,
            depth_format: Some(DEPTH_FORMAT),
            primitive: wgpu::PrimitiveState {
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
        }
    }

    /// Records one renderable. Returns `false` if something it needs is still loading.
    fn draw(
        &self,
        pass: &mut RenderPassRecorder,
        state: &mut ForwardState,
        cache: &AssetCache,
        renderable: &Renderable,
        slot: u32,
        view_projection: &Matrix4<f32>,
    ) -> Result<bool, RenderError> {
        let mesh = cache.mesh(&renderable.mesh)?;
        let Some(texture) = cache.texture(renderable.texture.as_ref())?.value() else {
            return Ok(false);
        };
        let Some(material) = cache.material(renderable.material.as_ref())?.value() else {
            return Ok(false);
        };

        let device = &**cache.device();
        let model = renderable.transform.matrix();
        let uniform = ModelUniform {
            mvp: view_projection * model,
            model,
            base_color: Vector4::from(material.base_color),
        };
        state.uniforms.write(device, slot, &uniform).context(GpuErr)?;
        let group = state
            .bind_group(device, cache.sampler(), slot, texture.view)
            .context(GpuErr)?;

        pass.set_bind_group(0, group);
        pass.set_vertex_buffer(0, mesh.vertex_buffer);
        match mesh.indices {
            Some(indices) => {
                pass.set_index_buffer(indices.buffer, wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..indices.count, 0, 0..1);
            }
            None => pass.draw(0..mesh.vertex_count, 0..1),
        }

        Ok(true)
    }
}

impl Renderer for ForwardRenderer {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn assets(&self) -> Vec<AssetId> {
        vec![self.vertex_shader.clone(), self.fragment_shader.clone()]
    }

    fn prepare(&self, cache: &AssetCache) -> Result<(), RenderError> {
        let mut state = self.state.lock();
        self.ensure_state(&mut state, &**cache.device())
            .context(GpuErr)?;
        Ok(())
    }

    fn render(
        &self,
        encoder: &mut FrameEncoder,
        ctx: &RenderContext,
        cache: &AssetCache,
    ) -> Result<RenderOutcome, RenderError> {
        let Some(shaders) = self.resolve_shaders(cache)? else {
            trace!("[Forward Renderer] Shaders of \"{}\" are still loading", self.name);
            return Ok(RenderOutcome::AssetsPending);
        };

        let device = cache.device();
        let mut state = self.state.lock();
        let state = self.ensure_state(&mut state, &**device).context(GpuErr)?;

        let sources = shaders.sources(state.layout);
        let key = self.key_for(ctx.target.format, sources, shaders.fallback);
        let Some(pipeline) = self.pipeline(cache, key, sources) else {
            return Ok(RenderOutcome::PipelinePending);
        };

        let renderables = ctx
            .scene
            .renderables()
            .iter()
            .filter(|r| r.visible)
            .collect_vec();
        let first_slot = state
            .uniforms
            .reserve(&**device, ctx.frame, renderables.len() as u32)
            .context(GpuErr)?;

        let view_projection = ctx.camera.view_projection(ctx.target.aspect());
        let mut pass = encoder.begin_render_pass(RenderPassDescriptor {
            label: format!("{} Pass ({})", self.name, ctx.camera.name()),
            color: ColorAttachment {
                view: ctx.target.view,
                clear: Some(ctx.clear_color),
            },
            depth: ctx.target.depth_view.map(|view| DepthAttachment {
                view,
                clear: Some(1.0),
            }),
        });
        pass.set_pipeline(pipeline);

        let mut draws = 0;
        let mut skipped = 0;
        for (renderable, slot) in renderables.into_iter().zip(first_slot..) {
            match self.draw(&mut pass, state, cache, renderable, slot, &view_projection) {
                Ok(true) => draws += 1,
                Ok(false) => skipped += 1,
                Err(e) => {
                    trace!("[Forward Renderer] Skipping \"{}\": {e}", renderable.name);
                    skipped += 1;
                }
            }
        }

        Ok(RenderOutcome::Drawn { draws, skipped })
    }
}
