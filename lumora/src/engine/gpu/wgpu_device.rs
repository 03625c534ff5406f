use super::*;
use crate::utils::sizes::align_up;
use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, info};
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use wgpu::util::{DeviceExt, TextureDataOrder};
use wgpu::{
    COPY_BUFFER_ALIGNMENT, COPY_BYTES_PER_ROW_ALIGNMENT, CommandEncoderDescriptor, Extent3d,
    LoadOp, MapMode, Operations, Origin3d, PollType, StoreOp, TexelCopyBufferInfo,
    TexelCopyBufferLayout, TexelCopyTextureInfo, TextureAspect, TextureDimension,
    TextureViewDescriptor,
};

/// [`GpuDevice`] on top of a real `wgpu` device and queue.
///
/// Objects live in per-type maps and are cloned out (wgpu handles are reference counted)
/// whenever a command buffer is replayed into a native encoder.
#[derive(Debug)]
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    next_id: AtomicU64,
    shader_modules: DashMap<ShaderModuleId, wgpu::ShaderModule>,
    bind_group_layouts: DashMap<BindGroupLayoutId, wgpu::BindGroupLayout>,
    pipelines: DashMap<PipelineId, wgpu::RenderPipeline>,
    buffers: DashMap<BufferId, wgpu::Buffer>,
    textures: DashMap<TextureId, wgpu::Texture>,
    texture_views: DashMap<TextureViewId, wgpu::TextureView>,
    samplers: DashMap<SamplerId, wgpu::Sampler>,
    bind_groups: DashMap<BindGroupId, wgpu::BindGroup>,
}

enum ResolvedBinding {
    Buffer(wgpu::Buffer, u64, u64),
    TextureView(wgpu::TextureView),
    Sampler(wgpu::Sampler),
}

fn fetch<K: GpuId, V: Clone>(map: &DashMap<K, V>, id: K) -> Result<V, GpuError> {
    map.get(&id).map(|entry| entry.value().clone()).ok_or_else(|| {
        UnknownResourceErr {
            kind: K::kind(),
            id: id.raw(),
        }
        .build()
    })
}

impl WgpuDevice {
    /// Opens the default adapter without any surface attached.
    pub async fn new_headless() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .map_err(|e| {
                AdapterRequestErr {
                    message: e.to_string(),
                }
                .build()
            })?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Lumora Device"),
                ..Default::default()
            })
            .await
            .map_err(|e| {
                DeviceRequestErr {
                    message: e.to_string(),
                }
                .build()
            })?;

        Ok(Self::from_parts(device, queue, adapter.get_info()))
    }

    /// Wraps a device the embedding application already opened, e.g. one that shares an
    /// adapter with its window surface.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue, info: wgpu::AdapterInfo) -> Self {
        info!(
            "Using {} ({:?}) for rendering",
            info.name, info.backend
        );

        Self {
            device,
            queue,
            adapter_info: info,
            next_id: AtomicU64::new(0),
            shader_modules: DashMap::new(),
            bind_group_layouts: DashMap::new(),
            pipelines: DashMap::new(),
            buffers: DashMap::new(),
            textures: DashMap::new(),
            texture_views: DashMap::new(),
            samplers: DashMap::new(),
            bind_groups: DashMap::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    fn mint(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Makes a foreign view (usually the current swapchain image) addressable by id.
    pub fn import_texture_view(&self, view: wgpu::TextureView) -> TextureViewId {
        let id = TextureViewId(self.mint());
        self.texture_views.insert(id, view);
        id
    }

    /// Copies a texture back to the CPU as tightly packed rows.
    ///
    /// Blocks until the GPU has finished all submitted work.
    pub fn read_texture(&self, texture: TextureId) -> Result<Vec<u8>, GpuError> {
        let texture = fetch(&self.textures, texture)?;
        let (width, height) = (texture.width(), texture.height());
        let bytes_per_pixel = texture.format().block_copy_size(None).ok_or_else(|| {
            RejectedErr {
                message: format!("{:?} textures can't be read back", texture.format()),
            }
            .build()
        })?;

        let bytes_per_row = bytes_per_pixel * width;
        let padded_bytes_per_row =
            bytes_per_row.div_ceil(COPY_BYTES_PER_ROW_ALIGNMENT) * COPY_BYTES_PER_ROW_ALIGNMENT;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Texture Readback Buffer"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("Texture Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            TexelCopyBufferInfo {
                buffer: &buffer,
                layout: TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        let _ = self.device.poll(PollType::Wait);

        match futures::executor::block_on(rx) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return RejectedErr {
                    message: e.to_string(),
                }
                .fail();
            }
            Err(_) => {
                return RejectedErr {
                    message: "readback was cancelled",
                }
                .fail();
            }
        }

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((bytes_per_row * height) as usize);
        for row in 0..height as usize {
            let start = row * padded_bytes_per_row as usize;
            pixels.extend_from_slice(&data[start..start + bytes_per_row as usize]);
        }
        drop(data);
        buffer.unmap();

        Ok(pixels)
    }

    fn build_pipeline(
        &self,
        desc: &RenderPipelineDescriptor,
    ) -> Result<wgpu::RenderPipeline, GpuError> {
        let vertex = fetch(&self.shader_modules, desc.vertex_module)?;
        let fragment = fetch(&self.shader_modules, desc.fragment_module)?;
        let layouts = desc
            .bind_group_layouts
            .iter()
            .map(|id| fetch(&self.bind_group_layouts, *id))
            .collect::<Result<Vec<_>, _>>()?;
        let layout_refs = layouts.iter().collect::<Vec<_>>();

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.label),
                bind_group_layouts: &layout_refs,
                push_constant_ranges: &[],
            });

        let buffers = desc
            .vertex_layouts
            .iter()
            .map(|layout| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: layout.step_mode,
                attributes: &layout.attributes,
            })
            .collect::<Vec<_>>();

        let targets = [Some(wgpu::ColorTargetState {
            format: desc.color_format,
            blend: Some(wgpu::BlendState::REPLACE),
            write_mask: wgpu::ColorWrites::ALL,
        })];

        let depth_stencil = desc.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&desc.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex,
                    entry_point: Some(ShaderStage::Vertex.entry_point()),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                primitive: desc.primitive,
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment,
                    entry_point: Some(ShaderStage::Fragment.entry_point()),
                    compilation_options: Default::default(),
                    targets: &targets,
                }),
                multiview: None,
                cache: None,
            });

        if let Some(err) = futures::executor::block_on(self.device.pop_error_scope()) {
            return PipelineCreationErr {
                label: desc.label.as_str(),
                message: err.to_string(),
            }
            .fail();
        }

        Ok(pipeline)
    }

    fn resolve_binding(&self, resource: BindingResource) -> Result<ResolvedBinding, GpuError> {
        Ok(match resource {
            BindingResource::Buffer {
                buffer,
                offset,
                size,
            } => ResolvedBinding::Buffer(fetch(&self.buffers, buffer)?, offset, size),
            BindingResource::TextureView(view) => {
                ResolvedBinding::TextureView(fetch(&self.texture_views, view)?)
            }
            BindingResource::Sampler(sampler) => {
                ResolvedBinding::Sampler(fetch(&self.samplers, sampler)?)
            }
        })
    }

    fn replay_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &RecordedPass,
    ) -> Result<(), GpuError> {
        let color_view = fetch(&self.texture_views, pass.desc.color.view)?;
        let depth = match pass.desc.depth {
            Some(depth) => Some((fetch(&self.texture_views, depth.view)?, depth.clear)),
            None => None,
        };

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&pass.desc.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &color_view,
                resolve_target: None,
                ops: Operations {
                    load: pass.desc.color.clear.map_or(LoadOp::Load, LoadOp::Clear),
                    store: StoreOp::Store,
                },
            })],
            depth_stencil_attachment: depth.as_ref().map(|(view, clear)| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(Operations {
                        load: clear.map_or(LoadOp::Load, LoadOp::Clear),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for command in &pass.commands {
            match command {
                RenderCommand::SetPipeline(id) => {
                    rpass.set_pipeline(&fetch(&self.pipelines, *id)?);
                }
                RenderCommand::SetBindGroup { index, group } => {
                    rpass.set_bind_group(*index, &fetch(&self.bind_groups, *group)?, &[]);
                }
                RenderCommand::SetVertexBuffer { slot, buffer } => {
                    let buffer = fetch(&self.buffers, *buffer)?;
                    rpass.set_vertex_buffer(*slot, buffer.slice(..));
                }
                RenderCommand::SetIndexBuffer { buffer, format } => {
                    let buffer = fetch(&self.buffers, *buffer)?;
                    rpass.set_index_buffer(buffer.slice(..), *format);
                }
                RenderCommand::Draw {
                    vertices,
                    instances,
                } => rpass.draw(vertices.clone(), instances.clone()),
                RenderCommand::DrawIndexed {
                    indices,
                    base_vertex,
                    instances,
                } => rpass.draw_indexed(indices.clone(), *base_vertex, instances.clone()),
            }
        }

        Ok(())
    }
}

impl GpuDevice for WgpuDevice {
    fn create_shader_module(
        &self,
        desc: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(desc.source.into()),
            });
        if let Some(err) = futures::executor::block_on(self.device.pop_error_scope()) {
            return ShaderCompilationErr {
                label: desc.label,
                message: err.to_string(),
            }
            .fail();
        }

        let id = ShaderModuleId(self.mint());
        self.shader_modules.insert(id, module);
        debug!("Compiled {} shader module \"{}\"", desc.stage, desc.label);
        Ok(id)
    }

    fn create_bind_group_layout(
        &self,
        desc: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, GpuError> {
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&desc.label),
                entries: &desc.entries,
            });

        let id = BindGroupLayoutId(self.mint());
        self.bind_group_layouts.insert(id, layout);
        Ok(id)
    }

    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDescriptor,
    ) -> Result<PipelineId, GpuError> {
        let pipeline = self.build_pipeline(desc)?;
        let id = PipelineId(self.mint());
        self.pipelines.insert(id, pipeline);
        debug!("Built render pipeline \"{}\"", desc.label);
        Ok(id)
    }

    fn create_render_pipeline_async(
        self: Arc<Self>,
        desc: RenderPipelineDescriptor,
    ) -> BoxFuture<'static, Result<PipelineId, GpuError>> {
        async move {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => handle
                    .spawn_blocking(move || self.create_render_pipeline(&desc))
                    .await
                    .map_err(|e| {
                        TaskJoinErr {
                            message: e.to_string(),
                        }
                        .build()
                    })?,
                Err(_) => self.create_render_pipeline(&desc),
            }
        }
        .boxed()
    }

    fn create_buffer(
        &self,
        desc: &BufferDescriptor,
        contents: Option<&[u8]>,
    ) -> Result<BufferId, GpuError> {
        let size = align_up(desc.size.max(1), COPY_BUFFER_ALIGNMENT);
        let buffer = match contents {
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&desc.label),
                size,
                usage: desc.usage,
                mapped_at_creation: false,
            }),
            Some(contents) if contents.len() as u64 > desc.size => {
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
            Some(contents) => {
                let mut padded = contents.to_vec();
                padded.resize(size as usize, 0);
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(&desc.label),
                        contents: &padded,
                        usage: desc.usage,
                    })
            }
        };

        let id = BufferId(self.mint());
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        let buffer = fetch(&self.buffers, buffer)?;
        self.queue.write_buffer(&buffer, offset, data);
        Ok(())
    }

    fn create_texture(
        &self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> Result<TextureId, GpuError> {
        let native = wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        };

        let texture = match data {
            None => self.device.create_texture(&native),
            Some(data) => self.device.create_texture_with_data(
                &self.queue,
                &native,
                TextureDataOrder::LayerMajor,
                data,
            ),
        };

        let id = TextureId(self.mint());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn create_texture_view(&self, texture: TextureId) -> Result<TextureViewId, GpuError> {
        let view = fetch(&self.textures, texture)?.create_view(&TextureViewDescriptor::default());
        let id = TextureViewId(self.mint());
        self.texture_views.insert(id, view);
        Ok(id)
    }

    fn release_texture(&self, texture: TextureId) {
        // wgpu keeps the texture alive until submitted work using it has finished
        self.textures.remove(&texture);
    }

    fn release_texture_view(&self, view: TextureViewId) {
        self.texture_views.remove(&view);
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> Result<SamplerId, GpuError> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&desc.label),
            address_mode_u: desc.address_mode,
            address_mode_v: desc.address_mode,
            address_mode_w: desc.address_mode,
            mag_filter: desc.filter,
            min_filter: desc.filter,
            ..Default::default()
        });

        let id = SamplerId(self.mint());
        self.samplers.insert(id, sampler);
        Ok(id)
    }

    fn create_bind_group(&self, desc: &BindGroupDescriptor) -> Result<BindGroupId, GpuError> {
        let layout = fetch(&self.bind_group_layouts, desc.layout)?;
        let resolved = desc
            .entries
            .iter()
            .map(|entry| Ok((entry.binding, self.resolve_binding(entry.resource)?)))
            .collect::<Result<Vec<_>, GpuError>>()?;

        let entries = resolved
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    ResolvedBinding::Buffer(buffer, offset, size) => {
                        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer,
                            offset: *offset,
                            size: NonZeroU64::new(*size),
                        })
                    }
                    ResolvedBinding::TextureView(view) => wgpu::BindingResource::TextureView(view),
                    ResolvedBinding::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect::<Vec<_>>();

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&desc.label),
            layout: &layout,
            entries: &entries,
        });

        let id = BindGroupId(self.mint());
        self.bind_groups.insert(id, group);
        Ok(id)
    }

    fn submit(&self, commands: Vec<CommandBuffer>) -> Result<(), GpuError> {
        let mut finished = Vec::with_capacity(commands.len());
        for buffer in &commands {
            let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
                label: Some(buffer.label()),
            });
            for pass in buffer.passes() {
                self.replay_pass(&mut encoder, pass)?;
            }
            finished.push(encoder.finish());
        }

        self.queue.submit(finished);
        Ok(())
    }
}
