use super::{BindGroupLayoutId, BufferId, SamplerId, ShaderModuleId, ShaderStage, TextureViewId};
use std::borrow::Cow;

#[derive(Debug, Clone, Copy)]
pub struct ShaderModuleDescriptor<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub stage: ShaderStage,
}

#[derive(Debug, Clone)]
pub struct BindGroupLayoutDescriptor {
    pub label: Cow<'static, str>,
    pub entries: Vec<wgpu::BindGroupLayoutEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexLayout {
    pub array_stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

/// Everything needed to build a render pipeline.
///
/// Owned so it can be moved into a background build.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor {
    pub label: String,
    pub bind_group_layouts: Vec<BindGroupLayoutId>,
    pub vertex_module: ShaderModuleId,
    pub fragment_module: ShaderModuleId,
    pub vertex_layouts: Vec<VertexLayout>,
    pub color_format: wgpu::TextureFormat,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub primitive: wgpu::PrimitiveState,
}

#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Cow<'static, str>,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: Cow<'static, str>,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

impl TextureDescriptor {
    pub fn byte_size(&self) -> Option<u64> {
        let block = self.format.block_copy_size(None)?;
        Some(self.width as u64 * self.height as u64 * block as u64)
    }
}

#[derive(Debug, Clone)]
pub struct SamplerDescriptor {
    pub label: Cow<'static, str>,
    pub filter: wgpu::FilterMode,
    pub address_mode: wgpu::AddressMode,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: Cow::Borrowed("Default Sampler"),
            filter: wgpu::FilterMode::Linear,
            address_mode: wgpu::AddressMode::Repeat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingResource {
    Buffer {
        buffer: BufferId,
        offset: u64,
        size: u64,
    },
    TextureView(TextureViewId),
    Sampler(SamplerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub resource: BindingResource,
}

#[derive(Debug, Clone)]
pub struct BindGroupDescriptor {
    pub label: Cow<'static, str>,
    pub layout: BindGroupLayoutId,
    pub entries: Vec<BindGroupEntry>,
}
