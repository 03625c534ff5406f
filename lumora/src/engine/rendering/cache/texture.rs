use crate::assets::TextureData;
use crate::gpu::{GpuDevice, GpuError, TextureDescriptor, TextureId, TextureViewId};
use crate::rendering::cache::CacheType;
use std::borrow::Cow;

/// A sampled 2D texture living on the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuTexture {
    pub texture: TextureId,
    pub view: TextureViewId,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    pub fn upload(
        device: &dyn GpuDevice,
        label: impl Into<Cow<'static, str>>,
        data: &TextureData,
    ) -> Result<Self, GpuError> {
        let desc = TextureDescriptor {
            label: label.into(),
            width: data.width,
            height: data.height,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        };

        let texture = device.create_texture(&desc, Some(&data.rgba))?;
        let view = device.create_texture_view(texture)?;

        Ok(Self {
            texture,
            view,
            width: data.width,
            height: data.height,
        })
    }
}

impl CacheType for GpuTexture {
    fn name() -> &'static str {
        "Texture"
    }
}
