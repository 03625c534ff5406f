use crate::gpu::TextureViewId;
use dashmap::DashMap;
use log::trace;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Name of an on-screen surface managed outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SurfaceId(Arc<str>);

impl SurfaceId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }
}

impl From<&str> for SurfaceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Display for SurfaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An engine-owned texture to render into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffscreenTarget {
    pub width: u32,
    pub height: u32,
    /// `None` uses the engine's configured surface format.
    pub format: Option<wgpu::TextureFormat>,
}

impl OffscreenTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: None,
        }
    }

    pub fn with_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Where a camera's image goes.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderTarget {
    Surface(SurfaceId),
    Offscreen(OffscreenTarget),
}

/// The current texture of a surface, as published by whoever owns the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceFrame {
    pub view: TextureViewId,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

/// A render target resolved for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTarget {
    pub view: TextureViewId,
    pub depth_view: Option<TextureViewId>,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl ResolvedTarget {
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Current textures of every on-screen surface.
///
/// The canvas manager publishes a surface's texture before each frame and withdraws it when
/// the surface is lost or resized away. Cameras targeting a surface without a published
/// texture are skipped.
#[derive(Debug, Default)]
pub struct SurfaceRegistry {
    surfaces: DashMap<SurfaceId, SurfaceFrame>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, id: impl Into<SurfaceId>, frame: SurfaceFrame) {
        let id = id.into();
        trace!("[Surfaces] {id} now shows {}", frame.view);
        self.surfaces.insert(id, frame);
    }

    pub fn withdraw(&self, id: &SurfaceId) -> Option<SurfaceFrame> {
        self.surfaces.remove(id).map(|(_, frame)| frame)
    }

    pub fn get(&self, id: &SurfaceId) -> Option<SurfaceFrame> {
        self.surfaces.get(id).map(|f| *f)
    }
}
