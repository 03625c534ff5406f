use crate::rendering::ResolvedTarget;
use crate::scene::{Camera, CameraId, Scene};

/// Everything a renderer needs to draw one camera in one frame. Never outlives the frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub camera_id: CameraId,
    pub camera: &'a Camera,
    pub scene: &'a Scene,
    pub target: ResolvedTarget,
    pub frame: u64,
    pub clear_color: wgpu::Color,
}
