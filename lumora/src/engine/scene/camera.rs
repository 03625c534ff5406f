use crate::rendering::{RenderTarget, Renderer};
use crate::scene::SceneHandle;
use nalgebra::{Isometry3, Matrix4, Perspective3, Point3, Vector3};
use std::sync::Arc;

/// Maps OpenGL clip depth (-1..1) to wgpu's (0..1).
#[rustfmt::skip]
fn opengl_to_wgpu() -> Matrix4<f32> {
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.5, 0.5,
        0.0, 0.0, 0.0, 1.0,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov: 60.0,
            near: 0.01,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn matrix(&self, aspect: f32) -> Matrix4<f32> {
        let perspective = Perspective3::new(aspect, self.fov.to_radians(), self.near, self.far);
        opengl_to_wgpu() * perspective.to_homogeneous()
    }
}

/// A view into one scene, drawn by exactly one renderer into one target.
///
/// The renderer is fixed at construction. The same renderer may serve many cameras.
#[derive(Debug, Clone)]
pub struct Camera {
    name: String,
    scene: SceneHandle,
    renderer: Arc<dyn Renderer>,
    target: RenderTarget,
    pub order: i32,
    pub enabled: bool,
    pub projection: Projection,
    pub eye: Point3<f32>,
    pub look_at: Point3<f32>,
    pub up: Vector3<f32>,
}

impl Camera {
    pub fn new(
        name: impl Into<String>,
        scene: SceneHandle,
        renderer: Arc<dyn Renderer>,
        target: RenderTarget,
    ) -> Self {
        Self {
            name: name.into(),
            scene,
            renderer,
            target,
            order: 0,
            enabled: true,
            projection: Projection::default(),
            eye: Point3::new(0.0, 0.0, 5.0),
            look_at: Point3::origin(),
            up: Vector3::y(),
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn looking_at(mut self, eye: Point3<f32>, target: Point3<f32>) -> Self {
        self.eye = eye;
        self.look_at = target;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scene(&self) -> SceneHandle {
        self.scene
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    /// Points the camera at another target, e.g. a resized off-screen texture. Textures
    /// the engine allocated for the old one are released on the next frame.
    pub fn set_target(&mut self, target: RenderTarget) {
        self.target = target;
    }

    pub fn view(&self) -> Matrix4<f32> {
        Isometry3::look_at_rh(&self.eye, &self.look_at, &self.up).to_homogeneous()
    }

    pub fn view_projection(&self, aspect: f32) -> Matrix4<f32> {
        self.projection.matrix(aspect) * self.view()
    }
}
