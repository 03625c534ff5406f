use crate::assets::AssetId;
use bon::Builder;
use nalgebra::{Matrix4, Unit, UnitQuaternion, Vector3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::repeat(1.0),
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vector3<f32>) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    pub fn matrix(&self) -> Matrix4<f32> {
        Matrix4::new_translation(&self.translation)
            * self.rotation.to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&self.scale)
    }
}

/// Constant rotation around an axis, advanced by [`SceneGraph::update`](crate::scene::SceneGraph::update).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spin {
    pub axis: Unit<Vector3<f32>>,
    pub degrees_per_second: f32,
}

impl Spin {
    pub fn new(axis: Unit<Vector3<f32>>, degrees_per_second: f32) -> Self {
        Self {
            axis,
            degrees_per_second,
        }
    }
}

/// Something to draw: a mesh, optionally textured and with a material.
#[derive(Debug, Clone, Builder)]
pub struct Renderable {
    #[builder(into)]
    pub name: String,
    #[builder(into)]
    pub mesh: AssetId,
    #[builder(into)]
    pub material: Option<AssetId>,
    #[builder(into)]
    pub texture: Option<AssetId>,
    #[builder(default)]
    pub transform: Transform,
    pub spin: Option<Spin>,
    #[builder(default = true)]
    pub visible: bool,
}

impl Renderable {
    /// Every asset this renderable draws with.
    pub fn assets(&self) -> impl Iterator<Item = &AssetId> {
        std::iter::once(&self.mesh)
            .chain(self.material.as_ref())
            .chain(self.texture.as_ref())
    }

    pub fn update(&mut self, delta_time: f32) {
        let Some(spin) = self.spin else {
            return;
        };

        let angle = spin.degrees_per_second.to_radians() * delta_time;
        let step = UnitQuaternion::from_axis_angle(&spin.axis, angle);
        self.transform.rotation = step * self.transform.rotation;
    }
}
