//! Scenes of renderables, observed by cameras.
//!
//! A [`SceneGraph`] owns every scene and camera. Cameras name their scene by a
//! [`SceneHandle`] that also remembers the graph it came from, so a camera built against
//! another graph's scene is rejected when it is added.

mod camera;
mod error;
mod graph;
mod renderable;

pub use camera::*;
pub use error::*;
pub use graph::*;
pub use renderable::*;

slotmap::new_key_type! {
    pub struct SceneId;
    pub struct CameraId;
}
