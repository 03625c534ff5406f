use crate::scene::{CameraId, SceneHandle};
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)), visibility(pub(crate)))]
pub enum SceneError {
    #[snafu(display("Camera \"{camera}\" belongs to a scene of another graph"))]
    MismatchedOwnership { camera: String },

    #[snafu(display("No scene {handle:?} in this graph"))]
    UnknownScene { handle: SceneHandle },

    #[snafu(display("No camera {id:?} in this graph"))]
    UnknownCamera { id: CameraId },
}
