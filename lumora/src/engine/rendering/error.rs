use crate::assets::{AssetId, AssetState};
use crate::gpu::GpuError;
use crate::rendering::cache::FallbackError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)), visibility(pub(crate)))]
pub enum RenderError {
    #[snafu(display("Render target of camera \"{camera}\" is unavailable: {reason}"))]
    TargetUnresolvable { camera: String, reason: String },

    #[snafu(display("{source}"))]
    Fallback { source: FallbackError },

    #[snafu(display("GPU error: {source}"))]
    Gpu { source: GpuError },

    #[snafu(display("Shader \"{id}\" has no usable module"))]
    ShaderNotReady { id: AssetId },

    #[snafu(display("Mesh \"{id}\" is not available ({state:?})"))]
    MeshUnavailable {
        id: AssetId,
        state: Option<AssetState>,
    },

    #[snafu(display("{id} is ready, but its CPU data is gone or of the wrong kind"))]
    NoCpuData { id: AssetId },
}
