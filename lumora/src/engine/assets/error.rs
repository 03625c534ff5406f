use crate::assets::{AssetId, AssetKind};
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)), visibility(pub(crate)))]
pub enum FetchError {
    #[snafu(display("\"{path}\" does not exist in {source_name}"))]
    NotFound { path: String, source_name: String },

    #[snafu(display("Failed to read \"{}\": {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Fetching \"{path}\" failed: {reason}"))]
    Injected { path: String, reason: String },
}

/// Why an asset ended up `Failed`. Recorded on the asset and handed to whoever drove the load.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)), visibility(pub(crate)))]
pub enum AssetError {
    #[snafu(display("Failed to fetch {kind} \"{id}\": {source}"))]
    Fetch {
        id: AssetId,
        kind: AssetKind,
        source: FetchError,
    },

    #[snafu(display("Shader \"{id}\" is not valid UTF-8: {source}"))]
    Utf8 {
        id: AssetId,
        source: std::string::FromUtf8Error,
    },

    #[snafu(display("Shader \"{id}\" did not validate: {message}"))]
    InvalidShader { id: AssetId, message: String },

    #[snafu(display("Texture \"{id}\" could not be decoded: {source}"))]
    Image {
        id: AssetId,
        source: image::ImageError,
    },

    #[snafu(display("Mesh \"{id}\" could not be parsed: {source}"))]
    Mesh { id: AssetId, source: obj::ObjError },

    #[snafu(display("Mesh \"{id}\" refers to a missing vertex attribute at index {index}"))]
    MeshIndex { id: AssetId, index: usize },

    #[snafu(display("Mesh \"{id}\" has no triangles"))]
    EmptyMesh { id: AssetId },

    #[snafu(display("Material \"{id}\" could not be parsed: {source}"))]
    Material {
        id: AssetId,
        source: serde_json::Error,
    },

    #[snafu(display("Loading \"{id}\" was abandoned before it finished"))]
    Abandoned { id: AssetId },
}
