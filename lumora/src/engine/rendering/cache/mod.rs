//! GPU resources derived from assets, created lazily and kept for the engine's lifetime.

mod asset_cache;
mod fallback;
mod generic_cache;
mod handle;
mod material;
mod mesh;
mod pipeline;
mod shader;
mod texture;

pub use asset_cache::*;
pub use fallback::*;
pub use generic_cache::*;
pub use handle::*;
pub use material::*;
pub use mesh::*;
pub use pipeline::*;
pub use shader::*;
pub use texture::*;
