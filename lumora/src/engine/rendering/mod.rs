//! Turning scenes into GPU commands.
//!
//! [`RenderOrchestrator`] owns the frame: it resolves each camera's target, hands the camera
//! to its [`Renderer`] and submits once at the end. Renderers pull GPU resources through
//! [`cache::AssetCache`], which substitutes fallbacks for assets that failed or never load
//! and reports assets still in flight as pending.

pub mod cache;
pub mod shaders;

mod context;
mod error;
mod forward;
mod orchestrator;
mod renderer;
mod target;
mod uniform;

pub use context::*;
pub use error::*;
pub use forward::*;
pub use orchestrator::*;
pub use renderer::*;
pub use target::*;
pub use uniform::*;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
