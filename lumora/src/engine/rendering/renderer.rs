use crate::assets::AssetId;
use crate::gpu::FrameEncoder;
use crate::rendering::cache::AssetCache;
use crate::rendering::{RenderContext, RenderError};
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Drawn { draws: usize, skipped: usize },
    /// The pipeline is still being built, nothing was recorded.
    PipelinePending,
    /// Shaders are still loading, nothing was recorded.
    AssetsPending,
}

/// Turns a camera's view of its scene into recorded draw commands.
///
/// One renderer may serve many cameras, so all methods take `&self`.
pub trait Renderer: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Lower priorities run first.
    fn priority(&self) -> i32 {
        0
    }

    /// Assets this renderer needs regardless of the scene, like its shaders.
    fn assets(&self) -> Vec<AssetId> {
        Vec::new()
    }

    /// Called once per frame before any camera is rendered.
    fn prepare(&self, cache: &AssetCache) -> Result<(), RenderError> {
        let _ = cache;
        Ok(())
    }

    /// Records the camera's draws into `encoder`. Never submits.
    fn render(
        &self,
        encoder: &mut FrameEncoder,
        ctx: &RenderContext,
        cache: &AssetCache,
    ) -> Result<RenderOutcome, RenderError>;
}
