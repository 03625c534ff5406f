use crate::assets::{Asset, AssetKind, AssetState, TextureData};
use crate::gpu::{GpuDevice, GpuError, ShaderStage};
use crate::rendering::cache::{
    GpuMaterial, GpuTexture, HandleTable, ResourceCache, ResourceHandle, ShaderModuleCache,
};
use crate::rendering::shaders;
use dashmap::DashMap;
use log::debug;
use snafu::{ResultExt, Snafu};
use std::sync::Arc;

const FALLBACK_TEXTURE_SIZE: u32 = 8;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)), visibility(pub(crate)))]
pub enum FallbackError {
    #[snafu(display("There is no fallback for {kind} resources"))]
    UnsupportedFallback { kind: AssetKind },

    #[snafu(display("Asked for a {expected} fallback of {handle}"))]
    KindMismatch {
        expected: AssetKind,
        handle: ResourceHandle,
    },

    #[snafu(display("Creating the fallback for {handle} failed: {source}"))]
    Gpu {
        handle: ResourceHandle,
        source: GpuError,
    },
}

/// Whether something that needs `asset` has to use a substitute instead.
///
/// True for failed, unloaded and unknown assets. Assets that are still loading are not
/// substituted, whatever needs them waits.
pub fn needs_fallback(asset: Option<&Asset>) -> bool {
    match asset.map(Asset::state) {
        None | Some(AssetState::Failed | AssetState::Unloaded) => true,
        Some(AssetState::Loading | AssetState::Ready) => false,
    }
}

/// Stand-ins for resources whose asset isn't usable.
///
/// Substitutes are real entries in the regular caches under their own handles, so whoever
/// asked can resolve them like any other resource. Each original handle gets exactly one
/// substitute, no matter how often it is asked for.
#[derive(Debug)]
pub struct FallbackProvider {
    device: Arc<dyn GpuDevice>,
    handles: Arc<HandleTable>,
    shaders: Arc<ShaderModuleCache>,
    textures: Arc<ResourceCache<GpuTexture>>,
    materials: Arc<ResourceCache<GpuMaterial>>,
    substitutes: DashMap<(AssetKind, u32), ResourceHandle>,
}

impl FallbackProvider {
    pub fn new(
        device: Arc<dyn GpuDevice>,
        handles: Arc<HandleTable>,
        shaders: Arc<ShaderModuleCache>,
        textures: Arc<ResourceCache<GpuTexture>>,
        materials: Arc<ResourceCache<GpuMaterial>>,
    ) -> Self {
        Self {
            device,
            handles,
            shaders,
            textures,
            materials,
            substitutes: DashMap::new(),
        }
    }

    pub fn get_fallback_resource(
        &self,
        kind: AssetKind,
        original: ResourceHandle,
    ) -> Result<ResourceHandle, FallbackError> {
        if original.kind() != kind {
            return KindMismatchErr {
                expected: kind,
                handle: original,
            }
            .fail();
        }
        if kind == AssetKind::Mesh {
            return UnsupportedFallbackErr { kind }.fail();
        }

        self.substitutes
            .entry((kind, original.id()))
            .or_try_insert_with(|| self.create_substitute(original))
            .map(|substitute| *substitute)
    }

    /// The substitute handed out for `original` so far, if any.
    pub fn substitute_of(&self, original: ResourceHandle) -> Option<ResourceHandle> {
        self.substitutes
            .get(&(original.kind(), original.id()))
            .map(|s| *s)
    }

    pub fn len(&self) -> usize {
        self.substitutes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.substitutes.is_empty()
    }

    fn create_substitute(&self, original: ResourceHandle) -> Result<ResourceHandle, FallbackError> {
        let substitute = self.handles.mint_like(original);
        debug!("[Fallback] Substituting {original} with {substitute}");

        match substitute {
            ResourceHandle::Shader(handle) => {
                let source = match handle.stage() {
                    ShaderStage::Vertex => shaders::FALLBACK_VERTEX,
                    ShaderStage::Fragment => shaders::FALLBACK_FRAGMENT,
                };
                self.shaders
                    .create_shader_module(handle, source)
                    .context(GpuErr { handle: original })?;
            }
            ResourceHandle::Texture(id) => {
                let checker =
                    TextureData::checkerboard(FALLBACK_TEXTURE_SIZE, FALLBACK_TEXTURE_SIZE);
                let texture = GpuTexture::upload(&*self.device, "Fallback Texture", &checker)
                    .context(GpuErr { handle: original })?;
                self.textures.insert(id, texture);
            }
            ResourceHandle::Material(id) => {
                self.materials.insert(id, GpuMaterial::default());
            }
            ResourceHandle::Mesh(_) => {
                return UnsupportedFallbackErr {
                    kind: AssetKind::Mesh,
                }
                .fail();
            }
        }

        Ok(substitute)
    }
}
