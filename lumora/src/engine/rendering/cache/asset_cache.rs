use crate::assets::{Asset, AssetId, AssetKind, AssetRegistry, AssetState, TextureData};
use crate::config::EngineConfig;
use crate::gpu::{GpuDevice, GpuError, SamplerDescriptor, SamplerId, ShaderModuleId, ShaderStage};
use crate::rendering::cache::{
    FallbackProvider, GpuMaterial, GpuMesh, GpuTexture, HandleTable, PipelineCache,
    ResourceCache, ResourceHandle, ShaderHandle, ShaderModuleCache, needs_fallback,
};
use crate::rendering::{
    FallbackErr, GpuErr, MeshUnavailableErr, NoCpuDataErr, RenderError, ShaderNotReadyErr,
};
use log::{trace, warn};
use parking_lot::Mutex;
use snafu::ResultExt;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Outcome of resolving an asset into something drawable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<T> {
    /// The asset's own resource.
    Ready(T),
    /// A fallback, because the asset failed or will never load.
    Substitute(T),
    /// The asset is still loading. Whatever needs it should skip this frame.
    Pending,
}

impl<T> Resolved<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Resolved::Ready(v) | Resolved::Substitute(v) => Some(v),
            Resolved::Pending => None,
        }
    }

    pub fn is_substitute(&self) -> bool {
        matches!(self, Resolved::Substitute(_))
    }
}

/// When CPU copies of uploaded assets are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub discard_cpu_data: bool,
    pub keep_shader_source: bool,
}

impl From<&EngineConfig> for CachePolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            discard_cpu_data: config.discard_cpu_data,
            keep_shader_source: config.keep_shader_source,
        }
    }
}

/// All GPU-side state derived from assets, shared by every renderer and camera.
#[derive(Debug)]
pub struct AssetCache {
    device: Arc<dyn GpuDevice>,
    registry: Arc<AssetRegistry>,
    policy: CachePolicy,
    handles: Arc<HandleTable>,
    shaders: Arc<ShaderModuleCache>,
    textures: Arc<ResourceCache<GpuTexture>>,
    meshes: ResourceCache<GpuMesh>,
    materials: Arc<ResourceCache<GpuMaterial>>,
    pipelines: PipelineCache,
    fallback: FallbackProvider,
    default_texture: GpuTexture,
    default_material: Arc<GpuMaterial>,
    sampler: SamplerId,
    shader_compile: Mutex<()>,
}

impl AssetCache {
    pub fn new(
        device: Arc<dyn GpuDevice>,
        registry: Arc<AssetRegistry>,
        config: &EngineConfig,
    ) -> Result<Self, GpuError> {
        let handles = Arc::new(HandleTable::new());
        let shaders = Arc::new(ShaderModuleCache::new(device.clone()));
        let textures = Arc::new(ResourceCache::new());
        let materials = Arc::new(ResourceCache::new());
        let fallback = FallbackProvider::new(
            device.clone(),
            handles.clone(),
            shaders.clone(),
            textures.clone(),
            materials.clone(),
        );

        let default_texture = GpuTexture::upload(
            &*device,
            "Default White Texture",
            &TextureData::solid(1, 1, [255; 4]),
        )?;
        let sampler = device.create_sampler(&SamplerDescriptor::default())?;

        Ok(Self {
            device,
            registry,
            policy: CachePolicy::from(config),
            handles,
            shaders,
            textures,
            meshes: ResourceCache::new(),
            materials,
            pipelines: PipelineCache::new(
                config.pipeline_retry_cooldown,
                config.pipeline_retry_max_cooldown,
            ),
            fallback,
            default_texture,
            default_material: Arc::new(GpuMaterial::default()),
            sampler,
            shader_compile: Mutex::new(()),
        })
    }

    /// Spawns background pipeline builds onto `runtime`.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        let pipelines = std::mem::take(&mut self.pipelines);
        self.pipelines = pipelines.with_runtime(runtime);
        self
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    pub fn registry(&self) -> &Arc<AssetRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn shaders(&self) -> &ShaderModuleCache {
        &self.shaders
    }

    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    pub fn fallback(&self) -> &FallbackProvider {
        &self.fallback
    }

    pub fn sampler(&self) -> SamplerId {
        self.sampler
    }

    pub fn default_texture(&self) -> GpuTexture {
        self.default_texture
    }

    /// The compiled module for `id` at `stage`.
    ///
    /// Ready shaders are compiled on first use, exactly once per stage. Failed, unloaded and
    /// unknown shaders, and ones that don't compile, get the fallback shader of that stage.
    pub fn shader(
        &self,
        id: &AssetId,
        stage: ShaderStage,
    ) -> Result<Resolved<ShaderModuleId>, RenderError> {
        let handle = self.handles.shader(id, stage);
        if let Some(module) = self.shaders.get(handle) {
            return Ok(Resolved::Ready(module));
        }

        let asset = self.registry.get(id);
        match asset.as_deref().map(Asset::state) {
            Some(AssetState::Loading) => return Ok(Resolved::Pending),
            Some(AssetState::Ready) => {
                if let Some(module) = asset.as_deref().and_then(|a| self.compile(a, handle)) {
                    return Ok(Resolved::Ready(module));
                }
            }
            _ => {}
        }

        let substitute = self
            .fallback
            .get_fallback_resource(AssetKind::Shader, ResourceHandle::Shader(handle))
            .context(FallbackErr)?;
        substitute
            .as_shader()
            .and_then(|h| self.shaders.get(h))
            .map(Resolved::Substitute)
            .ok_or_else(|| ShaderNotReadyErr { id: id.clone() }.build())
    }

    /// Resolves the two stages of a pipeline together. Both stages are requested before
    /// either compiles, so a file holding both keeps its source until both are built.
    pub fn shader_pair(
        &self,
        vertex: &AssetId,
        fragment: &AssetId,
    ) -> Result<(Resolved<ShaderModuleId>, Resolved<ShaderModuleId>), RenderError> {
        self.handles.shader(vertex, ShaderStage::Vertex);
        self.handles.shader(fragment, ShaderStage::Fragment);
        Ok((
            self.shader(vertex, ShaderStage::Vertex)?,
            self.shader(fragment, ShaderStage::Fragment)?,
        ))
    }

    fn compile(&self, asset: &Asset, handle: ShaderHandle) -> Option<ShaderModuleId> {
        let _compiling = self.shader_compile.lock();
        if let Some(module) = self.shaders.get(handle) {
            return Some(module);
        }

        let Some(payload) = asset.cpu_data() else {
            warn!("[Shader Cache] \"{}\" is ready, but its source was discarded", asset.id());
            return None;
        };
        let Some(source) = payload.as_shader() else {
            warn!("[Shader Cache] \"{}\" is not a shader", asset.id());
            return None;
        };

        let module = self.shaders.create_shader_module(handle, source.code()).ok()?;
        trace!("[Shader Cache] Compiled {} stage of \"{}\"", handle.stage(), asset.id());

        // Only drop the source once every stage requested from this asset is compiled
        let other_stage = match handle.stage() {
            ShaderStage::Vertex => ShaderStage::Fragment,
            ShaderStage::Fragment => ShaderStage::Vertex,
        };
        let other_waiting = self
            .handles
            .peek_shader(asset.id(), other_stage)
            .is_some_and(|h| self.shaders.get(h).is_none());
        if self.policy.discard_cpu_data && !self.policy.keep_shader_source && !other_waiting {
            asset.discard_cpu_data();
        }

        Some(module)
    }

    /// The texture for `id`, or the shared white texture when there is none.
    pub fn texture(&self, id: Option<&AssetId>) -> Result<Resolved<GpuTexture>, RenderError> {
        let Some(id) = id else {
            return Ok(Resolved::Ready(self.default_texture));
        };

        let handle = self.handles.for_asset(id, AssetKind::Texture);
        let asset = self.registry.get(id);
        match asset.as_deref().map(Asset::state) {
            Some(AssetState::Loading) => return Ok(Resolved::Pending),
            Some(AssetState::Ready) => {
                if let Some(asset) = asset.as_deref() {
                    match self.upload_texture(asset, handle) {
                        Ok(texture) => return Ok(Resolved::Ready(texture)),
                        Err(e) => warn!("[Texture Cache] {e}, using the fallback"),
                    }
                }
            }
            _ => {}
        }

        let substitute = self
            .fallback
            .get_fallback_resource(AssetKind::Texture, handle)
            .context(FallbackErr)?;
        self.textures
            .get(substitute.id())
            .map(|t| Resolved::Substitute(*t))
            .ok_or_else(|| NoCpuDataErr { id: id.clone() }.build())
    }

    fn upload_texture(
        &self,
        asset: &Asset,
        handle: ResourceHandle,
    ) -> Result<GpuTexture, RenderError> {
        let texture = self.textures.get_or_try_insert_with(handle.id(), || {
            let payload = asset.cpu_data();
            let data = payload
                .as_deref()
                .and_then(|p| p.as_texture())
                .ok_or_else(|| NoCpuDataErr { id: asset.id().clone() }.build())?;
            let texture = GpuTexture::upload(&*self.device, asset.id().to_string(), data)
                .context(GpuErr)?;
            if self.policy.discard_cpu_data {
                asset.discard_cpu_data();
            }
            Ok::<_, RenderError>(texture)
        })?;
        Ok(*texture)
    }

    /// The uploaded mesh of `id`. Meshes have no fallback, so anything not ready is an error
    /// the caller is expected to skip over.
    pub fn mesh(&self, id: &AssetId) -> Result<Arc<GpuMesh>, RenderError> {
        let handle = self.handles.for_asset(id, AssetKind::Mesh);
        let asset = self.registry.get(id);

        if needs_fallback(asset.as_deref()) {
            self.fallback
                .get_fallback_resource(AssetKind::Mesh, handle)
                .context(FallbackErr)?;
        }

        let asset = match asset {
            Some(asset) if asset.is_ready() => asset,
            other => {
                return MeshUnavailableErr {
                    id: id.clone(),
                    state: other.map(|a| a.state()),
                }
                .fail();
            }
        };

        self.meshes.get_or_try_insert_with(handle.id(), || {
            let payload = asset.cpu_data();
            let data = payload
                .as_deref()
                .and_then(|p| p.as_mesh())
                .ok_or_else(|| NoCpuDataErr { id: id.clone() }.build())?;
            let mesh = GpuMesh::upload(&*self.device, id.as_str(), data).context(GpuErr)?;
            if self.policy.discard_cpu_data {
                asset.discard_cpu_data();
            }
            Ok::<_, RenderError>(mesh)
        })
    }

    /// The material for `id`, or the default material when there is none.
    pub fn material(&self, id: Option<&AssetId>) -> Result<Resolved<Arc<GpuMaterial>>, RenderError> {
        let Some(id) = id else {
            return Ok(Resolved::Ready(self.default_material.clone()));
        };

        let handle = self.handles.for_asset(id, AssetKind::Material);
        let asset = self.registry.get(id);
        match asset.as_deref().map(Asset::state) {
            Some(AssetState::Loading) => return Ok(Resolved::Pending),
            Some(AssetState::Ready) => {
                let material = asset.as_deref().and_then(|asset| {
                    let payload = asset.cpu_data()?;
                    let desc = payload.as_material()?;
                    self.materials
                        .get_or_try_insert_with(handle.id(), || {
                            Ok::<_, RenderError>(GpuMaterial::from(desc))
                        })
                        .ok()
                });
                if let Some(material) = material {
                    return Ok(Resolved::Ready(material));
                }
                warn!("[Material Cache] \"{id}\" has no usable material data, using the fallback");
            }
            _ => {}
        }

        let substitute = self
            .fallback
            .get_fallback_resource(AssetKind::Material, handle)
            .context(FallbackErr)?;
        self.materials
            .get(substitute.id())
            .map(Resolved::Substitute)
            .ok_or_else(|| NoCpuDataErr { id: id.clone() }.build())
    }
}
