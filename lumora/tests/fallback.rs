use lumora::EngineConfig;
use lumora::assets::{
    Asset, AssetId, AssetKind, AssetPayload, AssetRegistry, AssetState, MaterialDesc,
    MemorySource, ShaderSource, TextureData,
};
use lumora::gpu::{HeadlessDevice, ShaderStage};
use lumora::rendering::RenderError;
use lumora::rendering::cache::{
    AssetCache, FallbackError, GpuTexture, ResourceHandle, Resolved, needs_fallback,
};
use lumora::rendering::shaders::FORWARD_VERTEX;
use std::sync::Arc;

struct Fixture {
    device: Arc<HeadlessDevice>,
    registry: Arc<AssetRegistry>,
    cache: AssetCache,
}

fn fixture_with(config: EngineConfig) -> Fixture {
    let device = HeadlessDevice::new();
    let registry = Arc::new(AssetRegistry::new());
    let cache = AssetCache::new(device.clone(), registry.clone(), &config).unwrap();
    Fixture {
        device,
        registry,
        cache,
    }
}

fn fixture() -> Fixture {
    fixture_with(EngineConfig::default())
}

fn shader(id: &str) -> Asset {
    Asset::from_payload(id, AssetPayload::Shader(ShaderSource::new(FORWARD_VERTEX)))
}

async fn failed(registry: &AssetRegistry, id: &str, kind: AssetKind) -> Arc<Asset> {
    let source = MemorySource::new();
    source.fail(id, "gone");
    let asset = registry.register_source(id, kind, source);
    registry.ensure_ready(&asset).await;
    asset
}

#[test]
fn shader_fallbacks_are_memoized() {
    let f = fixture();
    let handles = f.cache.handles();
    let a = ResourceHandle::Shader(handles.shader(&"a.wgsl".into(), ShaderStage::Vertex));
    let b = ResourceHandle::Shader(handles.shader(&"b.wgsl".into(), ShaderStage::Vertex));

    let first = f
        .cache
        .fallback()
        .get_fallback_resource(AssetKind::Shader, a)
        .unwrap();
    let again = f
        .cache
        .fallback()
        .get_fallback_resource(AssetKind::Shader, a)
        .unwrap();
    let other = f
        .cache
        .fallback()
        .get_fallback_resource(AssetKind::Shader, b)
        .unwrap();

    assert_eq!(first, again);
    assert_ne!(first, other);
    assert_ne!(first, a);
    assert_eq!(f.cache.fallback().substitute_of(a), Some(first));
    assert_eq!(f.cache.fallback().len(), 2);
    assert_eq!(f.device.stats().shader_modules, 2);
}

#[test]
fn shader_fallbacks_keep_the_stage() {
    let f = fixture();
    let id = AssetId::from("broken.wgsl");

    for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
        let original = ResourceHandle::Shader(f.cache.handles().shader(&id, stage));
        let substitute = f
            .cache
            .fallback()
            .get_fallback_resource(AssetKind::Shader, original)
            .unwrap()
            .as_shader()
            .unwrap();
        assert_eq!(substitute.stage(), stage);

        let module = f.cache.shaders().get(substitute).unwrap();
        assert_eq!(f.device.shader_stage(module), Some(stage));
    }
}

#[test]
fn meshes_have_no_fallback() {
    let f = fixture();
    let mesh = f.cache.handles().for_asset(&"cube.obj".into(), AssetKind::Mesh);

    let err = f
        .cache
        .fallback()
        .get_fallback_resource(AssetKind::Mesh, mesh)
        .unwrap_err();
    assert!(matches!(
        err,
        FallbackError::UnsupportedFallback {
            kind: AssetKind::Mesh
        }
    ));
}

#[test]
fn kinds_must_match_the_handle() {
    let f = fixture();
    let texture = f.cache.handles().for_asset(&"t.png".into(), AssetKind::Texture);

    let err = f
        .cache
        .fallback()
        .get_fallback_resource(AssetKind::Material, texture)
        .unwrap_err();
    assert!(matches!(err, FallbackError::KindMismatch { .. }));
    assert!(f.cache.fallback().is_empty());
}

#[tokio::test]
async fn needs_fallback_follows_the_state() {
    let f = fixture();
    let ready = f.registry.register(shader("ready.wgsl"));
    let placeholder = f
        .registry
        .register(Asset::placeholder("later.wgsl", AssetKind::Shader));
    let broken = failed(&f.registry, "broken.wgsl", AssetKind::Shader).await;

    let source = MemorySource::new();
    source.insert("slow.wgsl", FORWARD_VERTEX);
    let _hold = source.hold("slow.wgsl");
    let loading = f
        .registry
        .register_source("slow.wgsl", AssetKind::Shader, source);
    tokio::spawn({
        let loading = loading.clone();
        async move {
            let _ = loading.load().await;
        }
    });
    loading
        .subscribe()
        .wait_for(|s| *s == AssetState::Loading)
        .await
        .unwrap();

    assert!(!needs_fallback(Some(&*ready)));
    assert!(!needs_fallback(Some(&*loading)));
    assert!(needs_fallback(Some(&*placeholder)));
    assert!(needs_fallback(Some(&*broken)));
    assert!(needs_fallback(None));

    assert_eq!(
        f.cache.shader(loading.id(), ShaderStage::Vertex).unwrap(),
        Resolved::Pending
    );
}

#[tokio::test]
async fn failed_shaders_resolve_to_one_substitute() {
    let f = fixture();
    let broken = failed(&f.registry, "broken.wgsl", AssetKind::Shader).await;

    let first = f.cache.shader(broken.id(), ShaderStage::Fragment).unwrap();
    let second = f.cache.shader(broken.id(), ShaderStage::Fragment).unwrap();

    assert!(first.is_substitute());
    assert_eq!(first, second);
    assert_eq!(f.device.stats().shader_modules, 1);
}

#[test]
fn ready_shaders_compile_once_per_stage() {
    let f = fixture();
    let asset = f.registry.register(shader("forward.wgsl"));

    let (vertex, fragment) = f.cache.shader_pair(asset.id(), asset.id()).unwrap();
    assert!(matches!(vertex, Resolved::Ready(_)));
    assert!(matches!(fragment, Resolved::Ready(_)));
    assert_ne!(vertex, fragment);
    assert_eq!(f.cache.shader(asset.id(), ShaderStage::Vertex).unwrap(), vertex);
    assert_eq!(f.device.stats().shader_modules, 2);
    assert!(asset.cpu_data().is_none());
    assert!(asset.is_ready());
}

#[test]
fn shader_source_stays_while_a_requested_stage_is_missing() {
    let f = fixture();
    let asset = f.registry.register(shader("forward.wgsl"));
    f.cache.handles().shader(asset.id(), ShaderStage::Fragment);

    f.cache.shader(asset.id(), ShaderStage::Vertex).unwrap();
    assert!(asset.cpu_data().is_some());

    f.cache.shader(asset.id(), ShaderStage::Fragment).unwrap();
    assert!(asset.cpu_data().is_none());
}

#[test]
fn single_stage_shader_files_drop_their_source() {
    let f = fixture();
    let vertex = f.registry.register(shader("vertex.wgsl"));
    let fragment = f.registry.register(shader("fragment.wgsl"));

    let (v, fr) = f.cache.shader_pair(vertex.id(), fragment.id()).unwrap();
    assert!(matches!((v, fr), (Resolved::Ready(_), Resolved::Ready(_))));
    assert!(vertex.cpu_data().is_none());
    assert!(fragment.cpu_data().is_none());
    assert!(vertex.is_ready() && fragment.is_ready());
}

#[test]
fn shader_source_survives_when_kept() {
    let f = fixture_with(EngineConfig::builder().keep_shader_source(true).build());
    let asset = f.registry.register(shader("forward.wgsl"));

    f.cache.shader(asset.id(), ShaderStage::Vertex).unwrap();
    f.cache.shader(asset.id(), ShaderStage::Fragment).unwrap();
    assert!(asset.cpu_data().is_some());
}

#[test]
fn shaders_that_fail_to_compile_fall_back() {
    let f = fixture();
    let asset = f.registry.register(shader("forward.wgsl"));
    f.device.fail_next_shader_modules(1);

    let resolved = f.cache.shader(asset.id(), ShaderStage::Vertex).unwrap();
    assert!(resolved.is_substitute());
}

#[tokio::test]
async fn failed_textures_get_the_checkerboard() {
    let f = fixture();
    let broken = failed(&f.registry, "broken.png", AssetKind::Texture).await;

    let resolved = f.cache.texture(Some(broken.id())).unwrap();
    let Resolved::Substitute(texture) = resolved else {
        panic!("expected a substitute, got {resolved:?}");
    };
    assert_eq!((texture.width, texture.height), (8, 8));
    assert_eq!(f.cache.texture(Some(broken.id())).unwrap(), resolved);

    let desc = f.device.texture_descriptor(texture.texture).unwrap();
    assert_eq!(desc.format, GpuTexture::FORMAT);
}

#[test]
fn missing_textures_use_the_white_default() {
    let f = fixture();
    let resolved = f.cache.texture(None).unwrap();
    assert_eq!(resolved, Resolved::Ready(f.cache.default_texture()));
    let texture = resolved.value().unwrap();
    assert_eq!((texture.width, texture.height), (1, 1));
}

#[test]
fn ready_textures_upload_once_and_drop_cpu_data() {
    let f = fixture();
    let asset = f.registry.register(Asset::from_payload(
        "tile.png",
        AssetPayload::Texture(TextureData::solid(4, 4, [255, 0, 0, 255])),
    ));
    let textures_before = f.device.stats().textures;

    let first = f.cache.texture(Some(asset.id())).unwrap();
    let second = f.cache.texture(Some(asset.id())).unwrap();

    assert!(matches!(first, Resolved::Ready(_)));
    assert_eq!(first, second);
    assert_eq!(f.device.stats().textures, textures_before + 1);
    assert!(asset.cpu_data().is_none());
}

#[test]
fn cpu_data_stays_when_discarding_is_off() {
    let f = fixture_with(EngineConfig::builder().discard_cpu_data(false).build());
    let asset = f.registry.register(Asset::from_payload(
        "tile.png",
        AssetPayload::Texture(TextureData::checkerboard(2, 2)),
    ));

    f.cache.texture(Some(asset.id())).unwrap();
    assert!(asset.cpu_data().is_some());
}

#[tokio::test]
async fn meshes_that_are_not_ready_are_errors() {
    let f = fixture();
    let broken = failed(&f.registry, "broken.obj", AssetKind::Mesh).await;

    let err = f.cache.mesh(broken.id()).unwrap_err();
    assert!(matches!(
        err,
        RenderError::Fallback {
            source: FallbackError::UnsupportedFallback { .. }
        }
    ));

    let unknown = f.cache.mesh(&"unknown.obj".into()).unwrap_err();
    assert!(matches!(unknown, RenderError::Fallback { .. }));
}

#[tokio::test]
async fn failed_materials_fall_back_to_the_default() {
    let f = fixture();
    let broken = failed(&f.registry, "broken.json", AssetKind::Material).await;

    let resolved = f.cache.material(Some(broken.id())).unwrap();
    assert!(resolved.is_substitute());
    let material = resolved.value().unwrap();
    assert_eq!(material.base_color, MaterialDesc::default().base_color);

    let crate_material = f.registry.register(Asset::from_payload(
        "crate.json",
        AssetPayload::Material(
            MaterialDesc::builder()
                .name("Crate")
                .base_color([1.0, 0.0, 0.0, 1.0])
                .build(),
        ),
    ));
    let resolved = f.cache.material(Some(crate_material.id())).unwrap();
    assert!(matches!(resolved, Resolved::Ready(_)));
    assert_eq!(resolved.value().unwrap().name, "Crate");
}
