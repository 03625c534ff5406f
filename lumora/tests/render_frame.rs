use lumora::EngineConfig;
use lumora::assets::{
    Asset, AssetKind, AssetPayload, AssetRegistry, AssetState, MaterialDesc, MemorySource,
    MeshData, ShaderSource, Vertex3D,
};
use lumora::gpu::{BindingResource, FrameEncoder, HeadlessDevice, RenderCommand};
use lumora::rendering::cache::AssetCache;
use lumora::rendering::{
    ForwardRenderer, FrameReport, MODEL_SLOT_STRIDE, OffscreenTarget, RenderContext, RenderError,
    RenderOrchestrator, RenderOutcome, RenderTarget, Renderer, SurfaceFrame, SurfaceId,
    register_builtin_shaders,
};
use lumora::scene::{Camera, CameraId, Renderable, Scene, SceneGraph, SceneHandle};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const QUAD: &str = "quad.obj";
const TRIANGLE: &str = "triangle.obj";
const SLOW_OBJ: &str = "\
v 0 0 0
v 1 0 0
v 0 1 0
vt 0 0
vt 1 0
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1
";
const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

fn quad() -> MeshData {
    let n = [0.0, 0.0, 1.0];
    MeshData::new(
        vec![
            Vertex3D::new([-1.0, -1.0, 0.0], n, [0.0, 1.0]),
            Vertex3D::new([1.0, -1.0, 0.0], n, [1.0, 1.0]),
            Vertex3D::new([1.0, 1.0, 0.0], n, [1.0, 0.0]),
            Vertex3D::new([-1.0, 1.0, 0.0], n, [0.0, 0.0]),
        ],
        Some(vec![0, 1, 2, 0, 2, 3]),
    )
}

fn triangle() -> MeshData {
    let n = [0.0, 0.0, 1.0];
    MeshData::new(
        vec![
            Vertex3D::new([0.0, 1.0, 0.0], n, [0.5, 0.0]),
            Vertex3D::new([-1.0, -1.0, 0.0], n, [0.0, 1.0]),
            Vertex3D::new([1.0, -1.0, 0.0], n, [1.0, 1.0]),
        ],
        None,
    )
}

struct Fixture {
    device: Arc<HeadlessDevice>,
    registry: Arc<AssetRegistry>,
    orchestrator: RenderOrchestrator,
    graph: SceneGraph,
    scene: SceneHandle,
}

fn fixture() -> Fixture {
    let device = HeadlessDevice::new();
    let registry = Arc::new(AssetRegistry::new());
    register_builtin_shaders(&registry);
    registry.register(Asset::from_payload(QUAD, AssetPayload::Mesh(quad())));
    registry.register(Asset::from_payload(TRIANGLE, AssetPayload::Mesh(triangle())));

    let config = EngineConfig::default();
    let cache = Arc::new(AssetCache::new(device.clone(), registry.clone(), &config).unwrap());
    let orchestrator = RenderOrchestrator::new(cache, &config);

    let mut graph = SceneGraph::new();
    let scene = graph.add_scene(Scene::new("main"));

    Fixture {
        device,
        registry,
        orchestrator,
        graph,
        scene,
    }
}

impl Fixture {
    fn add(&mut self, renderable: Renderable) {
        self.graph.scene_mut(self.scene).unwrap().add(renderable);
    }

    fn camera(
        &mut self,
        name: &str,
        renderer: &Arc<ForwardRenderer>,
        target: RenderTarget,
    ) -> CameraId {
        let camera = Camera::new(name, self.scene, renderer.clone(), target);
        self.graph.add_camera(camera).unwrap()
    }

    fn offscreen(&mut self, name: &str, renderer: &Arc<ForwardRenderer>) -> CameraId {
        self.camera(
            name,
            renderer,
            RenderTarget::Offscreen(OffscreenTarget::new(64, 48)),
        )
    }

    fn cache(&self) -> &AssetCache {
        self.orchestrator.cache()
    }

    fn frame(&self, cameras: &[CameraId]) -> FrameReport {
        self.orchestrator.render_frame(&self.graph, cameras).unwrap()
    }

    /// Renders until no camera waits for a pipeline anymore.
    async fn settle(&self, cameras: &[CameraId]) -> FrameReport {
        for _ in 0..100 {
            let report = self.frame(cameras);
            if report.cameras_pending == 0 {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("pipelines never became ready");
    }

    fn last_commands(&self) -> Vec<RenderCommand> {
        let frame = self.device.last_submission().unwrap();
        frame
            .passes()
            .iter()
            .flat_map(|pass| pass.commands.clone())
            .collect()
    }
}

fn quad_renderable(name: &str) -> Renderable {
    Renderable::builder().name(name).mesh(QUAD).build()
}

#[tokio::test]
async fn pipelines_are_built_in_the_background() {
    let mut f = fixture();
    let renderer = Arc::new(ForwardRenderer::default());
    f.orchestrator.add_renderer(renderer.clone());
    let camera = f.offscreen("main", &renderer);
    f.add(quad_renderable("quad"));

    let first = f.frame(&[camera]);
    assert_eq!(first.cameras_pending, 1);
    assert_eq!(first.draws, 0);
    assert!(first.submitted);
    assert!(f.device.last_submission().unwrap().passes().is_empty());

    let key = renderer.pipeline_key(f.cache(), FORMAT).unwrap().unwrap();
    assert!(f.cache().pipelines().has(&key));
    if let Some(build) = f.cache().pipelines().in_flight(&key) {
        build.await.unwrap();
    }

    let second = f.frame(&[camera]);
    assert_eq!(second.cameras_rendered, 1);
    assert_eq!(second.draws, 1);

    let commands = f.last_commands();
    assert!(matches!(commands[0], RenderCommand::SetPipeline(_)));
    assert!(
        commands
            .iter()
            .any(|c| matches!(c, RenderCommand::DrawIndexed { indices, .. } if *indices == (0..6)))
    );
    assert_eq!(f.device.stats().submits, 2);
    assert_eq!(f.cache().pipelines().builds_started(), 1);
}

#[derive(Debug)]
struct Probe {
    name: &'static str,
    priority: i32,
    prepared: Arc<Mutex<Vec<&'static str>>>,
}

impl Renderer for Probe {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn prepare(&self, _cache: &AssetCache) -> Result<(), RenderError> {
        self.prepared.lock().unwrap().push(self.name);
        Ok(())
    }

    fn render(
        &self,
        _encoder: &mut FrameEncoder,
        _ctx: &RenderContext,
        _cache: &AssetCache,
    ) -> Result<RenderOutcome, RenderError> {
        Ok(RenderOutcome::Drawn {
            draws: 0,
            skipped: 0,
        })
    }
}

#[test]
fn renderers_run_by_ascending_priority() {
    let mut f = fixture();
    let prepared = Arc::new(Mutex::new(Vec::new()));
    for (name, priority) in [("late", 5), ("early", 1), ("early too", 1)] {
        f.orchestrator.add_renderer(Arc::new(Probe {
            name,
            priority,
            prepared: prepared.clone(),
        }));
    }

    let names: Vec<_> = f.orchestrator.renderers().iter().map(|r| r.name()).collect();
    assert_eq!(names, ["early", "early too", "late"]);

    let report = f.frame(&[]);
    assert!(report.submitted);
    assert_eq!(*prepared.lock().unwrap(), ["early", "early too", "late"]);
}

#[test]
fn cameras_without_a_surface_are_skipped() {
    let mut f = fixture();
    let renderer = Arc::new(ForwardRenderer::default());
    let camera = f.camera(
        "window",
        &renderer,
        RenderTarget::Surface(SurfaceId::new("window")),
    );
    f.add(quad_renderable("quad"));

    let report = f.frame(&[camera]);
    assert_eq!(report.cameras_skipped, 1);
    assert_eq!(report.cameras_rendered, 0);
    assert!(report.submitted);
    assert_eq!(f.device.stats().submits, 1);
    assert!(f.device.last_submission().unwrap().passes().is_empty());
}

#[tokio::test]
async fn surfaces_render_into_the_published_view() {
    let mut f = fixture();
    let renderer = Arc::new(ForwardRenderer::default());
    let camera = f.camera(
        "window",
        &renderer,
        RenderTarget::Surface(SurfaceId::new("window")),
    );
    f.add(quad_renderable("quad"));

    let view = f.device.import_texture_view();
    f.orchestrator.surfaces().publish(
        "window",
        SurfaceFrame {
            view,
            width: 800,
            height: 600,
            format: wgpu::TextureFormat::Bgra8UnormSrgb,
        },
    );

    let report = f.settle(&[camera]).await;
    assert_eq!(report.draws, 1);
    let frame = f.device.last_submission().unwrap();
    assert_eq!(frame.passes()[0].desc.color.view, view);
    assert!(frame.passes()[0].desc.depth.is_some());
    let key = renderer
        .pipeline_key(f.cache(), wgpu::TextureFormat::Bgra8UnormSrgb)
        .unwrap()
        .unwrap();
    assert!(f.cache().pipelines().get(&key).is_some());

    f.orchestrator.surfaces().withdraw(&SurfaceId::new("window"));
    let report = f.frame(&[camera]);
    assert_eq!(report.cameras_skipped, 1);
    assert!(report.submitted);
}

#[test]
fn empty_offscreen_targets_are_skipped() {
    let mut f = fixture();
    let renderer = Arc::new(ForwardRenderer::default());
    let camera = f.camera(
        "flat",
        &renderer,
        RenderTarget::Offscreen(OffscreenTarget::new(0, 64)),
    );

    let report = f.frame(&[camera]);
    assert_eq!(report.cameras_skipped, 1);
    assert!(report.submitted);
    assert_eq!(f.orchestrator.offscreen_texture(camera), None);
}

#[tokio::test]
async fn offscreen_targets_are_reused_across_frames() {
    let mut f = fixture();
    let renderer = Arc::new(ForwardRenderer::default());
    let camera = f.offscreen("main", &renderer);
    f.add(quad_renderable("quad"));

    f.settle(&[camera]).await;
    let target = f.orchestrator.offscreen_texture(camera).unwrap();
    assert_eq!((target.width, target.height, target.format), (64, 48, FORMAT));
    let usage = f.device.texture_descriptor(target.texture).unwrap().usage;
    assert!(usage.contains(wgpu::TextureUsages::COPY_SRC));

    let textures = f.device.stats().textures;
    f.frame(&[camera]);
    assert_eq!(f.orchestrator.offscreen_texture(camera), Some(target));
    assert_eq!(f.device.stats().textures, textures);
}

#[tokio::test]
async fn every_renderable_gets_its_own_uniform_slot() {
    let mut f = fixture();
    f.registry.register(Asset::from_payload(
        "red.json",
        AssetPayload::Material(
            MaterialDesc::builder()
                .name("Red")
                .base_color([1.0, 0.0, 0.0, 1.0])
                .build(),
        ),
    ));
    let renderer = Arc::new(ForwardRenderer::default());
    let camera = f.offscreen("main", &renderer);
    f.add(quad_renderable("left"));
    f.add(
        Renderable::builder()
            .name("right")
            .mesh(QUAD)
            .material("red.json")
            .build(),
    );

    let report = f.settle(&[camera]).await;
    assert_eq!(report.draws, 2);

    let groups: Vec<_> = f
        .last_commands()
        .into_iter()
        .filter_map(|c| match c {
            RenderCommand::SetBindGroup { group, .. } => Some(group),
            _ => None,
        })
        .collect();
    assert_eq!(groups.len(), 2);
    assert_ne!(groups[0], groups[1]);

    let uniforms: Vec<_> = groups
        .iter()
        .map(|group| {
            let desc = f.device.bind_group_descriptor(*group).unwrap();
            match desc.entries[0].resource {
                BindingResource::Buffer { buffer, offset, .. } => (buffer, offset),
                other => panic!("expected a uniform buffer, got {other:?}"),
            }
        })
        .collect();
    assert_eq!(uniforms[0].0, uniforms[1].0);
    assert_eq!(uniforms[0].1, 0);
    assert_eq!(uniforms[1].1, MODEL_SLOT_STRIDE);

    let contents = f.device.buffer_contents(uniforms[1].0).unwrap();
    let color_at = (MODEL_SLOT_STRIDE + 128) as usize;
    let base_color: [f32; 4] = bytemuck::pod_read_unaligned(&contents[color_at..color_at + 16]);
    assert_eq!(base_color, [1.0, 0.0, 0.0, 1.0]);

    // same slots, same textures, nothing new to bind
    let bind_groups = f.device.stats().bind_groups;
    f.frame(&[camera]);
    assert_eq!(f.device.stats().bind_groups, bind_groups);
}

#[tokio::test]
async fn meshes_without_indices_draw_their_vertices() {
    let mut f = fixture();
    let renderer = Arc::new(ForwardRenderer::default());
    let camera = f.offscreen("main", &renderer);
    f.add(Renderable::builder().name("tri").mesh(TRIANGLE).build());

    f.settle(&[camera]).await;
    let commands = f.last_commands();
    assert!(
        commands
            .iter()
            .any(|c| matches!(c, RenderCommand::Draw { vertices, .. } if *vertices == (0..3)))
    );
    assert!(
        !commands
            .iter()
            .any(|c| matches!(c, RenderCommand::SetIndexBuffer { .. }))
    );
}

#[tokio::test]
async fn missing_shaders_draw_with_the_fallback_pipeline() {
    let mut f = fixture();
    f.registry
        .register(Asset::placeholder("custom.wgsl", AssetKind::Shader));
    let renderer = Arc::new(
        ForwardRenderer::builder()
            .name("custom")
            .vertex_shader("custom.wgsl")
            .build(),
    );
    let camera = f.offscreen("main", &renderer);
    f.add(quad_renderable("quad"));

    let report = f.settle(&[camera]).await;
    assert_eq!(report.draws, 1);
    let key = renderer.pipeline_key(f.cache(), FORMAT).unwrap().unwrap();
    assert_eq!(key.kind, "custom/fallback");
    assert!(f.cache().pipelines().get(&key).is_some());
    assert_eq!(f.cache().pipelines().len(), 1);
}

#[tokio::test]
async fn loading_meshes_are_skipped_for_now() {
    let mut f = fixture();
    let source = MemorySource::new();
    source.insert("slow.obj", SLOW_OBJ);
    let hold = source.hold("slow.obj");
    let slow = f
        .registry
        .register_source("slow.obj", AssetKind::Mesh, source);
    tokio::spawn({
        let slow = slow.clone();
        async move {
            let _ = slow.load().await;
        }
    });
    slow.subscribe()
        .wait_for(|s| *s == AssetState::Loading)
        .await
        .unwrap();

    let renderer = Arc::new(ForwardRenderer::default());
    let camera = f.offscreen("main", &renderer);
    f.add(quad_renderable("quad"));
    f.add(Renderable::builder().name("slow").mesh("slow.obj").build());

    let report = f.settle(&[camera]).await;
    assert_eq!(report.cameras_rendered, 1);
    assert_eq!(report.draws, 1);
    assert_eq!(report.renderables_skipped, 1);

    hold.release();
    assert_eq!(slow.wait_terminal().await, AssetState::Ready);
    let report = f.frame(&[camera]);
    assert_eq!(report.draws, 2);
    assert_eq!(report.renderables_skipped, 0);
}

#[tokio::test]
async fn failed_pipelines_wait_out_their_cooldown() {
    let mut f = fixture();
    let renderer = Arc::new(ForwardRenderer::default());
    let camera = f.offscreen("main", &renderer);
    f.add(quad_renderable("quad"));
    f.device.fail_next_pipelines(1);

    let key = renderer.pipeline_key(f.cache(), FORMAT).unwrap().unwrap();
    assert_eq!(f.frame(&[camera]).cameras_pending, 1);
    if let Some(build) = f.cache().pipelines().in_flight(&key) {
        assert!(build.await.is_err());
    }

    let report = f.frame(&[camera]);
    assert_eq!(report.cameras_pending, 1);
    assert!(report.submitted);
    assert_eq!(f.device.stats().pipeline_attempts, 1);
    assert_eq!(f.cache().pipelines().builds_started(), 1);
}

#[tokio::test]
async fn cameras_share_one_pipeline_and_keep_their_order() {
    let mut f = fixture();
    let renderer = Arc::new(ForwardRenderer::default());
    let left = f.offscreen("left", &renderer);
    let right = f.offscreen("right", &renderer);
    f.graph.camera_mut(left).unwrap().order = 1;
    f.add(quad_renderable("quad"));

    let cameras = f.graph.render_cameras();
    assert_eq!(cameras, [right, left]);

    let first = f.frame(&cameras);
    assert_eq!(first.cameras_pending, 2);
    assert_eq!(f.cache().pipelines().builds_started(), 1);

    let report = f.settle(&cameras).await;
    assert_eq!(report.cameras_rendered, 2);
    assert_eq!(f.cache().pipelines().builds_started(), 1);

    let frame = f.device.last_submission().unwrap();
    let labels: Vec<_> = frame.passes().iter().map(|p| p.desc.label.as_str()).collect();
    assert_eq!(labels, ["forward Pass (right)", "forward Pass (left)"]);
}

#[test]
fn pipelines_are_built_on_the_spot_without_a_runtime() {
    let mut f = fixture();
    let renderer = Arc::new(ForwardRenderer::default());
    f.orchestrator.add_renderer(renderer.clone());
    let camera = f.offscreen("main", &renderer);
    f.add(Renderable::builder().name("tri").mesh(TRIANGLE).build());

    let first = f.frame(&[camera]);
    assert_eq!(first.cameras_pending, 0);
    assert_eq!(first.draws, 1);

    for _ in 0..3 {
        assert_eq!(f.frame(&[camera]).draws, 1);
    }
    assert_eq!(f.cache().pipelines().builds_started(), 1);
    assert_eq!(f.device.stats().pipelines, 1);
}

#[tokio::test]
async fn renderers_with_different_shaders_get_their_own_pipelines() {
    let mut f = fixture();
    for id in ["tinted_vertex.wgsl", "tinted_fragment.wgsl"] {
        let code = if id.contains("vertex") {
            lumora::rendering::shaders::FORWARD_VERTEX
        } else {
            lumora::rendering::shaders::FORWARD_FRAGMENT
        };
        f.registry.register(Asset::from_payload(
            id,
            AssetPayload::Shader(ShaderSource::new(code)),
        ));
    }

    let plain = Arc::new(ForwardRenderer::default());
    let tinted = Arc::new(
        ForwardRenderer::builder()
            .vertex_shader("tinted_vertex.wgsl")
            .fragment_shader("tinted_fragment.wgsl")
            .build(),
    );
    let a = f.offscreen("plain", &plain);
    let b = f.offscreen("tinted", &tinted);
    f.add(quad_renderable("quad"));

    let report = f.settle(&[a, b]).await;
    assert_eq!(report.cameras_rendered, 2);

    let plain_key = plain.pipeline_key(f.cache(), FORMAT).unwrap().unwrap();
    let tinted_key = tinted.pipeline_key(f.cache(), FORMAT).unwrap().unwrap();
    assert_eq!(plain_key.kind, tinted_key.kind);
    assert_ne!(plain_key, tinted_key);
    assert_eq!(f.cache().pipelines().builds_started(), 2);

    let frame = f.device.last_submission().unwrap();
    let pipelines: Vec<_> = frame
        .passes()
        .iter()
        .map(|pass| match pass.commands[0] {
            RenderCommand::SetPipeline(id) => id,
            ref other => panic!("pass starts with {other:?}"),
        })
        .collect();
    assert_ne!(pipelines[0], pipelines[1]);

    for (pipeline, key) in pipelines.into_iter().zip([plain_key, tinted_key]) {
        let sources = key.sources.unwrap();
        let desc = f.device.pipeline_descriptor(pipeline).unwrap();
        assert_eq!(desc.vertex_module, sources.vertex);
        assert_eq!(desc.fragment_module, sources.fragment);
        assert_eq!(desc.bind_group_layouts, [sources.layout]);
    }
}

#[test]
fn resized_targets_release_their_old_textures() {
    let mut f = fixture();
    let renderer = Arc::new(ForwardRenderer::default());
    let camera = f.offscreen("main", &renderer);
    f.add(quad_renderable("quad"));

    assert_eq!(f.frame(&[camera]).draws, 1);
    let first = f.orchestrator.offscreen_texture(camera).unwrap();
    let live = (f.device.live_textures(), f.device.live_texture_views());

    for (width, height) in [(128, 96), (32, 24), (64, 48)] {
        let target = RenderTarget::Offscreen(OffscreenTarget::new(width, height));
        f.graph.camera_mut(camera).unwrap().set_target(target);
        assert_eq!(f.frame(&[camera]).draws, 1);

        let texture = f.orchestrator.offscreen_texture(camera).unwrap();
        assert_eq!((texture.width, texture.height), (width, height));
        assert_eq!(
            (f.device.live_textures(), f.device.live_texture_views()),
            live
        );
    }
    assert!(f.device.texture_descriptor(first.texture).is_none());
}
