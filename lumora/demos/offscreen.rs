//! Renders a spinning crate into an off-screen texture and saves the last frame as a PNG.
//!
//! The texture of the crate is missing on purpose, so it shows up with the fallback
//! checkerboard.

use lumora::assets::{AssetKind, MemorySource};
use lumora::gpu::WgpuDevice;
use lumora::nalgebra::{Point3, Vector3};
use lumora::rendering::{ForwardRenderer, OffscreenTarget, RenderTarget, Renderer};
use lumora::scene::{Camera, Renderable, Scene, Spin};
use lumora::{EngineConfig, FrameScheduler};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

const CUBE_OBJ: &str = "
v -1 -1 1
v 1 -1 1
v 1 1 1
v -1 1 1
v -1 -1 -1
v 1 -1 -1
v 1 1 -1
v -1 1 -1
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
vn 0 0 -1
vn 1 0 0
vn -1 0 0
vn 0 1 0
vn 0 -1 0
f 1/1/1 2/2/1 3/3/1
f 1/1/1 3/3/1 4/4/1
f 6/1/2 5/2/2 8/3/2
f 6/1/2 8/3/2 7/4/2
f 2/1/3 6/2/3 7/3/3
f 2/1/3 7/3/3 3/4/3
f 5/1/4 1/2/4 4/3/4
f 5/1/4 4/3/4 8/4/4
f 4/1/5 3/2/5 7/3/5
f 4/1/5 7/3/5 8/4/5
f 5/1/6 6/2/6 2/3/6
f 5/1/6 2/3/6 1/4/6
";

const CRATE_MATERIAL: &str = r#"{ "name": "Crate", "base_color": [0.9, 0.6, 0.3, 1.0] }"#;

fn main() -> Result<(), Box<dyn Error>> {
    lumora::logging::init();

    let device = Arc::new(futures::executor::block_on(WgpuDevice::new_headless())?);
    let config = EngineConfig::builder().target_fps(60).build();
    let mut scheduler = FrameScheduler::new(config, device.clone())?;

    let source = MemorySource::new();
    source.insert("cube.obj", CUBE_OBJ);
    source.insert("crate.json", CRATE_MATERIAL);
    source.fail("crate.png", "the crate texture went missing");

    let registry = scheduler.registry();
    registry.register_source("cube.obj", AssetKind::Mesh, source.clone());
    registry.register_source("crate.json", AssetKind::Material, source.clone());
    registry.register_source("crate.png", AssetKind::Texture, source);

    let renderer: Arc<dyn Renderer> = Arc::new(ForwardRenderer::default());
    scheduler.add_renderer(renderer.clone());

    let graph = scheduler.graph_mut();
    let scene = graph.add_scene(
        Scene::new("Demo").with(
            Renderable::builder()
                .name("Crate")
                .mesh("cube.obj")
                .material("crate.json")
                .texture("crate.png")
                .spin(Spin::new(Vector3::y_axis(), 45.0))
                .build(),
        ),
    );
    let camera = graph.add_camera(
        Camera::new(
            "Main",
            scene,
            renderer,
            RenderTarget::Offscreen(OffscreenTarget::new(WIDTH, HEIGHT)),
        )
        .looking_at(Point3::new(3.0, 2.5, 4.0), Point3::origin()),
    )?;

    let stats = scheduler.prepare();
    println!("Assets: {} ready, {} failed", stats.ready, stats.failed);

    // The first frames only kick off the pipeline build
    let mut drawn = false;
    for _ in 0..120 {
        let report = scheduler.tick(Duration::from_millis(16))?;
        if report.draws > 0 {
            drawn = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    if !drawn {
        return Err("the pipeline never became ready".into());
    }

    scheduler.run(Some(60))?;
    println!("Rendered {} frames", scheduler.stats().frames);

    let target = scheduler
        .orchestrator()
        .offscreen_texture(camera)
        .ok_or("the camera never got a target")?;
    let pixels = device.read_texture(target.texture)?;
    let image = image::RgbaImage::from_raw(target.width, target.height, pixels)
        .ok_or("read back an image of the wrong size")?;
    image.save("offscreen.png")?;
    println!("Saved offscreen.png");

    Ok(())
}
