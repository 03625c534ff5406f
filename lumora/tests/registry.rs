use lumora::assets::{
    Asset, AssetId, AssetKind, AssetPayload, AssetRegistry, AssetState, MemorySource, ShaderSource,
};
use lumora::rendering::cache::needs_fallback;
use lumora::rendering::shaders::FORWARD_VERTEX;
use std::sync::Arc;
use std::time::Duration;

fn shader_payload() -> AssetPayload {
    AssetPayload::Shader(ShaderSource::new(FORWARD_VERTEX))
}

#[test]
fn register_keeps_the_first_instance() {
    let registry = AssetRegistry::new();

    let first = registry.register(Asset::placeholder("a", AssetKind::Mesh));
    let second = registry.register(Asset::from_payload("a", shader_payload()));

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.kind(), AssetKind::Mesh);
    assert_eq!(second.state(), AssetState::Unloaded);
    assert_eq!(registry.len(), 1);
    assert!(Arc::ptr_eq(&registry.get(&"a".into()).unwrap(), &first));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_ensure_ready_loads_once() {
    let registry = Arc::new(AssetRegistry::new());
    let source = MemorySource::new();
    source.insert("s.wgsl", FORWARD_VERTEX);
    source.set_latency(Some(Duration::from_millis(20)));
    let asset = registry.register_source("s.wgsl", AssetKind::Shader, source.clone());

    let tasks = (0..16)
        .map(|_| {
            let registry = registry.clone();
            let asset = asset.clone();
            tokio::spawn(async move {
                registry.ensure_ready(&asset).await;
                asset.state()
            })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        assert_eq!(task.await.unwrap(), AssetState::Ready);
    }
    assert_eq!(source.fetch_count("s.wgsl"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_ensure_ready_sees_the_same_failure() {
    let registry = Arc::new(AssetRegistry::new());
    let source = MemorySource::new();
    source.fail("s2", "unreachable host");
    source.set_latency(Some(Duration::from_millis(10)));
    let asset = registry.register_source("s2", AssetKind::Shader, source.clone());

    let tasks = (0..8)
        .map(|_| {
            let registry = registry.clone();
            let asset = asset.clone();
            tokio::spawn(async move {
                registry.ensure_ready(&asset).await;
                asset.state()
            })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        assert_eq!(task.await.unwrap(), AssetState::Failed);
    }
    assert_eq!(source.fetch_count("s2"), 1);
}

#[tokio::test]
async fn failed_assets_are_ready_enough() {
    let registry = AssetRegistry::new();
    let source = MemorySource::new();
    source.fail("s2", "404");
    let asset = registry.register_source("s2", AssetKind::Shader, source);

    registry.ensure_ready(&asset).await;
    assert_eq!(asset.state(), AssetState::Failed);
    assert!(asset.error().is_some());
    assert!(needs_fallback(Some(&*asset)));

    // already terminal, returns right away
    registry.ensure_ready(&asset).await;
}

#[tokio::test]
async fn ensure_ready_waits_for_loads_in_flight() {
    let registry = Arc::new(AssetRegistry::new());
    let source = MemorySource::new();
    source.insert("slow.wgsl", FORWARD_VERTEX);
    let hold = source.hold("slow.wgsl");
    let asset = registry.register_source("slow.wgsl", AssetKind::Shader, source);

    let loader = tokio::spawn({
        let asset = asset.clone();
        async move { asset.load().await }
    });
    asset
        .subscribe()
        .wait_for(|state| *state == AssetState::Loading)
        .await
        .unwrap();

    let waiter = tokio::spawn({
        let registry = registry.clone();
        let asset = asset.clone();
        async move {
            registry.ensure_ready(&asset).await;
            asset.state()
        }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());
    assert_eq!(asset.state(), AssetState::Loading);

    hold.release();
    assert_eq!(waiter.await.unwrap(), AssetState::Ready);
    loader.await.unwrap().unwrap();
}

#[tokio::test]
async fn assets_without_a_loader_stay_unloaded() {
    let registry = AssetRegistry::new();
    let placeholder = registry.register(Asset::placeholder("later.png", AssetKind::Texture));

    registry.ensure_ready(&placeholder).await;
    assert_eq!(placeholder.state(), AssetState::Unloaded);
    assert!(needs_fallback(Some(&*placeholder)));
    assert!(needs_fallback(None));
}

#[tokio::test]
async fn prepare_settles_everything_despite_failures() {
    let registry = AssetRegistry::new();
    let source = MemorySource::new();
    source.insert("good.wgsl", FORWARD_VERTEX);
    source.fail("bad.wgsl", "gone");

    let assets = [
        registry.register_source("good.wgsl", AssetKind::Shader, source.clone()),
        registry.register_source("bad.wgsl", AssetKind::Shader, source.clone()),
        registry.register(Asset::placeholder("never.png", AssetKind::Texture)),
        registry.register(Asset::from_payload("static.wgsl", shader_payload())),
    ];

    let stats = registry.prepare(&assets).await;
    assert_eq!(stats.ready, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.unloaded, 1);
    assert_eq!(stats.loading, 0);
    assert_eq!(stats.total(), 4);
    assert_eq!(source.total_fetches(), 2);
}

#[tokio::test]
async fn prepare_ids_skips_unknown_ids() {
    let registry = AssetRegistry::new();
    let source = MemorySource::new();
    source.insert("good.wgsl", FORWARD_VERTEX);
    registry.register_source("good.wgsl", AssetKind::Shader, source);

    let stats = registry
        .prepare_ids(&[AssetId::from("good.wgsl"), AssetId::from("unknown.wgsl")])
        .await;
    assert_eq!(stats.ready, 1);
    assert_eq!(stats.total(), 1);
    assert!(!registry.contains(&"unknown.wgsl".into()));
}

#[test]
fn stats_and_teardown() {
    let registry = AssetRegistry::new();
    registry.register(Asset::from_payload("a", shader_payload()));
    registry.register(Asset::placeholder("b", AssetKind::Mesh));

    let stats = registry.stats();
    assert_eq!(stats.ready, 1);
    assert_eq!(stats.unloaded, 1);
    assert_eq!(registry.state(&"b".into()), Some(AssetState::Unloaded));

    registry.clear();
    assert!(registry.is_empty());
    assert_eq!(registry.state(&"b".into()), None);
}
