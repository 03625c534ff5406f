use crate::assets::AssetId;
use crate::scene::{
    Camera, CameraId, MismatchedOwnershipErr, Renderable, SceneError, SceneId,
    UnknownCameraErr, UnknownSceneErr,
};
use itertools::Itertools;
use log::{debug, trace};
use slotmap::SlotMap;
use snafu::{OptionExt, ensure};
use uuid::Uuid;

/// A scene's key together with the graph that minted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneHandle {
    graph: Uuid,
    id: SceneId,
}

impl SceneHandle {
    pub fn id(self) -> SceneId {
        self.id
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scene {
    name: String,
    renderables: Vec<Renderable>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            renderables: Vec::new(),
        }
    }

    pub fn with(mut self, renderable: Renderable) -> Self {
        self.add(renderable);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&mut self, renderable: Renderable) {
        self.renderables.push(renderable);
    }

    pub fn renderables(&self) -> &[Renderable] {
        &self.renderables
    }

    pub fn renderables_mut(&mut self) -> &mut [Renderable] {
        &mut self.renderables
    }
}

#[derive(Debug)]
pub struct SceneGraph {
    id: Uuid,
    scenes: SlotMap<SceneId, Scene>,
    cameras: SlotMap<CameraId, Camera>,
    camera_order: Vec<CameraId>,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            scenes: SlotMap::with_key(),
            cameras: SlotMap::with_key(),
            camera_order: Vec::new(),
        }
    }

    pub fn add_scene(&mut self, scene: Scene) -> SceneHandle {
        let id = self.scenes.insert(scene);
        debug!("[Scene Graph] Added scene {id:?}");
        SceneHandle { graph: self.id, id }
    }

    pub fn owns(&self, handle: SceneHandle) -> bool {
        handle.graph == self.id && self.scenes.contains_key(handle.id)
    }

    pub fn scene(&self, handle: SceneHandle) -> Option<&Scene> {
        if handle.graph != self.id {
            return None;
        }
        self.scenes.get(handle.id)
    }

    pub fn scene_mut(&mut self, handle: SceneHandle) -> Option<&mut Scene> {
        if handle.graph != self.id {
            return None;
        }
        self.scenes.get_mut(handle.id)
    }

    /// Removes a scene and every camera looking at it.
    pub fn remove_scene(&mut self, handle: SceneHandle) -> Result<Scene, SceneError> {
        ensure!(handle.graph == self.id, UnknownSceneErr { handle });
        let scene = self
            .scenes
            .remove(handle.id)
            .context(UnknownSceneErr { handle })?;

        let cameras = &mut self.cameras;
        self.camera_order.retain(|id| {
            let keep = cameras.get(*id).is_some_and(|c| c.scene() != handle);
            if !keep {
                cameras.remove(*id);
            }
            keep
        });

        Ok(scene)
    }

    /// Adds a camera. Its scene must belong to this graph.
    pub fn add_camera(&mut self, camera: Camera) -> Result<CameraId, SceneError> {
        let handle = camera.scene();
        ensure!(
            handle.graph == self.id,
            MismatchedOwnershipErr {
                camera: camera.name()
            }
        );
        ensure!(self.scenes.contains_key(handle.id), UnknownSceneErr { handle });

        let name = camera.name().to_string();
        let id = self.cameras.insert(camera);
        self.camera_order.push(id);
        debug!("[Scene Graph] Added camera \"{name}\" ({id:?})");
        Ok(id)
    }

    pub fn remove_camera(&mut self, id: CameraId) -> Result<Camera, SceneError> {
        let camera = self.cameras.remove(id).context(UnknownCameraErr { id })?;
        self.camera_order.retain(|c| *c != id);
        Ok(camera)
    }

    pub fn camera(&self, id: CameraId) -> Option<&Camera> {
        self.cameras.get(id)
    }

    pub fn camera_mut(&mut self, id: CameraId) -> Option<&mut Camera> {
        self.cameras.get_mut(id)
    }

    /// Every camera in the order they were added.
    pub fn cameras(&self) -> impl Iterator<Item = (CameraId, &Camera)> {
        self.camera_order
            .iter()
            .filter_map(|id| self.cameras.get(*id).map(|c| (*id, c)))
    }

    /// Enabled cameras sorted by ascending order. Ties keep insertion order.
    pub fn render_cameras(&self) -> Vec<CameraId> {
        self.cameras()
            .filter(|(_, camera)| camera.enabled)
            .sorted_by_key(|(_, camera)| camera.order)
            .map(|(id, _)| id)
            .collect()
    }

    /// Every asset needed to draw what the enabled cameras see, without duplicates.
    pub fn collect_assets(&self) -> Vec<AssetId> {
        let cameras = self
            .cameras()
            .filter(|(_, camera)| camera.enabled)
            .map(|(_, camera)| camera)
            .collect_vec();

        let renderer_assets = cameras
            .iter()
            .flat_map(|camera| camera.renderer().assets());

        let scene_assets = cameras
            .iter()
            .map(|camera| camera.scene())
            .unique()
            .filter_map(|handle| self.scene(handle))
            .flat_map(|scene| scene.renderables())
            .flat_map(|renderable| renderable.assets().cloned());

        renderer_assets.chain(scene_assets).unique().collect()
    }

    pub fn update(&mut self, delta_time: f32) {
        trace!("[Scene Graph] Advancing by {delta_time}s");
        for scene in self.scenes.values_mut() {
            for renderable in scene.renderables_mut() {
                renderable.update(delta_time);
            }
        }
    }
}
