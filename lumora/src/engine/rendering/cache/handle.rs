use crate::assets::{AssetId, AssetKind};
use crate::gpu::ShaderStage;
use dashmap::DashMap;
use lumora_utils::debug_panic;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};

/// Names a compiled shader module inside the [`ShaderModuleCache`](super::ShaderModuleCache).
/// Carries the stage it was compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle {
    id: u32,
    stage: ShaderStage,
}

impl ShaderHandle {
    pub const fn id(self) -> u32 {
        self.id
    }

    pub const fn stage(self) -> ShaderStage {
        self.stage
    }
}

/// A GPU-side object minted by the asset cache. Distinct from the asset identity it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceHandle {
    Shader(ShaderHandle),
    Texture(u32),
    Mesh(u32),
    Material(u32),
}

impl ResourceHandle {
    pub const fn id(self) -> u32 {
        match self {
            ResourceHandle::Shader(h) => h.id,
            ResourceHandle::Texture(id)
            | ResourceHandle::Mesh(id)
            | ResourceHandle::Material(id) => id,
        }
    }

    pub const fn kind(self) -> AssetKind {
        match self {
            ResourceHandle::Shader(_) => AssetKind::Shader,
            ResourceHandle::Texture(_) => AssetKind::Texture,
            ResourceHandle::Mesh(_) => AssetKind::Mesh,
            ResourceHandle::Material(_) => AssetKind::Material,
        }
    }

    pub const fn as_shader(self) -> Option<ShaderHandle> {
        match self {
            ResourceHandle::Shader(h) => Some(h),
            _ => None,
        }
    }
}

impl Display for ResourceHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceHandle::Shader(h) => write!(f, "{} shader #{}", h.stage, h.id),
            other => write!(f, "{} #{}", other.kind(), other.id()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Shader(ShaderStage),
    Texture,
    Mesh,
    Material,
}

/// Mints handles and remembers which asset each one belongs to.
///
/// Ids come from one counter and are never handed out twice.
#[derive(Debug, Default)]
pub struct HandleTable {
    next: AtomicU32,
    assigned: DashMap<(AssetId, Slot), ResourceHandle>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn assign(&self, id: &AssetId, slot: Slot) -> ResourceHandle {
        *self
            .assigned
            .entry((id.clone(), slot))
            .or_insert_with(|| self.mint(slot))
    }

    fn mint(&self, slot: Slot) -> ResourceHandle {
        let id = self.next_id();
        match slot {
            Slot::Shader(stage) => ResourceHandle::Shader(ShaderHandle { id, stage }),
            Slot::Texture => ResourceHandle::Texture(id),
            Slot::Mesh => ResourceHandle::Mesh(id),
            Slot::Material => ResourceHandle::Material(id),
        }
    }

    pub fn shader(&self, id: &AssetId, stage: ShaderStage) -> ShaderHandle {
        match self.assign(id, Slot::Shader(stage)) {
            ResourceHandle::Shader(h) => h,
            other => {
                debug_panic!("Shader slot of \"{id}\" ({stage}) holds {other:?}");
                ShaderHandle {
                    id: self.next_id(),
                    stage,
                }
            }
        }
    }

    pub fn peek_shader(&self, id: &AssetId, stage: ShaderStage) -> Option<ShaderHandle> {
        self.assigned
            .get(&(id.clone(), Slot::Shader(stage)))
            .and_then(|h| h.as_shader())
    }

    /// The handle of `id` for `kind`. Shaders get their vertex-stage handle here, use
    /// [`HandleTable::shader`] for a specific stage.
    pub fn for_asset(&self, id: &AssetId, kind: AssetKind) -> ResourceHandle {
        let slot = match kind {
            AssetKind::Shader => Slot::Shader(ShaderStage::Vertex),
            AssetKind::Texture => Slot::Texture,
            AssetKind::Mesh => Slot::Mesh,
            AssetKind::Material => Slot::Material,
        };
        self.assign(id, slot)
    }

    /// A fresh handle of the same kind (and stage) as `original`, tied to no asset.
    pub fn mint_like(&self, original: ResourceHandle) -> ResourceHandle {
        let slot = match original {
            ResourceHandle::Shader(h) => Slot::Shader(h.stage),
            ResourceHandle::Texture(_) => Slot::Texture,
            ResourceHandle::Mesh(_) => Slot::Mesh,
            ResourceHandle::Material(_) => Slot::Material,
        };
        self.mint(slot)
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}
