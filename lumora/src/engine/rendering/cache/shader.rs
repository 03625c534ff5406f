use crate::gpu::{GpuDevice, GpuError, ShaderModuleDescriptor, ShaderModuleId};
use crate::rendering::cache::ShaderHandle;
use dashmap::DashMap;
use log::{debug, warn};
use lumora_utils::RateLimiter;
use std::sync::Arc;

/// Compiled shader modules by handle.
///
/// Compiling is synchronous and not deduplicated. Every call to
/// [`ShaderModuleCache::create_shader_module`] creates a new module, so callers make sure a
/// handle is compiled only once.
#[derive(Debug)]
pub struct ShaderModuleCache {
    device: Arc<dyn GpuDevice>,
    modules: DashMap<u32, ShaderModuleId>,
    failures: RateLimiter,
}

impl ShaderModuleCache {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            device,
            modules: DashMap::new(),
            failures: RateLimiter::new(100),
        }
    }

    pub fn create_shader_module(
        &self,
        handle: ShaderHandle,
        source_code: &str,
    ) -> Result<ShaderModuleId, GpuError> {
        let label = format!("Shader #{}", handle.id());
        let module = self
            .device
            .create_shader_module(&ShaderModuleDescriptor {
                label: &label,
                source: source_code,
                stage: handle.stage(),
            })
            .inspect_err(|e| {
                if let Some(count) = self.failures.hit() {
                    warn!("[Shader Cache] {e} ({count} failed compilations so far)");
                }
            })?;

        if let Some(previous) = self.modules.insert(handle.id(), module) {
            debug!("[Shader Cache] Replaced module {previous} of {label}");
        }
        Ok(module)
    }

    pub fn get(&self, handle: ShaderHandle) -> Option<ShaderModuleId> {
        self.modules.get(&handle.id()).map(|m| *m)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetId;
    use crate::gpu::{HeadlessDevice, ShaderStage};
    use crate::rendering::cache::HandleTable;

    #[test]
    fn every_call_compiles_a_new_module() {
        let device = HeadlessDevice::new();
        let cache = ShaderModuleCache::new(device.clone());
        let handle = HandleTable::new().shader(&AssetId::new("a.wgsl"), ShaderStage::Vertex);

        assert_eq!(cache.get(handle), None);
        let first = cache.create_shader_module(handle, "").unwrap();
        let second = cache.create_shader_module(handle, "").unwrap();

        assert_ne!(first, second);
        assert_eq!(cache.get(handle), Some(second));
        assert_eq!(device.stats().shader_modules, 2);
        assert_eq!(device.shader_stage(second), Some(ShaderStage::Vertex));
    }

    #[test]
    fn failed_compilations_store_nothing() {
        let device = HeadlessDevice::new();
        let cache = ShaderModuleCache::new(device.clone());
        let handle = HandleTable::new().shader(&AssetId::new("b.wgsl"), ShaderStage::Fragment);

        device.fail_next_shader_modules(1);
        assert!(cache.create_shader_module(handle, "").is_err());
        assert!(cache.is_empty());
    }
}
