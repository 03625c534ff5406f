use crate::assets::MaterialDesc;
use crate::rendering::cache::CacheType;

#[derive(Debug, Clone, PartialEq)]
pub struct GpuMaterial {
    pub name: String,
    pub base_color: [f32; 4],
}

impl From<&MaterialDesc> for GpuMaterial {
    fn from(desc: &MaterialDesc) -> Self {
        Self {
            name: desc.name.clone(),
            base_color: desc.base_color,
        }
    }
}

impl Default for GpuMaterial {
    fn default() -> Self {
        Self::from(&MaterialDesc::default())
    }
}

impl CacheType for GpuMaterial {
    fn name() -> &'static str {
        "Material"
    }
}
