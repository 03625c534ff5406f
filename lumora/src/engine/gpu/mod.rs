//! The boundary between the engine and whatever actually talks to a graphics card.
//!
//! Caches and renderers only ever see [`GpuDevice`] and the id newtypes defined here.
//! [`WgpuDevice`] drives real hardware, [`HeadlessDevice`] records everything for tests
//! and dry runs.

mod command;
mod descriptors;
mod device;
mod error;
mod headless;
mod wgpu_device;

pub use command::*;
pub use descriptors::*;
pub use device::*;
pub use error::*;
pub use headless::*;
pub use wgpu_device::*;

use std::fmt::{Display, Formatter};
use std::hash::Hash;

/// Common surface of the device object ids.
pub trait GpuId: Copy + Eq + Hash + Display {
    fn kind() -> &'static str;
    fn raw(self) -> u64;
}

macro_rules! gpu_ids {
    ($($name:ident => $kind:literal),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);

            impl $name {
                pub const KIND: &'static str = $kind;
            }

            impl GpuId for $name {
                fn kind() -> &'static str {
                    Self::KIND
                }

                fn raw(self) -> u64 {
                    self.0
                }
            }

            impl Display for $name {
                fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                    write!(f, "#{}", self.0)
                }
            }
        )*
    };
}

gpu_ids! {
    ShaderModuleId => "shader module",
    BindGroupLayoutId => "bind group layout",
    PipelineId => "render pipeline",
    BufferId => "buffer",
    BindGroupId => "bind group",
    TextureId => "texture",
    TextureViewId => "texture view",
    SamplerId => "sampler",
}

/// Which programmable stage a shader module is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub const fn entry_point(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_main",
            ShaderStage::Fragment => "fs_main",
        }
    }
}

impl Display for ShaderStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}
