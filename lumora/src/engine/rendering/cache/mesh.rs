use crate::assets::MeshData;
use crate::gpu::{BufferDescriptor, BufferId, GpuDevice, GpuError};
use crate::rendering::cache::CacheType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuIndices {
    pub buffer: BufferId,
    pub count: u32,
}

/// Vertex and optional index buffer of an uploaded mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMesh {
    pub vertex_buffer: BufferId,
    pub vertex_count: u32,
    pub indices: Option<GpuIndices>,
}

impl GpuMesh {
    pub fn upload(device: &dyn GpuDevice, label: &str, mesh: &MeshData) -> Result<Self, GpuError> {
        let vertices = mesh.vertex_bytes();
        let vertex_buffer = device.create_buffer(
            &BufferDescriptor {
                label: format!("{label} Vertices").into(),
                size: vertices.len() as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            },
            Some(vertices),
        )?;

        let indices = match mesh.index_bytes() {
            None => None,
            Some(bytes) => {
                let buffer = device.create_buffer(
                    &BufferDescriptor {
                        label: format!("{label} Indices").into(),
                        size: bytes.len() as u64,
                        usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
                    },
                    Some(bytes),
                )?;
                Some(GpuIndices {
                    buffer,
                    count: mesh.index_count().unwrap_or_default(),
                })
            }
        };

        Ok(Self {
            vertex_buffer,
            vertex_count: mesh.vertex_count(),
            indices,
        })
    }
}

impl CacheType for GpuMesh {
    fn name() -> &'static str {
        "Mesh"
    }
}
