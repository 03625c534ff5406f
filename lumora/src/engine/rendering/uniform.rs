use crate::gpu::{BindingResource, BufferDescriptor, BufferId, GpuDevice, GpuError};
use crate::utils::sizes::{MAT4_SIZE, UNIFORM_OFFSET_ALIGN, VEC4_SIZE, align_up};
use bytemuck::{Pod, Zeroable};
use log::debug;
use nalgebra::{Matrix4, Vector4};
use static_assertions::const_assert_eq;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct ModelUniform {
    pub mvp: Matrix4<f32>,
    pub model: Matrix4<f32>,
    pub base_color: Vector4<f32>,
}

pub const MODEL_UNIFORM_SIZE: u64 = size_of::<ModelUniform>() as u64;
pub const MODEL_SLOT_STRIDE: u64 = align_up(MODEL_UNIFORM_SIZE, UNIFORM_OFFSET_ALIGN);

const_assert_eq!(MODEL_UNIFORM_SIZE, 2 * MAT4_SIZE + VEC4_SIZE);
const_assert_eq!(MODEL_SLOT_STRIDE, 256);

/// A uniform buffer cut into aligned slots, one per draw of a frame.
///
/// Slots are handed out front to back and start over with every new frame. Slots of one
/// frame are never reused within it, so draws recorded early still see their own data when
/// the frame is finally submitted.
#[derive(Debug)]
pub struct SlottedUniformBuffer {
    label: String,
    buffer: BufferId,
    capacity: u32,
    frame: u64,
    cursor: u32,
}

impl SlottedUniformBuffer {
    pub fn new(device: &dyn GpuDevice, label: &str, capacity: u32) -> Result<Self, GpuError> {
        let capacity = capacity.max(1);
        Ok(Self {
            label: label.to_string(),
            buffer: Self::allocate(device, label, capacity)?,
            capacity,
            frame: 0,
            cursor: 0,
        })
    }

    fn allocate(device: &dyn GpuDevice, label: &str, capacity: u32) -> Result<BufferId, GpuError> {
        device.create_buffer(
            &BufferDescriptor {
                label: format!("{label} Uniforms").into(),
                size: capacity as u64 * MODEL_SLOT_STRIDE,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            },
            None,
        )
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Reserves `count` consecutive slots in `frame` and returns the first one.
    ///
    /// Grows into a new buffer if the current one is full. Slots handed out earlier keep
    /// pointing at the old buffer, which stays alive.
    pub fn reserve(
        &mut self,
        device: &dyn GpuDevice,
        frame: u64,
        count: u32,
    ) -> Result<u32, GpuError> {
        if frame != self.frame {
            self.frame = frame;
            self.cursor = 0;
        }

        let needed = self.cursor + count;
        if needed > self.capacity {
            let capacity = needed.next_power_of_two();
            debug!(
                "[Uniforms] Growing {} from {} to {capacity} slots",
                self.label, self.capacity
            );
            self.buffer = Self::allocate(device, &self.label, capacity)?;
            self.capacity = capacity;
        }

        let first = self.cursor;
        self.cursor = needed;
        Ok(first)
    }

    pub fn write(
        &self,
        device: &dyn GpuDevice,
        slot: u32,
        uniform: &ModelUniform,
    ) -> Result<(), GpuError> {
        device.write_buffer(
            self.buffer,
            slot as u64 * MODEL_SLOT_STRIDE,
            bytemuck::bytes_of(uniform),
        )
    }

    pub fn binding(&self, slot: u32) -> BindingResource {
        BindingResource::Buffer {
            buffer: self.buffer,
            offset: slot as u64 * MODEL_SLOT_STRIDE,
            size: MODEL_UNIFORM_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;

    #[test]
    fn slots_restart_every_frame_and_grow_within_one() {
        let device = HeadlessDevice::new();
        let mut uniforms = SlottedUniformBuffer::new(&*device, "Test", 2).unwrap();
        let first_buffer = uniforms.buffer();

        assert_eq!(uniforms.reserve(&*device, 1, 2).unwrap(), 0);
        assert_eq!(uniforms.buffer(), first_buffer);

        assert_eq!(uniforms.reserve(&*device, 1, 1).unwrap(), 2);
        assert_ne!(uniforms.buffer(), first_buffer);
        assert_eq!(uniforms.capacity(), 4);

        assert_eq!(uniforms.reserve(&*device, 2, 1).unwrap(), 0);
    }

    #[test]
    fn writes_land_in_their_slot() {
        let device = HeadlessDevice::new();
        let mut uniforms = SlottedUniformBuffer::new(&*device, "Test", 4).unwrap();
        let slot = uniforms.reserve(&*device, 1, 2).unwrap() + 1;

        let uniform = ModelUniform {
            mvp: Matrix4::identity(),
            model: Matrix4::identity(),
            base_color: Vector4::new(0.25, 0.5, 0.75, 1.0),
        };
        uniforms.write(&*device, slot, &uniform).unwrap();

        let contents = device.buffer_contents(uniforms.buffer()).unwrap();
        let start = (slot as u64 * MODEL_SLOT_STRIDE) as usize;
        let written = &contents[start..start + MODEL_UNIFORM_SIZE as usize];
        assert_eq!(written, bytemuck::bytes_of(&uniform));
        assert!(contents[..start].iter().all(|b| *b == 0));
    }
}
