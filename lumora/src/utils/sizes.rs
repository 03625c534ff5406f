use nalgebra::{Matrix4, Vector4};
use static_assertions::const_assert_eq;

pub const MAT4_SIZE: u64 = size_of::<Matrix4<f32>>() as u64;
pub const VEC4_SIZE: u64 = size_of::<Vector4<f32>>() as u64;

pub const WGPU_VEC4_ALIGN: u64 = 16;

/// wgpu's default `min_uniform_buffer_offset_alignment`.
pub const UNIFORM_OFFSET_ALIGN: u64 = 256;

const_assert_eq!(MAT4_SIZE, 64);
const_assert_eq!(VEC4_SIZE, WGPU_VEC4_ALIGN);

/// Rounds `size` up to the next multiple of `align`. `align` must be a power of two.
pub const fn align_up(size: u64, align: u64) -> u64 {
    (size + align - 1) & !(align - 1)
}
