//! Vertex attribute layouts
//!
//! The scanning pipeline delivers attributes as separate planar arrays,
//! so each attribute gets its own GPU buffer and its own single-entry
//! vertex buffer layout rather than one interleaved struct. Shader
//! locations are fixed across every rendering mode: position 0,
//! normal 1, color 2, and UV 1 (UVs replace normals in the textured
//! pipeline, which uses no lighting).

use std::mem;

/// Byte stride of a position or normal or color attribute (`[f32; 3]`).
pub const VEC3_STRIDE: wgpu::BufferAddress = mem::size_of::<[f32; 3]>() as wgpu::BufferAddress;

/// Byte stride of a UV attribute (`[f32; 2]`).
pub const VEC2_STRIDE: wgpu::BufferAddress = mem::size_of::<[f32; 2]>() as wgpu::BufferAddress;

/// Byte stride of one u32 index.
pub const INDEX_STRIDE: wgpu::BufferAddress = mem::size_of::<u32>() as wgpu::BufferAddress;

const POSITION_ATTR: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const NORMAL_ATTR: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x3];
const COLOR_ATTR: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Float32x3];
const UV_ATTR: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];

fn vec3_layout(attributes: &'static [wgpu::VertexAttribute]) -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: VEC3_STRIDE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes,
    }
}

/// Layout of the position buffer (shader location 0).
pub fn position_layout() -> wgpu::VertexBufferLayout<'static> {
    vec3_layout(&POSITION_ATTR)
}

/// Layout of the normal buffer (shader location 1).
pub fn normal_layout() -> wgpu::VertexBufferLayout<'static> {
    vec3_layout(&NORMAL_ATTR)
}

/// Layout of the per-vertex color buffer (shader location 2).
pub fn color_layout() -> wgpu::VertexBufferLayout<'static> {
    vec3_layout(&COLOR_ATTR)
}

/// Layout of the UV buffer (shader location 1, textured pipeline only).
pub fn uv_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: VEC2_STRIDE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &UV_ATTR,
    }
}
