// src/lib.rs
//! Scanmesh rendering core
//!
//! Real-time mesh rendering for a 3D-scanning pipeline, built on wgpu.
//! The scanning host feeds the renderer borrowed [`MeshSnapshot`]s (up
//! to [`MAX_MESHES`] submeshes plus an optional YCbCr camera frame) and
//! drives it once per display frame; the renderer keeps GPU buffers
//! warm across uploads and reconciles the requested [`RenderingMode`]
//! against what the uploaded data can support.

pub mod gfx;
pub mod mesh;

// Re-export main types for convenience
pub use gfx::context::{ContextError, RenderContext};
pub use gfx::renderer::{MeshRenderer, RenderingMode};
pub use mesh::{
    MeshCapabilities, MeshSnapshot, PixelFormat, SubmeshData, YCbCrFrame, MAX_MESHES,
};
