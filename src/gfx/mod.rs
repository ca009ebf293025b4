//! # Graphics Module
//!
//! GPU-facing half of the crate: device acquisition, the submesh buffer
//! arena, YCbCr texture upload, the four mode pipelines and the
//! renderer that drives them.
//!
//! The host hands the renderer a [`crate::mesh::MeshSnapshot`] per scan
//! update and a color target per frame; everything in between (buffer
//! growth, texture pooling, mode fallback) is handled here.

pub mod buffers;
pub mod context;
pub mod renderer;
pub mod shaders;
pub mod texture;
pub mod vertex;

// Re-export commonly used types
pub use context::RenderContext;
pub use renderer::{MeshRenderer, RenderingMode};
