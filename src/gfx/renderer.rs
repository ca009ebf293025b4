//! Mesh renderer: upload, mode reconciliation and per-frame drawing
//!
//! Owns the submesh buffer arena, the video texture uploader and the
//! four mode pipelines. Uploads fully replace the previous mesh; each
//! render reconciles the requested mode against what the uploaded data
//! supports, then draws every non-empty slot with the winning pipeline.

use std::sync::Arc;

use cgmath::Matrix4;
use log::{debug, warn};

use crate::gfx::buffers::GpuBufferSet;
use crate::gfx::context::RenderContext;
use crate::gfx::shaders::{
    LightedGrayShader, PerVertexColorShader, ShaderService, XRayShader, YCbCrTextureShader,
};
use crate::gfx::texture::{DepthTexture, VideoTextureUploader};
use crate::mesh::{MeshCapabilities, MeshSnapshot, MAX_MESHES};

/// How the uploaded mesh is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingMode {
    /// Depth-faded wireframe, the live scanning cue.
    XRay,
    /// Per-vertex colored surface.
    PerVertexColor,
    /// Surface textured from the uploaded camera frame.
    Textured,
    /// Neutral lit gray.
    LightedGray,
}

/// Resolves the requested mode against the mesh capabilities.
///
/// Performs at most one transition per call, and only between the two
/// color-bearing modes: a per-vertex-color request without colors moves
/// to textured when a texture with UVs exists, and a textured request
/// without texture or UVs moves to per-vertex color when colors exist.
/// Any other mismatch is left alone; the caller skips drawing for it
/// instead of correcting twice. XRay and LightedGray need nothing
/// beyond positions and never change.
pub fn reconcile(mode: RenderingMode, caps: MeshCapabilities) -> RenderingMode {
    let textured_ok = caps.has_texture && caps.has_per_vertex_uv;
    match mode {
        RenderingMode::PerVertexColor if !caps.has_per_vertex_color && textured_ok => {
            RenderingMode::Textured
        }
        RenderingMode::Textured if !textured_ok && caps.has_per_vertex_color => {
            RenderingMode::PerVertexColor
        }
        other => other,
    }
}

/// Number of submeshes one upload accepts from a snapshot; overflow is
/// dropped silently.
pub(crate) fn upload_count(submesh_count: usize) -> usize {
    submesh_count.min(MAX_MESHES)
}

/// One draw call the frame plan has decided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DrawBatch {
    pub slot: usize,
    pub index_count: u32,
}

/// Everything the frame plan needs, gathered before the pass begins.
pub(crate) struct FrameInputs<'a> {
    pub mode: RenderingMode,
    pub caps: MeshCapabilities,
    /// Whether a complete luma/chroma frame is currently bound.
    pub texture_bound: bool,
    pub triangle_counts: &'a [u32],
    pub line_counts: &'a [u32],
}

/// Decides the effective mode and the draw list for one frame.
///
/// A reconciliation step yields the new mode with an empty draw list;
/// the switched-to mode draws from the next frame on. A mode whose
/// precondition fails without a reconciliation target also draws
/// nothing. Reconciliation reads only the derived capability flags;
/// whether the plane textures are actually bound is a separate skip
/// guard, so a failed frame upload (flag set, planes absent) skips
/// textured draws without losing the caller's mode. A slot with no
/// triangle indices is empty and is skipped in every mode, including
/// the wireframe one.
pub(crate) fn plan_frame(inputs: &FrameInputs) -> (RenderingMode, Vec<DrawBatch>) {
    let caps = inputs.caps;
    let mode = reconcile(inputs.mode, caps);
    if mode != inputs.mode {
        return (mode, Vec::new());
    }
    let supported = match mode {
        RenderingMode::XRay | RenderingMode::LightedGray => true,
        RenderingMode::PerVertexColor => caps.has_per_vertex_color,
        RenderingMode::Textured => {
            caps.has_texture && caps.has_per_vertex_uv && inputs.texture_bound
        }
    };
    if !supported {
        return (mode, Vec::new());
    }

    let counts = match mode {
        RenderingMode::XRay => inputs.line_counts,
        _ => inputs.triangle_counts,
    };
    let batches = counts
        .iter()
        .zip(inputs.triangle_counts)
        .enumerate()
        .filter(|&(_, (&count, &triangles))| triangles > 0 && count > 0)
        .map(|(slot, (&count, _))| DrawBatch {
            slot,
            index_count: count,
        })
        .collect();
    (mode, batches)
}

/// Host depth-test preference, forced on for the duration of a render
/// and restored afterwards.
#[derive(Debug, Clone, Copy)]
struct DepthTestScope {
    enabled: bool,
}

impl DepthTestScope {
    fn begin(&mut self) -> bool {
        let previous = self.enabled;
        self.enabled = true;
        previous
    }

    fn end(&mut self, previous: bool) {
        self.enabled = previous;
    }
}

/// Renders scan mesh snapshots into a caller-provided color target.
pub struct MeshRenderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffers: GpuBufferSet,
    textures: VideoTextureUploader,
    lighted_gray: LightedGrayShader,
    per_vertex_color: PerVertexColorShader,
    xray: XRayShader,
    textured: YCbCrTextureShader,
    depth: Option<DepthTexture>,
    mode: RenderingMode,
    caps: MeshCapabilities,
    /// Number of slots filled by the latest upload.
    uploaded: usize,
    depth_test: DepthTestScope,
}

impl MeshRenderer {
    /// Builds the renderer, allocating every submesh slot up front.
    ///
    /// `output_format` is the format of the color targets the host will
    /// pass to [`MeshRenderer::render`].
    pub fn new(context: &RenderContext, output_format: wgpu::TextureFormat) -> Self {
        let device = Arc::clone(context.device());
        let queue = Arc::clone(context.queue());
        let buffers = GpuBufferSet::allocate(Arc::clone(&device));
        Self {
            lighted_gray: LightedGrayShader::new(&device, output_format),
            per_vertex_color: PerVertexColorShader::new(&device, output_format),
            xray: XRayShader::new(&device, output_format),
            textured: YCbCrTextureShader::new(&device, output_format),
            device,
            queue,
            buffers,
            textures: VideoTextureUploader::new(),
            depth: None,
            mode: RenderingMode::LightedGray,
            caps: MeshCapabilities::default(),
            uploaded: 0,
            depth_test: DepthTestScope { enabled: true },
        }
    }

    /// Requests a rendering mode. The mode actually used may differ
    /// after reconciliation against the uploaded mesh; read it back via
    /// [`MeshRenderer::rendering_mode`].
    pub fn set_rendering_mode(&mut self, mode: RenderingMode) {
        self.mode = mode;
    }

    pub fn rendering_mode(&self) -> RenderingMode {
        self.mode
    }

    /// Host depth-test preference; forced on during rendering and
    /// restored afterwards.
    pub fn set_depth_test_enabled(&mut self, enabled: bool) {
        self.depth_test.enabled = enabled;
    }

    pub fn depth_test_enabled(&self) -> bool {
        self.depth_test.enabled
    }

    /// Capability flags derived from the latest upload.
    pub fn capabilities(&self) -> MeshCapabilities {
        self.caps
    }

    /// Replaces the uploaded mesh with the snapshot's contents.
    ///
    /// Submeshes beyond [`MAX_MESHES`] are dropped with a warning.
    /// A color frame, when present, is uploaded before the geometry; a
    /// frame that fails validation is logged and skipped, leaving the
    /// renderer textureless but otherwise consistent.
    pub fn upload_mesh(&mut self, snapshot: &MeshSnapshot) {
        let submeshes = snapshot.submeshes();
        let count = upload_count(submeshes.len());
        if submeshes.len() > count {
            warn!(
                "snapshot holds {} submeshes, uploading the first {count}",
                submeshes.len()
            );
        }

        self.caps = snapshot.capabilities();
        if let Some(frame) = snapshot.color_frame() {
            if let Err(err) = self.textures.upload(&self.device, &self.queue, frame) {
                // Capability flags stand; rendering detects the absent
                // frame and falls back or skips.
                warn!("color frame rejected: {err}");
            }
        }

        for (index, submesh) in submeshes[..count].iter().enumerate() {
            self.buffers.fill_slot(&self.queue, index, submesh, self.caps);
        }
        // Slots the previous upload filled but this one did not.
        if self.uploaded > count {
            for index in count..self.uploaded {
                self.buffers.clear_slot(index);
            }
        }
        self.uploaded = count;
        debug!("uploaded {count} submeshes, capabilities {:?}", self.caps);
    }

    fn ensure_depth(&mut self, width: u32, height: u32) {
        let stale = match &self.depth {
            Some(depth) => depth.width != width || depth.height != height,
            None => true,
        };
        if stale {
            self.depth = Some(DepthTexture::create(&self.device, width, height));
        }
    }

    fn service(&self, mode: RenderingMode) -> &dyn ShaderService {
        match mode {
            RenderingMode::XRay => &self.xray,
            RenderingMode::PerVertexColor => &self.per_vertex_color,
            RenderingMode::Textured => &self.textured,
            RenderingMode::LightedGray => &self.lighted_gray,
        }
    }

    fn slot_counts(&self) -> (Vec<u32>, Vec<u32>) {
        (0..self.uploaded)
            .map(|i| {
                let slot = self.buffers.slot(i);
                (slot.triangle_index_count(), slot.line_index_count())
            })
            .unzip()
    }

    /// Renders the uploaded mesh into `view` over existing contents.
    ///
    /// Reconciles the requested mode first. A frame that reconciles to
    /// a different mode stores it and draws nothing; drawing resumes on
    /// the next call. A mode whose precondition fails without a
    /// reconciliation target is skipped with a log line.
    pub fn render(
        &mut self,
        view: &wgpu::TextureView,
        width: u32,
        height: u32,
        projection: &Matrix4<f32>,
        model_view: &Matrix4<f32>,
    ) {
        self.ensure_depth(width, height);
        let (triangle_counts, line_counts) = self.slot_counts();
        let (mode, batches) = plan_frame(&FrameInputs {
            mode: self.mode,
            caps: self.caps,
            texture_bound: self.textures.has_frame(),
            triangle_counts: &triangle_counts,
            line_counts: &line_counts,
        });
        if mode != self.mode {
            debug!("rendering mode reconciled from {:?} to {mode:?}", self.mode);
            self.mode = mode;
            return;
        }
        if batches.is_empty() {
            debug!("nothing to draw in {mode:?}");
            return;
        }

        let depth_view = match &self.depth {
            Some(depth) => &depth.view,
            None => return,
        };
        let previous_depth = self.depth_test.begin();
        let service = self.service(mode);
        service.prepare_rendering(&self.queue, projection, model_view);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mesh render encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("mesh render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            service.enable(&mut pass);
            if mode == RenderingMode::Textured {
                match self.textures.frame_bind_group() {
                    Some(frame) => pass.set_bind_group(1, frame, &[]),
                    // plan_frame only picks Textured with a bound frame.
                    None => unreachable!("textured mode planned without a bound frame"),
                }
            }

            for batch in &batches {
                let slot = self.buffers.slot(batch.slot);
                match mode {
                    RenderingMode::XRay => {
                        pass.set_vertex_buffer(0, slot.positions_slice());
                        pass.set_vertex_buffer(1, slot.normals_slice());
                        pass.set_index_buffer(slot.lines_slice(), wgpu::IndexFormat::Uint32);
                    }
                    RenderingMode::LightedGray => {
                        pass.set_vertex_buffer(0, slot.positions_slice());
                        pass.set_vertex_buffer(1, slot.normals_slice());
                        pass.set_index_buffer(slot.faces_slice(), wgpu::IndexFormat::Uint32);
                    }
                    RenderingMode::PerVertexColor => {
                        pass.set_vertex_buffer(0, slot.positions_slice());
                        pass.set_vertex_buffer(1, slot.normals_slice());
                        pass.set_vertex_buffer(2, slot.colors_slice());
                        pass.set_index_buffer(slot.faces_slice(), wgpu::IndexFormat::Uint32);
                    }
                    RenderingMode::Textured => {
                        pass.set_vertex_buffer(0, slot.positions_slice());
                        pass.set_vertex_buffer(1, slot.texcoords_slice());
                        pass.set_index_buffer(slot.faces_slice(), wgpu::IndexFormat::Uint32);
                    }
                }
                pass.draw_indexed(0..batch.index_count, 0, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.depth_test.end(previous_depth);
    }

    /// Clears `view` to the current mode's background color and resets
    /// the depth buffer, drawing nothing.
    pub fn clear(&mut self, view: &wgpu::TextureView, width: u32, height: u32) {
        self.ensure_depth(width, height);
        let depth_view = match &self.depth {
            Some(depth) => &depth.view,
            None => return,
        };
        let level = match self.mode {
            RenderingMode::PerVertexColor | RenderingMode::Textured => 0.9,
            RenderingMode::LightedGray => 0.3,
            RenderingMode::XRay => 0.4,
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mesh clear encoder"),
            });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("mesh clear pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: level,
                        g: level,
                        b: level,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Releases the device memory of every uploaded submesh slot. The
    /// arena survives and the next upload refills it.
    pub fn release_buffers(&mut self) {
        self.buffers.clear_all(self.uploaded);
        self.uploaded = 0;
    }

    /// Releases the bound frame textures and their cache.
    pub fn release_textures(&mut self) {
        self.textures.release();
    }

    /// Tears down every GPU resource the renderer owns. Also runs on
    /// drop; uploading after this call panics.
    pub fn destroy(&mut self) {
        self.release_textures();
        self.buffers.destroy_all();
        self.depth = None;
        self.uploaded = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(color: bool, normals: bool, uv: bool, texture: bool) -> MeshCapabilities {
        MeshCapabilities {
            has_per_vertex_color: color,
            has_per_vertex_normals: normals,
            has_per_vertex_uv: uv,
            has_texture: texture,
        }
    }

    const ALL_MODES: [RenderingMode; 4] = [
        RenderingMode::XRay,
        RenderingMode::PerVertexColor,
        RenderingMode::Textured,
        RenderingMode::LightedGray,
    ];

    #[test]
    fn test_reconcile_supported_modes_are_stable() {
        let full = caps(true, true, true, true);
        for mode in ALL_MODES {
            assert_eq!(reconcile(mode, full), mode);
        }
    }

    #[test]
    fn test_reconcile_color_without_colors_moves_to_textured() {
        assert_eq!(
            reconcile(RenderingMode::PerVertexColor, caps(false, true, true, true)),
            RenderingMode::Textured
        );
    }

    #[test]
    fn test_reconcile_textured_without_texture_moves_to_color() {
        assert_eq!(
            reconcile(RenderingMode::Textured, caps(true, true, true, false)),
            RenderingMode::PerVertexColor
        );
        assert_eq!(
            reconcile(RenderingMode::Textured, caps(true, true, false, true)),
            RenderingMode::PerVertexColor
        );
    }

    #[test]
    fn test_reconcile_leaves_hopeless_mismatches_alone() {
        // Neither colors nor texture: no correction, drawing is skipped.
        let bare = caps(false, false, false, false);
        assert_eq!(
            reconcile(RenderingMode::PerVertexColor, bare),
            RenderingMode::PerVertexColor
        );
        assert_eq!(reconcile(RenderingMode::Textured, bare), RenderingMode::Textured);
    }

    #[test]
    fn test_reconcile_single_step_no_oscillation() {
        for color in [false, true] {
            for uv in [false, true] {
                for texture in [false, true] {
                    let c = caps(color, false, uv, texture);
                    for mode in ALL_MODES {
                        let once = reconcile(mode, c);
                        assert_eq!(reconcile(once, c), once);
                    }
                }
            }
        }
    }

    #[test]
    fn test_plan_skips_empty_slots_in_every_mode() {
        let triangles = [0, 24, 0];
        let lines = [0, 16, 8];
        for mode in [
            RenderingMode::XRay,
            RenderingMode::LightedGray,
            RenderingMode::PerVertexColor,
        ] {
            let (_, batches) = plan_frame(&FrameInputs {
                mode,
                caps: caps(true, true, true, false),
                texture_bound: false,
                triangle_counts: &triangles,
                line_counts: &lines,
            });
            assert_eq!(batches.len(), 1);
            assert_eq!(batches[0].slot, 1);
        }
    }

    #[test]
    fn test_plan_draws_one_batch_for_partly_empty_snapshot() {
        // Two submeshes, the second carries no faces.
        let (mode, batches) = plan_frame(&FrameInputs {
            mode: RenderingMode::PerVertexColor,
            caps: caps(true, false, false, false),
            texture_bound: false,
            triangle_counts: &[24, 0],
            line_counts: &[0, 0],
        });
        assert_eq!(mode, RenderingMode::PerVertexColor);
        assert_eq!(
            batches,
            vec![DrawBatch {
                slot: 0,
                index_count: 24
            }]
        );
    }

    #[test]
    fn test_plan_uses_line_counts_for_xray() {
        let (mode, batches) = plan_frame(&FrameInputs {
            mode: RenderingMode::XRay,
            caps: MeshCapabilities::default(),
            texture_bound: false,
            triangle_counts: &[24, 12],
            line_counts: &[30, 0],
        });
        assert_eq!(mode, RenderingMode::XRay);
        assert_eq!(
            batches,
            vec![DrawBatch {
                slot: 0,
                index_count: 30
            }]
        );
    }

    #[test]
    fn test_plan_textured_without_texture_flips_mode_and_draws_nothing() {
        // No frame in the snapshot, colors available: the mode flips
        // and the switch frame itself issues no draws even though the
        // slots hold geometry.
        let (mode, batches) = plan_frame(&FrameInputs {
            mode: RenderingMode::Textured,
            caps: caps(true, true, true, false),
            texture_bound: false,
            triangle_counts: &[24],
            line_counts: &[0],
        });
        assert_eq!(mode, RenderingMode::PerVertexColor);
        assert!(batches.is_empty());
    }

    #[test]
    fn test_plan_textured_with_absent_planes_skips_without_flip() {
        // The snapshot promised a texture but the frame upload failed,
        // so the planes are unbound. The caller's mode stands and the
        // call skips; the next good frame renders textured again.
        let (mode, batches) = plan_frame(&FrameInputs {
            mode: RenderingMode::Textured,
            caps: caps(true, true, true, true),
            texture_bound: false,
            triangle_counts: &[24],
            line_counts: &[0],
        });
        assert_eq!(mode, RenderingMode::Textured);
        assert!(batches.is_empty());

        let (mode, batches) = plan_frame(&FrameInputs {
            mode,
            caps: caps(true, true, true, true),
            texture_bound: true,
            triangle_counts: &[24],
            line_counts: &[0],
        });
        assert_eq!(mode, RenderingMode::Textured);
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn test_upload_count_truncates_at_capacity() {
        assert_eq!(upload_count(MAX_MESHES + 15), MAX_MESHES);
        assert_eq!(upload_count(MAX_MESHES), MAX_MESHES);
        assert_eq!(upload_count(3), 3);
        assert_eq!(upload_count(0), 0);
    }

    #[test]
    fn test_plan_color_with_only_texture_flips_then_draws() {
        let c = caps(false, false, true, true);
        let (mode, batches) = plan_frame(&FrameInputs {
            mode: RenderingMode::PerVertexColor,
            caps: c,
            texture_bound: true,
            triangle_counts: &[6],
            line_counts: &[0],
        });
        assert_eq!(mode, RenderingMode::Textured);
        assert!(batches.is_empty());

        // Next frame starts in the reconciled mode and draws.
        let (mode, batches) = plan_frame(&FrameInputs {
            mode,
            caps: c,
            texture_bound: true,
            triangle_counts: &[6],
            line_counts: &[0],
        });
        assert_eq!(mode, RenderingMode::Textured);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].index_count, 6);
    }

    #[test]
    fn test_plan_skips_unsupported_mode_without_correction() {
        let (mode, batches) = plan_frame(&FrameInputs {
            mode: RenderingMode::PerVertexColor,
            caps: caps(false, false, false, false),
            texture_bound: false,
            triangle_counts: &[24],
            line_counts: &[0],
        });
        assert_eq!(mode, RenderingMode::PerVertexColor);
        assert!(batches.is_empty());
    }

    #[test]
    fn test_depth_scope_restores_preference() {
        let mut scope = DepthTestScope { enabled: false };
        let previous = scope.begin();
        assert!(scope.enabled);
        scope.end(previous);
        assert!(!scope.enabled);

        let mut scope = DepthTestScope { enabled: true };
        let previous = scope.begin();
        scope.end(previous);
        assert!(scope.enabled);
    }
}
