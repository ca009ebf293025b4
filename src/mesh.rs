//! Mesh snapshot data model
//!
//! Defines the immutable, borrowed view of one scan result that the
//! renderer consumes per upload: submesh geometry, an optional shared
//! color video frame, and the capability flags derived from both.

/// Maximum number of submeshes the renderer uploads from one snapshot.
///
/// Submeshes beyond this cap are silently dropped on upload.
pub const MAX_MESHES: usize = 30;

/// Pixel layout of a video frame handed to the renderer.
///
/// Only [`PixelFormat::YCbCr420BiPlanarFullRange`] is accepted by the
/// texture upload path; passing any other variant is a contract
/// violation and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 4:2:0 bi-planar YCbCr, full range (the scanning camera's native output).
    YCbCr420BiPlanarFullRange,
    /// 4:2:0 bi-planar YCbCr, video (limited) range.
    YCbCr420BiPlanarVideoRange,
    /// Packed 8-bit BGRA.
    Bgra8,
}

/// A borrowed planar YCbCr video frame.
///
/// The luma plane is full resolution; the chroma plane holds interleaved
/// CbCr samples at half resolution in both axes. Both planes are borrowed
/// for the duration of the upload call and never retained.
#[derive(Debug, Clone, Copy)]
pub struct YCbCrFrame<'a> {
    pub format: PixelFormat,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Luma (Y) plane, `luma_stride` bytes per row, `height` rows.
    pub luma: &'a [u8],
    /// Byte stride of one luma row. May exceed `width` for alignment padding.
    pub luma_stride: u32,
    /// Chroma (CbCr) plane, `chroma_stride` bytes per row, `height / 2` rows.
    pub chroma: &'a [u8],
    /// Byte stride of one chroma row (two bytes per sample pair).
    pub chroma_stride: u32,
}

/// Geometry of one contiguous batch within a multi-part mesh.
///
/// Positions, faces and lines are always present; normals, colors and UV
/// coordinates are optional and, when present, run parallel to
/// `positions`.
#[derive(Debug, Clone, Copy)]
pub struct SubmeshData<'a> {
    pub positions: &'a [[f32; 3]],
    pub normals: Option<&'a [[f32; 3]]>,
    pub colors: Option<&'a [[f32; 3]]>,
    pub uvs: Option<&'a [[f32; 2]]>,
    /// Triangle index triples.
    pub faces: &'a [[u32; 3]],
    /// Line-segment index pairs.
    pub lines: &'a [[u32; 2]],
}

/// Attribute availability derived from a snapshot on every upload.
///
/// A flag is set only when *every* submesh in the snapshot carries the
/// attribute, so a set flag guarantees the corresponding GPU buffer is
/// filled for every uploaded slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshCapabilities {
    pub has_per_vertex_color: bool,
    pub has_per_vertex_normals: bool,
    pub has_per_vertex_uv: bool,
    pub has_texture: bool,
}

impl MeshCapabilities {
    /// Derives the capability flags for a snapshot.
    pub fn of(snapshot: &MeshSnapshot) -> Self {
        let submeshes = snapshot.submeshes();
        let all = |f: fn(&SubmeshData) -> bool| !submeshes.is_empty() && submeshes.iter().all(f);
        Self {
            has_per_vertex_color: all(|s| s.colors.is_some()),
            has_per_vertex_normals: all(|s| s.normals.is_some()),
            has_per_vertex_uv: all(|s| s.uvs.is_some()),
            has_texture: snapshot.color_frame().is_some(),
        }
    }
}

/// Immutable view of one scan result, consumed once per upload.
///
/// Borrows all geometry and the optional color frame from the producing
/// scanning pipeline; nothing is copied until the GPU upload itself.
#[derive(Debug, Clone, Copy)]
pub struct MeshSnapshot<'a> {
    submeshes: &'a [SubmeshData<'a>],
    color_frame: Option<YCbCrFrame<'a>>,
}

impl<'a> MeshSnapshot<'a> {
    pub fn new(submeshes: &'a [SubmeshData<'a>], color_frame: Option<YCbCrFrame<'a>>) -> Self {
        Self {
            submeshes,
            color_frame,
        }
    }

    pub fn submeshes(&self) -> &'a [SubmeshData<'a>] {
        self.submeshes
    }

    pub fn color_frame(&self) -> Option<&YCbCrFrame<'a>> {
        self.color_frame.as_ref()
    }

    /// Convenience accessor mirroring [`MeshCapabilities::of`].
    pub fn capabilities(&self) -> MeshCapabilities {
        MeshCapabilities::of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSITIONS: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    const NORMALS: [[f32; 3]; 3] = [[0.0, 0.0, 1.0]; 3];
    const COLORS: [[f32; 3]; 3] = [[1.0, 0.5, 0.25]; 3];
    const UVS: [[f32; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
    const FACES: [[u32; 3]; 1] = [[0, 1, 2]];
    const LINES: [[u32; 2]; 3] = [[0, 1], [1, 2], [2, 0]];

    fn bare_submesh() -> SubmeshData<'static> {
        SubmeshData {
            positions: &POSITIONS,
            normals: None,
            colors: None,
            uvs: None,
            faces: &FACES,
            lines: &LINES,
        }
    }

    fn full_submesh() -> SubmeshData<'static> {
        SubmeshData {
            normals: Some(&NORMALS),
            colors: Some(&COLORS),
            uvs: Some(&UVS),
            ..bare_submesh()
        }
    }

    fn test_frame<'a>(luma: &'a [u8], chroma: &'a [u8]) -> YCbCrFrame<'a> {
        YCbCrFrame {
            format: PixelFormat::YCbCr420BiPlanarFullRange,
            width: 4,
            height: 2,
            luma,
            luma_stride: 4,
            chroma,
            chroma_stride: 4,
        }
    }

    #[test]
    fn test_capabilities_all_attributes_present() {
        let submeshes = [full_submesh(), full_submesh()];
        let snapshot = MeshSnapshot::new(&submeshes, None);
        let caps = snapshot.capabilities();
        assert!(caps.has_per_vertex_color);
        assert!(caps.has_per_vertex_normals);
        assert!(caps.has_per_vertex_uv);
        assert!(!caps.has_texture);
    }

    #[test]
    fn test_capabilities_require_every_submesh() {
        // One submesh missing colors clears the mesh-wide flag.
        let submeshes = [full_submesh(), bare_submesh()];
        let snapshot = MeshSnapshot::new(&submeshes, None);
        let caps = snapshot.capabilities();
        assert!(!caps.has_per_vertex_color);
        assert!(!caps.has_per_vertex_normals);
        assert!(!caps.has_per_vertex_uv);
    }

    #[test]
    fn test_capabilities_empty_snapshot() {
        let snapshot = MeshSnapshot::new(&[], None);
        assert_eq!(snapshot.capabilities(), MeshCapabilities::default());
    }

    #[test]
    fn test_has_texture_follows_color_frame() {
        let luma = [0u8; 8];
        let chroma = [128u8; 4];
        let submeshes = [bare_submesh()];
        let snapshot = MeshSnapshot::new(&submeshes, Some(test_frame(&luma, &chroma)));
        assert!(snapshot.capabilities().has_texture);
    }
}
