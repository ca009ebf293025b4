//! Mode selection behavior through the public API, no GPU required.

use scanmesh::gfx::renderer::reconcile;
use scanmesh::{MeshSnapshot, RenderingMode, SubmeshData};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const POSITIONS: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
const COLORS: [[f32; 3]; 3] = [[0.2, 0.4, 0.6]; 3];
const FACES: [[u32; 3]; 1] = [[0, 1, 2]];

fn colored_submesh() -> SubmeshData<'static> {
    SubmeshData {
        positions: &POSITIONS,
        normals: None,
        colors: Some(&COLORS),
        uvs: None,
        faces: &FACES,
        lines: &[],
    }
}

#[test]
fn test_colored_snapshot_keeps_per_vertex_color_mode() {
    init_logging();
    let submeshes = [colored_submesh()];
    let caps = MeshSnapshot::new(&submeshes, None).capabilities();
    assert!(caps.has_per_vertex_color);
    assert_eq!(
        reconcile(RenderingMode::PerVertexColor, caps),
        RenderingMode::PerVertexColor
    );
}

#[test]
fn test_textured_request_on_untextured_snapshot_falls_back_once() {
    init_logging();
    let submeshes = [colored_submesh()];
    let caps = MeshSnapshot::new(&submeshes, None).capabilities();
    assert!(!caps.has_texture);

    let resolved = reconcile(RenderingMode::Textured, caps);
    assert_eq!(resolved, RenderingMode::PerVertexColor);
    assert_eq!(reconcile(resolved, caps), resolved);
}

#[test]
fn test_wireframe_needs_no_capabilities() {
    init_logging();
    let caps = MeshSnapshot::new(&[], None).capabilities();
    assert_eq!(reconcile(RenderingMode::XRay, caps), RenderingMode::XRay);
    assert_eq!(
        reconcile(RenderingMode::LightedGray, caps),
        RenderingMode::LightedGray
    );
}
