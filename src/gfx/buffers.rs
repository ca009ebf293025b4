//! GPU buffer arena for uploaded submeshes
//!
//! Owns a fixed-capacity arena of [`SubmeshSlot`]s, one per uploadable
//! submesh. Every slot carries six buffers (positions, normals, colors,
//! UVs, triangle indices, line indices) plus the recorded index counts.
//! All buffers are allocated up front when the set is created and
//! re-filled in place on every upload; a buffer is only reallocated when
//! a submesh outgrows its slot, so steady-state frames perform no
//! allocation.

use std::sync::Arc;

use crate::gfx::vertex;
use crate::mesh::{MeshCapabilities, SubmeshData, MAX_MESHES};

/// Initial byte capacity of each vertex-attribute buffer.
const INITIAL_ATTRIBUTE_CAPACITY: wgpu::BufferAddress = 16 * 1024;

/// Initial byte capacity of each index buffer.
const INITIAL_INDEX_CAPACITY: wgpu::BufferAddress = 32 * 1024;

/// Returns the triangle-index and line-index counts recorded for a
/// submesh: three indices per face, two per line segment.
pub(crate) fn index_counts(submesh: &SubmeshData) -> (u32, u32) {
    (submesh.faces.len() as u32 * 3, submesh.lines.len() as u32 * 2)
}

/// What one upload writes into a slot: byte lengths of the filled
/// buffers, `None` where the upload releases the buffer instead, plus
/// the index counts to record. Pure and deterministic, so re-planning
/// the same submesh always yields the same writes;
/// [`GpuBufferSet::fill_slot`] executes the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotPlan {
    pub positions: wgpu::BufferAddress,
    /// Matches the vertex count even without source normals; the
    /// buffer is zero-filled so the lit pipelines stay valid.
    pub normals: wgpu::BufferAddress,
    pub colors: Option<wgpu::BufferAddress>,
    pub uvs: Option<wgpu::BufferAddress>,
    pub faces: wgpu::BufferAddress,
    pub lines: wgpu::BufferAddress,
    pub triangle_index_count: u32,
    pub line_index_count: u32,
}

impl SlotPlan {
    pub(crate) fn of(submesh: &SubmeshData, caps: MeshCapabilities) -> Self {
        let vertices = submesh.positions.len() as wgpu::BufferAddress;
        let (triangle_index_count, line_index_count) = index_counts(submesh);
        Self {
            positions: vertices * vertex::VEC3_STRIDE,
            normals: vertices * vertex::VEC3_STRIDE,
            colors: submesh
                .colors
                .filter(|_| caps.has_per_vertex_color)
                .map(|c| c.len() as wgpu::BufferAddress * vertex::VEC3_STRIDE),
            uvs: submesh
                .uvs
                .filter(|_| caps.has_per_vertex_uv)
                .map(|uv| uv.len() as wgpu::BufferAddress * vertex::VEC2_STRIDE),
            faces: triangle_index_count as wgpu::BufferAddress * vertex::INDEX_STRIDE,
            lines: line_index_count as wgpu::BufferAddress * vertex::INDEX_STRIDE,
            triangle_index_count,
            line_index_count,
        }
    }
}

/// Growth policy for a buffer that a submesh has outgrown.
pub(crate) fn grown_capacity(
    current: wgpu::BufferAddress,
    needed: wgpu::BufferAddress,
) -> wgpu::BufferAddress {
    if needed <= current {
        current
    } else {
        needed.next_power_of_two()
    }
}

/// One GPU buffer with explicit liveness and fill-length bookkeeping.
///
/// `live` distinguishes "device memory released" from "filled to zero
/// length"; a cleared buffer is recreated transparently on the next
/// write.
struct AttributeBuffer {
    buffer: wgpu::Buffer,
    capacity: wgpu::BufferAddress,
    len: wgpu::BufferAddress,
    live: bool,
    usage: wgpu::BufferUsages,
    label: String,
}

impl AttributeBuffer {
    fn new(
        device: &wgpu::Device,
        label: String,
        capacity: wgpu::BufferAddress,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let buffer = Self::create(device, &label, capacity, usage);
        Self {
            buffer,
            capacity,
            len: 0,
            live: true,
            usage,
            label,
        }
    }

    fn create(
        device: &wgpu::Device,
        label: &str,
        capacity: wgpu::BufferAddress,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Fully replaces the buffer contents, growing the allocation only
    /// when the payload exceeds the current capacity.
    fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, bytes: &[u8]) {
        let needed = bytes.len() as wgpu::BufferAddress;
        if !self.live || needed > self.capacity {
            self.capacity = grown_capacity(self.capacity, needed);
            self.buffer = Self::create(device, &self.label, self.capacity, self.usage);
            self.live = true;
        }
        if !bytes.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytes);
        }
        self.len = needed;
    }

    /// Releases the device memory behind the buffer without forgetting
    /// the slot; the next write recreates it.
    fn clear(&mut self) {
        if self.live {
            self.buffer.destroy();
            self.live = false;
        }
        self.len = 0;
    }

    fn slice(&self) -> wgpu::BufferSlice<'_> {
        debug_assert!(self.live, "sliced a cleared buffer");
        self.buffer.slice(..self.len)
    }
}

/// The six buffers and two index counts of one submesh slot.
pub struct SubmeshSlot {
    positions: AttributeBuffer,
    normals: AttributeBuffer,
    colors: AttributeBuffer,
    texcoords: AttributeBuffer,
    faces: AttributeBuffer,
    lines: AttributeBuffer,
    triangle_index_count: u32,
    line_index_count: u32,
}

impl SubmeshSlot {
    fn new(device: &wgpu::Device, index: usize) -> Self {
        let vertex = wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST;
        let index_usage = wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST;
        let attr = |name: &str| format!("submesh {index} {name}");
        Self {
            positions: AttributeBuffer::new(
                device,
                attr("positions"),
                INITIAL_ATTRIBUTE_CAPACITY,
                vertex,
            ),
            normals: AttributeBuffer::new(
                device,
                attr("normals"),
                INITIAL_ATTRIBUTE_CAPACITY,
                vertex,
            ),
            colors: AttributeBuffer::new(
                device,
                attr("colors"),
                INITIAL_ATTRIBUTE_CAPACITY,
                vertex,
            ),
            texcoords: AttributeBuffer::new(
                device,
                attr("texcoords"),
                INITIAL_ATTRIBUTE_CAPACITY,
                vertex,
            ),
            faces: AttributeBuffer::new(device, attr("faces"), INITIAL_INDEX_CAPACITY, index_usage),
            lines: AttributeBuffer::new(device, attr("lines"), INITIAL_INDEX_CAPACITY, index_usage),
            triangle_index_count: 0,
            line_index_count: 0,
        }
    }

    /// Number of triangle indices recorded for this slot. Zero marks the
    /// slot empty; empty slots are skipped at render time in every mode.
    pub fn triangle_index_count(&self) -> u32 {
        self.triangle_index_count
    }

    /// Number of line indices recorded for this slot.
    pub fn line_index_count(&self) -> u32 {
        self.line_index_count
    }

    pub(crate) fn positions_slice(&self) -> wgpu::BufferSlice<'_> {
        self.positions.slice()
    }

    pub(crate) fn normals_slice(&self) -> wgpu::BufferSlice<'_> {
        self.normals.slice()
    }

    pub(crate) fn colors_slice(&self) -> wgpu::BufferSlice<'_> {
        self.colors.slice()
    }

    pub(crate) fn texcoords_slice(&self) -> wgpu::BufferSlice<'_> {
        self.texcoords.slice()
    }

    pub(crate) fn faces_slice(&self) -> wgpu::BufferSlice<'_> {
        self.faces.slice()
    }

    pub(crate) fn lines_slice(&self) -> wgpu::BufferSlice<'_> {
        self.lines.slice()
    }

    fn clear(&mut self) {
        self.positions.clear();
        self.normals.clear();
        self.colors.clear();
        self.texcoords.clear();
        self.faces.clear();
        self.lines.clear();
        self.triangle_index_count = 0;
        self.line_index_count = 0;
    }
}

/// Fixed-capacity arena of [`MAX_MESHES`] submesh slots.
pub struct GpuBufferSet {
    device: Arc<wgpu::Device>,
    slots: Vec<SubmeshSlot>,
    // Scratch used to zero-fill the normal buffer for meshes without
    // normals, reused across uploads.
    zero_scratch: Vec<[f32; 3]>,
    destroyed: bool,
}

impl GpuBufferSet {
    /// Allocates every slot's buffers up front at their initial
    /// capacities. Called once when the owning renderer is built.
    pub fn allocate(device: Arc<wgpu::Device>) -> Self {
        let slots = (0..MAX_MESHES).map(|i| SubmeshSlot::new(&device, i)).collect();
        Self {
            device,
            slots,
            zero_scratch: Vec::new(),
            destroyed: false,
        }
    }

    pub fn slot(&self, index: usize) -> &SubmeshSlot {
        &self.slots[index]
    }

    /// Fully replaces the contents of one slot from a submesh.
    ///
    /// The position and both index buffers are always written; normal,
    /// color and UV buffers follow the capability flags. Meshes without
    /// normals get a zero-filled normal buffer so the lit pipelines stay
    /// valid, while absent color/UV data releases those buffers.
    ///
    /// # Panics
    /// Panics if called after [`GpuBufferSet::destroy_all`].
    pub fn fill_slot(
        &mut self,
        queue: &wgpu::Queue,
        index: usize,
        submesh: &SubmeshData,
        caps: MeshCapabilities,
    ) {
        assert!(!self.destroyed, "buffer set used after destroy_all");
        let plan = SlotPlan::of(submesh, caps);
        let slot = &mut self.slots[index];
        let device = self.device.as_ref();

        slot.positions
            .write(device, queue, bytemuck::cast_slice(submesh.positions));

        match submesh.normals.filter(|_| caps.has_per_vertex_normals) {
            Some(normals) => slot
                .normals
                .write(device, queue, bytemuck::cast_slice(normals)),
            None => {
                if self.zero_scratch.len() < submesh.positions.len() {
                    self.zero_scratch.resize(submesh.positions.len(), [0.0; 3]);
                }
                let zeros = &self.zero_scratch[..submesh.positions.len()];
                slot.normals.write(device, queue, bytemuck::cast_slice(zeros));
            }
        }

        match submesh.colors.filter(|_| plan.colors.is_some()) {
            Some(colors) => slot.colors.write(device, queue, bytemuck::cast_slice(colors)),
            None => slot.colors.clear(),
        }

        match submesh.uvs.filter(|_| plan.uvs.is_some()) {
            Some(uvs) => slot.texcoords.write(device, queue, bytemuck::cast_slice(uvs)),
            None => slot.texcoords.clear(),
        }

        slot.faces
            .write(device, queue, bytemuck::cast_slice(submesh.faces));
        slot.lines
            .write(device, queue, bytemuck::cast_slice(submesh.lines));

        slot.triangle_index_count = plan.triangle_index_count;
        slot.line_index_count = plan.line_index_count;
    }

    /// Releases one slot's device memory and zeroes its index counts.
    pub fn clear_slot(&mut self, index: usize) {
        self.slots[index].clear();
    }

    /// Releases the device memory of the first `count` slots without
    /// destroying the arena, e.g. when the host is backgrounded. Cleared
    /// slots read as empty until the next upload refills them.
    pub fn clear_all(&mut self, count: usize) {
        for slot in self.slots.iter_mut().take(count.min(MAX_MESHES)) {
            slot.clear();
        }
    }

    /// Destroys every buffer. The set must not be refilled afterwards;
    /// runs automatically (exactly once) when the set is dropped.
    pub fn destroy_all(&mut self) {
        if self.destroyed {
            return;
        }
        for slot in &mut self.slots {
            slot.clear();
        }
        self.destroyed = true;
    }
}

impl Drop for GpuBufferSet {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_counts() {
        let positions = [[0.0f32; 3]; 4];
        let faces = [[0u32, 1, 2], [0, 2, 3]];
        let lines = [[0u32, 1], [1, 2], [2, 3]];
        let submesh = SubmeshData {
            positions: &positions,
            normals: None,
            colors: None,
            uvs: None,
            faces: &faces,
            lines: &lines,
        };
        assert_eq!(index_counts(&submesh), (6, 6));
    }

    #[test]
    fn test_index_counts_empty_submesh() {
        let positions = [[0.0f32; 3]; 4];
        let submesh = SubmeshData {
            positions: &positions,
            normals: None,
            colors: None,
            uvs: None,
            faces: &[],
            lines: &[],
        };
        assert_eq!(index_counts(&submesh), (0, 0));
    }

    const TEN_VERTICES: [[f32; 3]; 10] = [[0.0; 3]; 10];
    const TEN_COLORS: [[f32; 3]; 10] = [[0.5; 3]; 10];
    const EIGHT_FACES: [[u32; 3]; 8] = [[0, 1, 2]; 8];

    fn colored_submesh() -> SubmeshData<'static> {
        SubmeshData {
            positions: &TEN_VERTICES,
            normals: None,
            colors: Some(&TEN_COLORS),
            uvs: None,
            faces: &EIGHT_FACES,
            lines: &[],
        }
    }

    fn colored_caps() -> MeshCapabilities {
        MeshCapabilities {
            has_per_vertex_color: true,
            has_per_vertex_normals: false,
            has_per_vertex_uv: false,
            has_texture: false,
        }
    }

    #[test]
    fn test_slot_plan_byte_lengths() {
        let plan = SlotPlan::of(&colored_submesh(), colored_caps());
        assert_eq!(plan.positions, 10 * vertex::VEC3_STRIDE);
        assert_eq!(plan.normals, 10 * vertex::VEC3_STRIDE);
        assert_eq!(plan.colors, Some(10 * vertex::VEC3_STRIDE));
        assert_eq!(plan.uvs, None);
        assert_eq!(plan.faces, 24 * vertex::INDEX_STRIDE);
        assert_eq!(plan.lines, 0);
        assert_eq!(plan.triangle_index_count, 24);
        assert_eq!(plan.line_index_count, 0);
    }

    #[test]
    fn test_slot_plan_is_deterministic() {
        // Re-uploading the same snapshot writes the same bytes and
        // records the same counts.
        let first = SlotPlan::of(&colored_submesh(), colored_caps());
        let second = SlotPlan::of(&colored_submesh(), colored_caps());
        assert_eq!(first, second);
    }

    #[test]
    fn test_slot_plan_releases_unsupported_attributes() {
        // Colors present on this submesh but not on every submesh of
        // the snapshot: the mesh-wide flag is down, so the color buffer
        // is released rather than filled.
        let plan = SlotPlan::of(&colored_submesh(), MeshCapabilities::default());
        assert_eq!(plan.colors, None);
        assert_eq!(plan.uvs, None);
    }

    #[test]
    fn test_grown_capacity_keeps_fitting_allocation() {
        assert_eq!(grown_capacity(1024, 512), 1024);
        assert_eq!(grown_capacity(1024, 1024), 1024);
    }

    #[test]
    fn test_grown_capacity_rounds_up() {
        assert_eq!(grown_capacity(1024, 1025), 2048);
        assert_eq!(grown_capacity(1024, 3000), 4096);
    }
}
