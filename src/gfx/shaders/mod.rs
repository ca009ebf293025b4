//! Shader services, one per rendering mode
//!
//! Each service owns its render pipeline, camera uniform buffer and
//! camera bind group. The renderer prepares a service once per frame
//! (uniform write) and enables it on the pass before issuing draws.
//! All WGSL sources are compiled in via `include_str!`.

use cgmath::Matrix4;

use crate::gfx::texture::{frame_bind_group_layout, DEPTH_FORMAT};
use crate::gfx::vertex;

/// Camera matrices as they land in the uniform buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniform {
    projection: [[f32; 4]; 4],
    model_view: [[f32; 4]; 4],
}

/// Common interface of the four mode pipelines.
pub(crate) trait ShaderService {
    /// Writes the camera matrices for the coming frame.
    fn prepare_rendering(
        &self,
        queue: &wgpu::Queue,
        projection: &Matrix4<f32>,
        model_view: &Matrix4<f32>,
    );

    /// Binds the pipeline and camera onto the pass.
    fn enable(&self, pass: &mut wgpu::RenderPass<'_>);
}

/// Camera uniform buffer with its bind group, shared shape across all
/// services (`@group(0) @binding(0)` in every shader).
struct CameraBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    layout: wgpu::BindGroupLayout,
}

impl CameraBinding {
    fn new(device: &wgpu::Device, label: &str) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<CameraUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self {
            buffer,
            bind_group,
            layout,
        }
    }

    fn write(&self, queue: &wgpu::Queue, projection: &Matrix4<f32>, model_view: &Matrix4<f32>) {
        let uniform = CameraUniform {
            projection: (*projection).into(),
            model_view: (*model_view).into(),
        };
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&uniform));
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    bind_layouts: &[&wgpu::BindGroupLayout],
    buffers: &[wgpu::VertexBufferLayout],
    topology: wgpu::PrimitiveTopology,
    output_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: bind_layouts,
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: Some("vs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: Some("fs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: output_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Scanned surfaces are open shells seen from both sides.
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

macro_rules! camera_only_service {
    ($name:ident) => {
        impl ShaderService for $name {
            fn prepare_rendering(
                &self,
                queue: &wgpu::Queue,
                projection: &Matrix4<f32>,
                model_view: &Matrix4<f32>,
            ) {
                self.camera.write(queue, projection, model_view);
            }

            fn enable(&self, pass: &mut wgpu::RenderPass<'_>) {
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &self.camera.bind_group, &[]);
            }
        }
    };
}

/// Uniform gray triangles with headlamp shading.
pub struct LightedGrayShader {
    pipeline: wgpu::RenderPipeline,
    camera: CameraBinding,
}

impl LightedGrayShader {
    pub fn new(device: &wgpu::Device, output_format: wgpu::TextureFormat) -> Self {
        let camera = CameraBinding::new(device, "lighted gray camera");
        let pipeline = build_pipeline(
            device,
            "lighted gray pipeline",
            include_str!("lighted_gray.wgsl"),
            &[&camera.layout],
            &[vertex::position_layout(), vertex::normal_layout()],
            wgpu::PrimitiveTopology::TriangleList,
            output_format,
        );
        Self { pipeline, camera }
    }
}

camera_only_service!(LightedGrayShader);

/// Per-vertex colored triangles with headlamp shading.
pub struct PerVertexColorShader {
    pipeline: wgpu::RenderPipeline,
    camera: CameraBinding,
}

impl PerVertexColorShader {
    pub fn new(device: &wgpu::Device, output_format: wgpu::TextureFormat) -> Self {
        let camera = CameraBinding::new(device, "per-vertex color camera");
        let pipeline = build_pipeline(
            device,
            "per-vertex color pipeline",
            include_str!("per_vertex_color.wgsl"),
            &[&camera.layout],
            &[
                vertex::position_layout(),
                vertex::normal_layout(),
                vertex::color_layout(),
            ],
            wgpu::PrimitiveTopology::TriangleList,
            output_format,
        );
        Self { pipeline, camera }
    }
}

camera_only_service!(PerVertexColorShader);

/// Depth-faded wireframe lines.
pub struct XRayShader {
    pipeline: wgpu::RenderPipeline,
    camera: CameraBinding,
}

impl XRayShader {
    pub fn new(device: &wgpu::Device, output_format: wgpu::TextureFormat) -> Self {
        let camera = CameraBinding::new(device, "xray camera");
        let pipeline = build_pipeline(
            device,
            "xray pipeline",
            include_str!("xray.wgsl"),
            &[&camera.layout],
            &[vertex::position_layout(), vertex::normal_layout()],
            wgpu::PrimitiveTopology::LineList,
            output_format,
        );
        Self { pipeline, camera }
    }
}

camera_only_service!(XRayShader);

/// Triangles textured from the bound YCbCr camera frame.
///
/// The frame's plane bind group lives at `@group(1)` and is bound by
/// the renderer, since it changes with every uploaded frame.
pub struct YCbCrTextureShader {
    pipeline: wgpu::RenderPipeline,
    camera: CameraBinding,
}

impl YCbCrTextureShader {
    pub fn new(device: &wgpu::Device, output_format: wgpu::TextureFormat) -> Self {
        let camera = CameraBinding::new(device, "textured camera");
        let frame_layout = frame_bind_group_layout(device);
        let pipeline = build_pipeline(
            device,
            "ycbcr texture pipeline",
            include_str!("ycbcr_texture.wgsl"),
            &[&camera.layout, &frame_layout],
            &[vertex::position_layout(), vertex::uv_layout()],
            wgpu::PrimitiveTopology::TriangleList,
            output_format,
        );
        Self { pipeline, camera }
    }
}

camera_only_service!(YCbCrTextureShader);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_uniform_layout() {
        // Two column-major mat4x4<f32> back to back.
        assert_eq!(std::mem::size_of::<CameraUniform>(), 128);
        assert_eq!(std::mem::align_of::<CameraUniform>(), 4);
    }
}
