//! YCbCr video texture upload and depth target creation
//!
//! Converts one borrowed planar 4:2:0 frame into two bound GPU textures:
//! luma at full resolution (`R8Unorm`) and interleaved CbCr at half
//! resolution in both axes (`Rg8Unorm`). Texture allocations are pooled
//! in a [`TextureCache`] that is created lazily on first upload, flushed
//! before each reuse, and preserved across uploads so steady-state
//! frames only write pixel data.

use thiserror::Error;

use crate::mesh::{PixelFormat, YCbCrFrame};

/// Depth buffer format used by every rendering mode.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Recoverable texture upload failures.
///
/// These are logged by the renderer and absorbed: a failed upload leaves
/// no frame textures bound, and subsequent textured-mode renders skip.
#[derive(Debug, Error)]
pub enum TextureError {
    #[error("frame dimensions {width}x{height} are not valid for 4:2:0 planes")]
    BadDimensions { width: u32, height: u32 },
    #[error("{plane} stride {stride} is shorter than the row width {row_bytes}")]
    StrideTooSmall {
        plane: &'static str,
        stride: u32,
        row_bytes: u32,
    },
    #[error("{plane} plane holds {actual} bytes, expected at least {expected}")]
    PlaneTooSmall {
        plane: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Panics unless the frame format is the one the upload path supports.
///
/// Wrong pixel formats are an integration error upstream, checked before
/// any cache mutation.
pub(crate) fn ensure_supported_format(format: PixelFormat) {
    assert!(
        format == PixelFormat::YCbCr420BiPlanarFullRange,
        "unsupported pixel format {format:?}, expected 4:2:0 bi-planar full range"
    );
}

/// Minimum byte length of a plane with `rows` rows of `row_bytes` pixels
/// at the given stride (the final row need not be padded).
pub(crate) fn required_plane_bytes(stride: u32, rows: u32, row_bytes: u32) -> usize {
    if rows == 0 {
        return 0;
    }
    stride as usize * (rows as usize - 1) + row_bytes as usize
}

/// Checks frame dimensions, strides and plane lengths before any
/// texture is touched.
pub(crate) fn validate_frame_geometry(frame: &YCbCrFrame) -> Result<(), TextureError> {
    let (width, height) = (frame.width, frame.height);
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(TextureError::BadDimensions { width, height });
    }
    // Chroma rows carry width/2 CbCr pairs at two bytes each.
    let planes = [
        ("luma", frame.luma_stride, height, width, frame.luma.len()),
        ("chroma", frame.chroma_stride, height / 2, width, frame.chroma.len()),
    ];
    for (plane, stride, rows, row_bytes, actual) in planes {
        if stride < row_bytes {
            return Err(TextureError::StrideTooSmall {
                plane,
                stride,
                row_bytes,
            });
        }
        let expected = required_plane_bytes(stride, rows, row_bytes);
        if actual < expected {
            return Err(TextureError::PlaneTooSmall {
                plane,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

/// Bind group layout shared by the texture cache and the textured
/// pipeline: luma texture, chroma texture, one clamping sampler.
pub(crate) fn frame_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("frame planes layout"),
        entries: &[
            texture_entry(0),
            texture_entry(1),
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

struct PlanePair {
    luma: wgpu::Texture,
    luma_view: wgpu::TextureView,
    chroma: wgpu::Texture,
    chroma_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// Pools the plane texture allocations and their shared sampler across
/// frames, so consecutive uploads of same-sized frames reuse GPU memory.
pub struct TextureCache {
    sampler: wgpu::Sampler,
    layout: wgpu::BindGroupLayout,
    pool: Option<PlanePair>,
}

impl TextureCache {
    fn new(device: &wgpu::Device) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("frame plane sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            sampler,
            layout: frame_bind_group_layout(device),
            pool: None,
        }
    }

    /// Cache maintenance before each reuse: drops pooled allocations
    /// that no longer match the incoming frame size.
    fn flush(&mut self, width: u32, height: u32) {
        if let Some(pool) = &self.pool {
            if pool.width != width || pool.height != height {
                pool.luma.destroy();
                pool.chroma.destroy();
                self.pool = None;
            }
        }
    }

    /// Writes both planes of one validated frame into the pooled
    /// textures (creating them on first use) and returns the frame's
    /// bind group.
    fn upload_frame(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        frame: &YCbCrFrame,
    ) -> wgpu::BindGroup {
        let (width, height) = (frame.width, frame.height);
        let pair = self.pool.get_or_insert_with(|| {
            let plane = |label, w, h, format| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width: w,
                        height: h,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                })
            };
            let luma = plane("frame luma", width, height, wgpu::TextureFormat::R8Unorm);
            let chroma = plane(
                "frame chroma",
                width / 2,
                height / 2,
                wgpu::TextureFormat::Rg8Unorm,
            );
            let luma_view = luma.create_view(&wgpu::TextureViewDescriptor::default());
            let chroma_view = chroma.create_view(&wgpu::TextureViewDescriptor::default());
            PlanePair {
                luma,
                luma_view,
                chroma,
                chroma_view,
                width,
                height,
            }
        });

        let write_plane = |texture: &wgpu::Texture, data: &[u8], stride: u32, w: u32, h: u32| {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(stride),
                    rows_per_image: None,
                },
                wgpu::Extent3d {
                    width: w,
                    height: h,
                    depth_or_array_layers: 1,
                },
            );
        };
        write_plane(&pair.luma, frame.luma, frame.luma_stride, width, height);
        write_plane(
            &pair.chroma,
            frame.chroma,
            frame.chroma_stride,
            width / 2,
            height / 2,
        );

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame planes"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&pair.luma_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&pair.chroma_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }
}

/// The currently bound frame: both plane textures behind one bind
/// group. Storing them together keeps the "both planes or neither"
/// invariant in the type.
pub struct FrameTextures {
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

impl FrameTextures {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Uploads planar YCbCr frames into pooled GPU textures.
#[derive(Default)]
pub struct VideoTextureUploader {
    cache: Option<TextureCache>,
    frame: Option<FrameTextures>,
}

impl VideoTextureUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads one frame, replacing whatever was bound before.
    ///
    /// The previously bound plane textures are always released first, so
    /// a failed upload leaves no frame bound (and textured-mode renders
    /// skip). The cache itself is preserved and flushed, not recreated.
    ///
    /// # Panics
    /// Panics if `frame.format` is not 4:2:0 bi-planar full range.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        frame: &YCbCrFrame,
    ) -> Result<(), TextureError> {
        ensure_supported_format(frame.format);

        self.frame = None;
        let cache = self.cache.get_or_insert_with(|| TextureCache::new(device));
        cache.flush(frame.width, frame.height);

        validate_frame_geometry(frame)?;

        let bind_group = cache.upload_frame(device, queue, frame);
        self.frame = Some(FrameTextures {
            bind_group,
            width: frame.width,
            height: frame.height,
        });
        Ok(())
    }

    /// True when a complete luma/chroma pair is bound.
    pub fn has_frame(&self) -> bool {
        self.frame.is_some()
    }

    pub(crate) fn frame_bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.frame.as_ref().map(|f| &f.bind_group)
    }

    pub fn frame(&self) -> Option<&FrameTextures> {
        self.frame.as_ref()
    }

    /// Releases the bound textures and the cache.
    pub fn release(&mut self) {
        self.frame = None;
        self.cache = None;
    }
}

/// Depth target sized to the current output, recreated on resize.
pub struct DepthTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl DepthTexture {
    pub fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("mesh depth texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }
}
