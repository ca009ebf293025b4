//! Headless GPU context acquisition
//!
//! Provides the device/queue pair the renderer runs on. The scanning
//! host owns the swapchain and window integration; this context only
//! covers adapter selection and device creation, shared out as `Arc`
//! handles so buffer and texture owners can hold the device alongside
//! their resources.

use std::sync::Arc;

use thiserror::Error;

/// Errors raised while acquiring the GPU device.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("no compatible GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to open GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// Owned GPU context: one device and one submission queue.
///
/// All renderer operations must run on the thread that owns this
/// context; the graphics queue is not shared across threads by the
/// rendering core.
pub struct RenderContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl RenderContext {
    /// Acquires a headless device on the best available adapter.
    pub fn new_headless() -> Result<Self, ContextError> {
        pollster::block_on(Self::request())
    }

    async fn request() -> Result<Self, ContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("scanmesh device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self {
            device: device.into(),
            queue: queue.into(),
        })
    }

    /// Wraps an externally created device/queue pair.
    ///
    /// Used by hosts that already own a wgpu device (for example one
    /// driving an on-screen surface).
    pub fn from_parts(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }
}
