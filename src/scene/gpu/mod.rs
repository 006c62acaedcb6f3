//! GPU resource layer: the `wgpu` device/queue a Scene owns, plus the thin
//! wrappers the graphics objects build on.
//!
//! Headless-first: a Scene's `GpuContext` is created once, before any
//! window exists (so the upload thread can start staging textures
//! immediately), and each `Window`/`Gui` object asks it to configure a
//! surface afterward.

pub mod buffer;
pub mod fence;
pub mod frame;
pub mod pipeline;
pub mod texture;

pub use frame::{DrawBatch, RenderFrame, RenderResources, TargetKind};

use std::sync::Arc;

use crate::errors::{Result, SplashError};

/// The device/queue pair a Scene renders and uploads through. Shared (via
/// `Arc`) between the render thread and the texture-upload thread.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Requests an adapter and device with no surface yet attached.
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| SplashError::AdapterRequestFailed(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("splash-scene-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        Ok(Self { instance, adapter, device, queue })
    }

    /// Builds and returns a blocking `GpuContext`, for callers (like the
    /// scene binary's `main`) that have not set up an async runtime.
    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    /// Creates and configures a surface for a window a `Window`/`Gui`
    /// object owns. `window` must outlive the returned surface.
    pub fn configure_surface(
        &self,
        window: Arc<winit::window::Window>,
        vsync: bool,
    ) -> Result<(wgpu::Surface<'static>, wgpu::SurfaceConfiguration)> {
        let size = window.inner_size();
        let surface = self
            .instance
            .create_surface(window)
            .map_err(|e| SplashError::AdapterRequestFailed(e.to_string()))?;
        let mut config = surface
            .get_default_config(&self.adapter, size.width.max(1), size.height.max(1))
            .ok_or_else(|| SplashError::AdapterRequestFailed("surface not supported by adapter".into()))?;
        config.present_mode = if vsync { wgpu::PresentMode::AutoVsync } else { wgpu::PresentMode::AutoNoVsync };
        surface.configure(&self.device, &config);
        Ok((surface, config))
    }

    #[must_use]
    pub fn resize_surface(&self, surface: &wgpu::Surface<'static>, config: &mut wgpu::SurfaceConfiguration, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        config.width = width;
        config.height = height;
        surface.configure(&self.device, config);
        true
    }
}
