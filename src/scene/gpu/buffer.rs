//! A versioned GPU buffer: mesh vertex/index data and warp-mesh control
//! points all flow through the same upload-on-change pattern. No
//! generational handle table — each graphics object owns its buffers
//! directly.

use wgpu::util::DeviceExt;

/// A `wgpu::Buffer` plus the version stamp of the CPU-side data last
/// uploaded into it, so repeated `upload` calls with unchanged data are a
/// no-op.
pub struct GpuBuffer {
    pub buffer: wgpu::Buffer,
    pub usage: wgpu::BufferUsages,
    capacity: u64,
    last_uploaded_version: u64,
}

impl GpuBuffer {
    #[must_use]
    pub fn new(device: &wgpu::Device, data: &[u8], usage: wgpu::BufferUsages, label: Option<&str>) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor { label, contents: data, usage });
        Self { buffer, usage, capacity: data.len() as u64, last_uploaded_version: 0 }
    }

    /// Uploads `data` if `version` is newer than what's already resident.
    /// Recreates the buffer when `data` no longer fits the current
    /// allocation.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[u8], version: u64, label: Option<&str>) {
        if version <= self.last_uploaded_version {
            return;
        }
        if data.len() as u64 > self.capacity {
            *self = Self::new(device, data, self.usage, label);
            self.last_uploaded_version = version;
            return;
        }
        queue.write_buffer(&self.buffer, 0, data);
        self.last_uploaded_version = version;
    }

    #[must_use]
    pub fn last_uploaded_version(&self) -> u64 {
        self.last_uploaded_version
    }
}
