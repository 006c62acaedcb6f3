//! GPU texture resource plus the double-buffered staging ring the
//! texture-upload thread drives: `Image`'s CPU-side pixels land in one of
//! two host-visible staging buffers, get copied into the device texture,
//! and the fence advances — while the render thread keeps sampling the
//! previous frame's texture.

use crate::scene::gpu::fence::Fence;

/// Buffer→texture copies require each row to start on this boundary.
const ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// A sampled GPU texture with its default view.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub size: wgpu::Extent3d,
    pub format: wgpu::TextureFormat,
}

impl GpuTexture {
    #[must_use]
    pub fn new(device: &wgpu::Device, width: u32, height: u32, format: wgpu::TextureFormat, label: Option<&str>) -> Self {
        Self::with_usage(device, width, height, format, wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST, label)
    }

    /// A texture a render pass can draw into and a later pass can sample —
    /// the camera/warp/window offscreen targets.
    #[must_use]
    pub fn new_target(device: &wgpu::Device, width: u32, height: u32, format: wgpu::TextureFormat, label: Option<&str>) -> Self {
        Self::with_usage(
            device,
            width,
            height,
            format,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC,
            label,
        )
    }

    fn with_usage(device: &wgpu::Device, width: u32, height: u32, format: wgpu::TextureFormat, usage: wgpu::TextureUsages, label: Option<&str>) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self { texture, view, sampler, size, format }
    }
}

/// Two staging buffers the upload thread alternates between, so it never
/// has to wait on the render thread finishing with the one currently bound
/// for sampling.
pub struct StagingRing {
    buffers: [wgpu::Buffer; 2],
    tight_bytes_per_row: u32,
    padded_bytes_per_row: u32,
    rows: u32,
    next: usize,
}

impl StagingRing {
    /// `bytes_per_row` is the tightly packed row length of the source
    /// pixels; staging buffers are allocated with each row padded to the
    /// copy alignment.
    #[must_use]
    pub fn new(device: &wgpu::Device, bytes_per_row: u32, rows: u32) -> Self {
        let padded = bytes_per_row.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT;
        let size = u64::from(padded) * u64::from(rows);
        let make = || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("splash-texture-staging"),
                size,
                usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        Self {
            buffers: [make(), make()],
            tight_bytes_per_row: bytes_per_row,
            padded_bytes_per_row: padded,
            rows,
            next: 0,
        }
    }

    /// Copies `pixels` (tightly packed) into the next staging buffer,
    /// padding rows to the copy alignment, and issues a buffer→texture
    /// copy, signaling `fence` once the copy is queued. `pixels` must be
    /// exactly `bytes_per_row * rows` long.
    pub fn upload(&mut self, queue: &wgpu::Queue, encoder: &mut wgpu::CommandEncoder, texture: &wgpu::Texture, size: wgpu::Extent3d, pixels: &[u8], fence: &Fence) {
        if pixels.len() as u64 != u64::from(self.tight_bytes_per_row) * u64::from(self.rows) {
            log::warn!("staging ring: payload length does not match the ring's row layout, skipping upload");
            return;
        }
        let index = self.next;
        self.next = (self.next + 1) % self.buffers.len();
        let staging = &self.buffers[index];

        if self.padded_bytes_per_row == self.tight_bytes_per_row {
            queue.write_buffer(staging, 0, pixels);
        } else {
            let mut padded = vec![0u8; self.padded_bytes_per_row as usize * self.rows as usize];
            let tight = self.tight_bytes_per_row as usize;
            for (row, chunk) in pixels.chunks_exact(tight).enumerate() {
                let start = row * self.padded_bytes_per_row as usize;
                padded[start..start + tight].copy_from_slice(chunk);
            }
            queue.write_buffer(staging, 0, &padded);
        }

        encoder.copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer: staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.rows),
                },
            },
            texture.as_image_copy(),
            size,
        );
        fence.signal();
    }
}
