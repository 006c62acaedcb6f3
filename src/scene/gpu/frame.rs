//! Per-frame GPU state shared by the render and upload threads: the lazily
//! created pipelines, the offscreen targets each camera/warp/window draws
//! into, the image textures the upload thread keeps current, and the
//! vertex/uniform buffers re-filled every frame.
//!
//! Graphics objects never reach back into the registry while drawing — the
//! scheduler gathers everything a `render` implementation needs (mesh
//! snapshots, blend weights, texture names, upstream target names) into a
//! [`RenderFrame`] before the band runs.

use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;

use crate::scene::gpu::GpuContext;
use crate::scene::gpu::buffer::GpuBuffer;
use crate::scene::gpu::fence::Fence;
use crate::scene::gpu::pipeline::{BlitPipeline, DrawPipeline, TARGET_FORMAT};
use crate::scene::gpu::texture::{GpuTexture, StagingRing};

/// Offscreen render-target height for camera outputs; width follows the
/// camera's aspect ratio.
pub const CAMERA_TARGET_HEIGHT: u32 = 1080;

/// One renderable unit a camera draws: a mesh snapshot plus the state the
/// blending shader needs.
#[derive(Debug, Clone, Default)]
pub struct DrawBatch {
    pub positions: Vec<Vec3>,
    pub uvs: Vec<[f32; 2]>,
    pub weights: Vec<f32>,
    pub textures: Vec<String>,
    pub vertex_blending: bool,
}

/// Which target map a draw pass writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Camera,
    Warp,
}

/// Everything a `GraphObject::render` implementation may touch during one
/// frame. Borrowed mutably down the band loop; dropped before submit.
pub struct RenderFrame<'a> {
    pub gpu: &'a GpuContext,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub resources: &'a mut RenderResources,
    /// Per-camera draw batches, gathered from the registry before the band.
    pub batches: &'a FxHashMap<String, Vec<DrawBatch>>,
    /// Upstream source names per warp/window, gathered from the link graph.
    pub inputs: &'a FxHashMap<String, Vec<String>>,
    /// Monotonic frame counter, used as the version stamp for per-frame
    /// buffer uploads.
    pub frame_index: u64,
}

/// The Scene-wide GPU resource cache. One per Scene, behind its own lock;
/// the render thread and the upload thread take it after the Scene's root
/// lock, never before.
#[derive(Default)]
pub struct RenderResources {
    images: FxHashMap<String, GpuTexture>,
    image_versions: FxHashMap<String, u64>,
    staging: FxHashMap<String, StagingRing>,
    camera_targets: FxHashMap<String, GpuTexture>,
    warp_targets: FxHashMap<String, GpuTexture>,
    window_targets: FxHashMap<String, GpuTexture>,
    mesh_buffers: FxHashMap<String, GpuBuffer>,
    uniforms: FxHashMap<String, GpuBuffer>,
    draw_pipeline: Option<DrawPipeline>,
    blit_pipelines: FxHashMap<wgpu::TextureFormat, BlitPipeline>,
    fallback: Option<GpuTexture>,
}

impl RenderResources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The version of `name`'s pixels last committed to its GPU texture.
    #[must_use]
    pub fn image_version(&self, name: &str) -> u64 {
        self.image_versions.get(name).copied().unwrap_or(0)
    }

    /// The offscreen texture `name` last rendered into, if any. Warps
    /// shadow cameras (a warped output replaces the raw camera output for
    /// anything downstream), and plain image textures come last.
    #[must_use]
    pub fn source_texture(&self, name: &str) -> Option<&GpuTexture> {
        self.warp_targets
            .get(name)
            .or_else(|| self.camera_targets.get(name))
            .or_else(|| self.images.get(name))
    }

    /// Pixel dimensions of `name`'s texture, if one exists.
    #[must_use]
    pub fn source_size(&self, name: &str) -> Option<(u32, u32)> {
        self.source_texture(name).map(|t| (t.size.width, t.size.height))
    }

    /// Pushes one image's pixels through its staging ring into its GPU
    /// texture, (re)allocating texture and ring when the size changes.
    pub fn upload_image(&mut self, gpu: &GpuContext, encoder: &mut wgpu::CommandEncoder, name: &str, width: u32, height: u32, version: u64, pixels: &[u8], fence: &Fence) {
        if pixels.len() as u64 != u64::from(width) * u64::from(height) * 4 {
            log::warn!("upload: {name} pixel payload does not match {width}x{height} RGBA, skipping");
            return;
        }
        let stale = self.images.get(name).is_some_and(|t| t.size.width != width || t.size.height != height);
        if stale {
            self.images.remove(name);
            self.staging.remove(name);
        }
        self.images
            .entry(name.to_owned())
            .or_insert_with(|| GpuTexture::new(&gpu.device, width, height, TARGET_FORMAT, Some(name)));
        let ring = self
            .staging
            .entry(name.to_owned())
            .or_insert_with(|| StagingRing::new(&gpu.device, width * 4, height));
        if let Some(texture) = self.images.get(name) {
            ring.upload(&gpu.queue, encoder, &texture.texture, texture.size, pixels, fence);
        }
        self.image_versions.insert(name.to_owned(), version);
    }

    /// Runs one camera or warp draw pass: clears the named target and draws
    /// every batch through the blending shader.
    pub fn draw_pass(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        kind: TargetKind,
        name: &str,
        width: u32,
        height: u32,
        clear: wgpu::Color,
        view_proj: Mat4,
        brightness: f32,
        batches: &[DrawBatch],
        frame_index: u64,
    ) {
        if self.draw_pipeline.is_none() {
            self.draw_pipeline = Some(DrawPipeline::new(&gpu.device));
        }
        self.ensure_fallback(gpu);
        {
            let targets = match kind {
                TargetKind::Camera => &mut self.camera_targets,
                TargetKind::Warp => &mut self.warp_targets,
            };
            ensure_target(targets, &gpu.device, name, width, height);
        }

        // Upload per-batch vertex and uniform data before any borrows for
        // the pass itself.
        let mut draws: Vec<(String, String, u32, Option<String>)> = Vec::new();
        for (i, batch) in batches.iter().enumerate() {
            let vertex_count = (batch.positions.len() - batch.positions.len() % 3) as u32;
            if vertex_count == 0 {
                continue;
            }
            let vertex_key = format!("{name}:{i}:mesh");
            let uniform_key = format!("{name}:{i}:uniforms");
            upload_keyed(&mut self.mesh_buffers, gpu, &vertex_key, &pack_vertices(batch), wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST, frame_index);
            upload_keyed(
                &mut self.uniforms,
                gpu,
                &uniform_key,
                &pack_draw_uniforms(view_proj, brightness, batch.vertex_blending),
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                frame_index,
            );
            draws.push((vertex_key, uniform_key, vertex_count, batch.textures.first().cloned()));
        }

        let Some(pipeline) = self.draw_pipeline.as_ref() else { return };
        let Some(fallback) = self.fallback.as_ref() else { return };
        let targets = match kind {
            TargetKind::Camera => &self.camera_targets,
            TargetKind::Warp => &self.warp_targets,
        };
        let Some(target) = targets.get(name) else { return };
        let target_view = target.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut bind_groups = Vec::with_capacity(draws.len());
        let mut draw_calls = Vec::with_capacity(draws.len());
        for (vertex_key, uniform_key, vertex_count, texture) in &draws {
            let Some(vertex_buffer) = self.mesh_buffers.get(vertex_key) else { continue };
            let Some(uniform_buffer) = self.uniforms.get(uniform_key) else { continue };
            let sampled = texture.as_deref().and_then(|t| self.source_texture(t)).unwrap_or(fallback);
            bind_groups.push(gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(name),
                layout: &pipeline.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&sampled.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&sampled.sampler),
                    },
                ],
            }));
            draw_calls.push((vertex_buffer, *vertex_count));
        }

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(name),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        rpass.set_pipeline(&pipeline.pipeline);
        for (i, (vertex_buffer, vertex_count)) in draw_calls.iter().enumerate() {
            rpass.set_bind_group(0, &bind_groups[i], &[]);
            rpass.set_vertex_buffer(0, vertex_buffer.buffer.slice(..));
            rpass.draw(0..*vertex_count, 0..1);
        }
    }

    /// Blits a window's first input into its offscreen swap target,
    /// honoring the swap-test color override.
    pub fn composite_window(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        window: &str,
        width: u32,
        height: u32,
        source: Option<&str>,
        override_color: Option<(f64, f64, f64)>,
        frame_index: u64,
    ) {
        self.ensure_blit_pipeline(gpu, TARGET_FORMAT);
        self.ensure_fallback(gpu);
        ensure_target(&mut self.window_targets, &gpu.device, window, width, height);
        let uniform_key = format!("{window}:blit");
        upload_keyed(&mut self.uniforms, gpu, &uniform_key, &pack_blit_uniforms(override_color), wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST, frame_index);

        let Some(pipeline) = self.blit_pipelines.get(&TARGET_FORMAT) else { return };
        let Some(target) = self.window_targets.get(window) else { return };
        let Some(uniform_buffer) = self.uniforms.get(&uniform_key) else { return };
        let Some(src) = source.and_then(|s| self.source_texture(s)).or(self.fallback.as_ref()) else { return };

        let target_view = target.texture.create_view(&wgpu::TextureViewDescriptor::default());
        run_blit(gpu, encoder, pipeline, src, uniform_buffer, &target_view, window);
    }

    /// Blits a window's swap target into an externally provided view — the
    /// surface frame a `Window` is about to present.
    pub fn present_window(&mut self, gpu: &GpuContext, encoder: &mut wgpu::CommandEncoder, window: &str, dest_view: &wgpu::TextureView, dest_format: wgpu::TextureFormat, frame_index: u64) {
        self.ensure_blit_pipeline(gpu, dest_format);
        self.ensure_fallback(gpu);
        let uniform_key = format!("{window}:present");
        upload_keyed(&mut self.uniforms, gpu, &uniform_key, &pack_blit_uniforms(None), wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST, frame_index);

        let Some(pipeline) = self.blit_pipelines.get(&dest_format) else { return };
        let Some(uniform_buffer) = self.uniforms.get(&uniform_key) else { return };
        let Some(src) = self.window_targets.get(window).or(self.fallback.as_ref()) else { return };
        run_blit(gpu, encoder, pipeline, src, uniform_buffer, dest_view, window);
    }

    fn ensure_blit_pipeline(&mut self, gpu: &GpuContext, format: wgpu::TextureFormat) {
        self.blit_pipelines.entry(format).or_insert_with(|| BlitPipeline::new(&gpu.device, format));
    }

    fn ensure_fallback(&mut self, gpu: &GpuContext) {
        if self.fallback.is_some() {
            return;
        }
        let texture = GpuTexture::new(&gpu.device, 1, 1, TARGET_FORMAT, Some("splash-fallback"));
        gpu.queue.write_texture(
            texture.texture.as_image_copy(),
            &[255, 255, 255, 255],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            texture.size,
        );
        self.fallback = Some(texture);
    }
}

fn run_blit(gpu: &GpuContext, encoder: &mut wgpu::CommandEncoder, pipeline: &BlitPipeline, src: &GpuTexture, uniform_buffer: &GpuBuffer, dest_view: &wgpu::TextureView, label: &str) {
    let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &pipeline.bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&src.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&src.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: uniform_buffer.buffer.as_entire_binding(),
            },
        ],
    });
    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: dest_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
    rpass.set_pipeline(&pipeline.pipeline);
    rpass.set_bind_group(0, &bind_group, &[]);
    rpass.draw(0..3, 0..1);
}

fn ensure_target(map: &mut FxHashMap<String, GpuTexture>, device: &wgpu::Device, name: &str, width: u32, height: u32) {
    let stale = map.get(name).is_some_and(|t| t.size.width != width || t.size.height != height);
    if stale {
        map.remove(name);
    }
    map.entry(name.to_owned()).or_insert_with(|| GpuTexture::new_target(device, width, height, TARGET_FORMAT, Some(name)));
}

fn upload_keyed(map: &mut FxHashMap<String, GpuBuffer>, gpu: &GpuContext, key: &str, data: &[u8], usage: wgpu::BufferUsages, version: u64) {
    if let Some(buffer) = map.get_mut(key) {
        buffer.upload(&gpu.device, &gpu.queue, data, version, Some(key));
    } else {
        map.insert(key.to_owned(), GpuBuffer::new(&gpu.device, data, usage, Some(key)));
    }
}

/// Interleaves a batch into the draw pipeline's vertex layout: position,
/// uv, blend weight — six floats per vertex. Missing uvs fall back to the
/// origin, missing weights to a full single-camera contribution.
#[must_use]
pub fn pack_vertices(batch: &DrawBatch) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(batch.positions.len() * 24);
    for (i, p) in batch.positions.iter().enumerate() {
        let uv = batch.uvs.get(i).copied().unwrap_or([0.0, 0.0]);
        let weight = batch.weights.get(i).copied().unwrap_or(1.0);
        for value in [p.x, p.y, p.z, uv[0], uv[1], weight] {
            bytes.extend_from_slice(&value.to_ne_bytes());
        }
    }
    bytes
}

fn pack_draw_uniforms(view_proj: Mat4, brightness: f32, vertex_blending: bool) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(80);
    for value in view_proj.to_cols_array() {
        bytes.extend_from_slice(&value.to_ne_bytes());
    }
    for value in [brightness, if vertex_blending { 1.0 } else { 0.0 }, 0.0, 0.0] {
        bytes.extend_from_slice(&value.to_ne_bytes());
    }
    bytes
}

fn pack_blit_uniforms(override_color: Option<(f64, f64, f64)>) -> Vec<u8> {
    let (color, enabled) = match override_color {
        Some((r, g, b)) => ([r as f32, g as f32, b as f32], 1.0),
        None => ([0.0, 0.0, 0.0], 0.0),
    };
    let mut bytes = Vec::with_capacity(16);
    for value in [color[0], color[1], color[2], enabled] {
        bytes.extend_from_slice(&value.to_ne_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_vertices_interleaves_six_floats_per_vertex() {
        let batch = DrawBatch {
            positions: vec![Vec3::new(1.0, 2.0, 3.0)],
            uvs: vec![[0.25, 0.75]],
            weights: vec![2.0],
            textures: Vec::new(),
            vertex_blending: true,
        };
        let bytes = pack_vertices(&batch);
        assert_eq!(bytes.len(), 24);
        let weight = f32::from_ne_bytes(bytes[20..24].try_into().unwrap());
        assert!((weight - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_uvs_and_weights_get_defaults() {
        let batch = DrawBatch {
            positions: vec![Vec3::ZERO, Vec3::ONE],
            ..Default::default()
        };
        let bytes = pack_vertices(&batch);
        assert_eq!(bytes.len(), 48);
        let weight = f32::from_ne_bytes(bytes[20..24].try_into().unwrap());
        assert!((weight - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn draw_uniforms_are_a_mat4_plus_params_vector() {
        let bytes = pack_draw_uniforms(Mat4::IDENTITY, 0.5, true);
        assert_eq!(bytes.len(), 80);
        let brightness = f32::from_ne_bytes(bytes[64..68].try_into().unwrap());
        let blending = f32::from_ne_bytes(bytes[68..72].try_into().unwrap());
        assert!((brightness - 0.5).abs() < f32::EPSILON);
        assert!((blending - 1.0).abs() < f32::EPSILON);
    }
}
