//! An on-screen output window: owns the swap interval, the input
//! texture layout, and the last-update/last-swap timestamps presentation
//! delay is measured from. The actual `winit::window::Window` + `wgpu`
//! surface are attached separately (`attach_surface`) once the embedding
//! creates them on the thread running the window system's event loop — a
//! `GraphObject`'s `set_attribute` must stay callable with no windowing
//! system alive (e.g. under test), and a window without a surface keeps
//! compositing into its offscreen swap target.

use std::sync::Arc;
use std::sync::OnceLock;

use crate::attribute::{self, ArgKind, AttributeDescriptor, SyncPolicy};
use crate::errors::Result;
use crate::graph_object::{Category, GraphObject, GraphObjectBase, RenderPriority};
use crate::scene::gpu::{GpuContext, RenderFrame, RenderResources};
use crate::value::{self, Value, Values};

fn descriptors() -> &'static [AttributeDescriptor] {
    static TABLE: OnceLock<Vec<AttributeDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            attribute::descriptor("position", vec![ArgKind::Integer, ArgKind::Integer], "window top-left position", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("size", vec![ArgKind::Integer, ArgKind::Integer], "window size in pixels", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("swapInterval", vec![ArgKind::Integer], "-1 adaptive, 0 off, >0 vsync-every-N", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("layout", vec![ArgKind::Integer, ArgKind::Integer, ArgKind::Integer, ArgKind::Integer], "input texture slot indices", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("swapTestColor", vec![ArgKind::Real, ArgKind::Real, ArgKind::Real], "override color shown instead of sampled textures, for alignment tests", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("presentationDelay", vec![], "last-swap-time minus last-update-time, seconds", SyncPolicy::Auto, false, false, true),
        ]
    })
}

pub struct Window {
    base: GraphObjectBase,
    position: (i64, i64),
    size: (i64, i64),
    swap_interval: i64,
    layout: [i64; 4],
    swap_test_color: Option<(f64, f64, f64)>,
    last_update_nanos: u64,
    last_swap_nanos: u64,
    is_first_window: bool,
    surface: Option<(wgpu::Surface<'static>, wgpu::SurfaceConfiguration)>,
}

impl Window {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut base = GraphObjectBase::new(name, "window", Category::Window);
        base.set_render_priority(RenderPriority::Window);
        Self {
            base,
            position: (0, 0),
            size: (1920, 1080),
            swap_interval: 1,
            layout: [0, 1, 2, 3],
            swap_test_color: None,
            last_update_nanos: 0,
            last_swap_nanos: 0,
            is_first_window: false,
            surface: None,
        }
    }

    /// Attaches the on-screen surface for `window`, configured against
    /// this window's swap interval (0 disables vsync; anything else
    /// presents synchronized). Must be called from the thread running the
    /// window system's event loop.
    pub fn attach_surface(&mut self, gpu: &GpuContext, window: Arc<winit::window::Window>) -> Result<()> {
        let vsync = self.swap_interval != 0;
        let (surface, config) = gpu.configure_surface(window, vsync)?;
        self.surface = Some((surface, config));
        Ok(())
    }

    #[must_use]
    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    #[must_use]
    pub fn size(&self) -> (i64, i64) {
        self.size
    }

    #[must_use]
    pub fn swap_interval(&self) -> i64 {
        self.swap_interval
    }

    pub fn set_is_first_window(&mut self, first: bool) {
        self.is_first_window = first;
    }

    #[must_use]
    pub fn is_first_window(&self) -> bool {
        self.is_first_window
    }

    /// Records that a per-frame update just ran, for the presentation-delay
    /// measurement.
    pub fn mark_updated_now(&mut self) {
        self.last_update_nanos = crate::util::time::now_nanos();
    }

    /// Records that a swap just completed.
    pub fn mark_swapped_now(&mut self) {
        self.last_swap_nanos = crate::util::time::now_nanos();
    }

    #[must_use]
    pub fn presentation_delay_seconds(&self) -> f64 {
        if self.last_swap_nanos < self.last_update_nanos {
            return 0.0;
        }
        (self.last_swap_nanos - self.last_update_nanos) as f64 / 1_000_000_000.0
    }
}

impl GraphObject for Window {
    fn base(&self) -> &GraphObjectBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut GraphObjectBase {
        &mut self.base
    }
    fn attribute_descriptors(&self) -> &[AttributeDescriptor] {
        descriptors()
    }
    fn set_attribute(&mut self, name: &str, values: &Values) -> bool {
        match name {
            "position" => {
                self.position = (values[0].as_integer(), values[1].as_integer());
                true
            }
            "size" => {
                self.size = (values[0].as_integer(), values[1].as_integer());
                true
            }
            "swapInterval" => {
                self.swap_interval = values[0].as_integer();
                true
            }
            "layout" => {
                for (slot, value) in self.layout.iter_mut().zip(values.iter()) {
                    *slot = value.as_integer();
                }
                true
            }
            "swapTestColor" => {
                self.swap_test_color = Some((values[0].as_real(), values[1].as_real(), values[2].as_real()));
                true
            }
            _ => false,
        }
    }
    fn get_attribute(&self, name: &str) -> Option<Values> {
        match name {
            "position" => Some(vec![Value::Integer(self.position.0), Value::Integer(self.position.1)]),
            "size" => Some(vec![Value::Integer(self.size.0), Value::Integer(self.size.1)]),
            "presentationDelay" => Some(value::single(self.presentation_delay_seconds())),
            _ => None,
        }
    }
    fn renders(&self) -> bool {
        true
    }
    fn update(&mut self) {
        self.mark_updated_now();
    }
    /// Samples the first upstream warp/camera output and blits it into
    /// this window's swap target, honoring the swap-test color override.
    fn render(&mut self, frame: &mut RenderFrame<'_>) {
        let name = self.base.name().to_owned();
        let width = self.size.0.max(1) as u32;
        let height = self.size.1.max(1) as u32;
        let source = frame.inputs.get(&name).and_then(|list| list.first()).cloned();
        frame.resources.composite_window(frame.gpu, frame.encoder, &name, width, height, source.as_deref(), self.swap_test_color, frame.frame_index);
    }
    /// Presents the swap target to the attached surface, if any; headless
    /// windows only record their swap time.
    fn present(&mut self, gpu: &GpuContext, resources: &mut RenderResources, frame_index: u64) {
        let name = self.base.name().to_owned();
        if let Some((surface, config)) = &self.surface {
            match surface.get_current_texture() {
                wgpu::CurrentSurfaceTexture::Success(surface_frame) | wgpu::CurrentSurfaceTexture::Suboptimal(surface_frame) => {
                    let view = surface_frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
                    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("splash-present") });
                    resources.present_window(gpu, &mut encoder, &name, &view, config.format, frame_index);
                    gpu.queue.submit([encoder.finish()]);
                    surface_frame.present();
                }
                status => log::warn!("{name}: could not acquire a surface frame: {status:?}"),
            }
        }
        self.mark_swapped_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presentation_delay_is_zero_before_any_swap() {
        let window = Window::new("w1");
        assert!((window.presentation_delay_seconds() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn presentation_delay_measures_update_to_swap_gap() {
        let mut window = Window::new("w1");
        window.mark_updated_now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        window.mark_swapped_now();
        assert!(window.presentation_delay_seconds() > 0.0);
    }

    #[test]
    fn layout_attribute_sets_all_four_slots() {
        let mut window = Window::new("w1");
        attribute::apply_set(&mut window, "layout", &vec![Value::Integer(3), Value::Integer(2), Value::Integer(1), Value::Integer(0)]);
        assert_eq!(window.layout, [3, 2, 1, 0]);
    }
}
