//! Virtual camera: intrinsics + pose, and the per-camera blending passes
//! the Blender drives. The feedback-shader tessellation pass is GPU work
//! outside this crate's testable surface; the CPU-visible contract, the
//! per-vertex visibility and blend-weight counters a `Geometry` exposes,
//! is what's implemented and tested here.

use std::sync::OnceLock;

use glam::{Mat4, Vec3};

use crate::attribute::{self, ArgKind, AttributeDescriptor, SyncPolicy};
use crate::graph_object::{Category, GraphObject, GraphObjectBase, RenderPriority};
use crate::value::{self, Value, Values};

fn descriptors() -> &'static [AttributeDescriptor] {
    static TABLE: OnceLock<Vec<AttributeDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            attribute::descriptor("eye", vec![ArgKind::Real, ArgKind::Real, ArgKind::Real], "camera eye position", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("target", vec![ArgKind::Real, ArgKind::Real, ArgKind::Real], "camera look-at target", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("up", vec![ArgKind::Real, ArgKind::Real, ArgKind::Real], "camera up vector", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("fov", vec![ArgKind::Real], "vertical field of view, degrees", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("aspect", vec![ArgKind::Real], "aspect ratio", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("near", vec![ArgKind::Real], "near clip distance", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("far", vec![ArgKind::Real], "far clip distance", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("clearColor", vec![ArgKind::Real, ArgKind::Real, ArgKind::Real, ArgKind::Real], "background clear color", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("brightness", vec![ArgKind::Real], "output brightness multiplier", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("colorTemperature", vec![ArgKind::Real], "white point color temperature, kelvin", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("activateColorLUT", vec![ArgKind::Bool], "enable the per-channel calibration LUT", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("colorLUTSize", vec![ArgKind::Integer], "number of samples per calibration LUT channel", SyncPolicy::Auto, true, false, false),
            attribute::descriptor_variadic("colorLUT", "flattened R,G,B calibration LUT samples", SyncPolicy::ForceSync, true, true, true),
            attribute::descriptor("colorMixMatrix", vec![ArgKind::Real; 9], "3x3 row-major color mixing matrix", SyncPolicy::ForceSync, true, true, false),
            attribute::descriptor_variadic("colorSamples", "raw response-curve samples, for introspection", SyncPolicy::Auto, false, true, true),
            attribute::descriptor("whitePoint", vec![ArgKind::Real, ArgKind::Real, ArgKind::Real], "calibrated RGB white point", SyncPolicy::ForceSync, true, true, false),
            attribute::descriptor_variadic("colorCurves", "per-channel sampled response curves", SyncPolicy::Auto, false, true, true),
        ]
    })
}

/// Per-vertex blending state a `Camera`'s three passes mutate, keyed by
/// vertex index into the target `Geometry`'s alternative buffer.
#[derive(Debug, Default, Clone)]
pub struct VisibilityPass {
    pub visible: Vec<bool>,
    pub weight: Vec<f32>,
}

pub struct Camera {
    base: GraphObjectBase,
    eye: Vec3,
    target: Vec3,
    up: Vec3,
    fov_degrees: f32,
    aspect: f32,
    near: f32,
    far: f32,
    clear_color: [f32; 4],
    brightness: f32,
    color_temperature: f32,
    activate_color_lut: bool,
    color_lut_size: i64,
    color_lut: Values,
    color_mix_matrix: Values,
    color_samples: Values,
    white_point: [f32; 3],
    color_curves: Values,
    view: Mat4,
    projection: Mat4,
}

impl Camera {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut base = GraphObjectBase::new(name, "camera", Category::Camera);
        base.set_render_priority(RenderPriority::Camera);
        let mut camera = Self {
            base,
            eye: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_degrees: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            brightness: 1.0,
            color_temperature: 6500.0,
            activate_color_lut: false,
            color_lut_size: 0,
            color_lut: Values::new(),
            color_mix_matrix: Values::new(),
            color_samples: Values::new(),
            white_point: [1.0, 1.0, 1.0],
            color_curves: Values::new(),
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        };
        camera.recompute_matrices();
        camera
    }

    fn recompute_matrices(&mut self) {
        self.view = Mat4::look_at_rh(self.eye, self.target, self.up);
        self.projection = Mat4::perspective_rh(self.fov_degrees.to_radians(), self.aspect.max(0.01), self.near.max(1e-4), self.far.max(self.near + 1e-3));
    }

    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// CPU-side stand-in for the feedback-shader rasterization pass:
    /// projects each vertex and marks it visible iff it lands inside the
    /// camera's clip volume. `perspective_rh` maps depth to `[0, 1]`, and
    /// points behind the eye come out with a non-positive `w`.
    #[must_use]
    pub fn compute_vertex_visibility(&self, positions: &[Vec3]) -> VisibilityPass {
        let view_proj = self.view_projection();
        let visible = positions
            .iter()
            .map(|p| {
                let clip = view_proj * p.extend(1.0);
                if clip.w <= f32::EPSILON {
                    return false;
                }
                let ndc = clip.truncate() / clip.w;
                ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0 && (0.0..=1.0).contains(&ndc.z)
            })
            .collect::<Vec<_>>();
        VisibilityPass { weight: vec![0.0; visible.len()], visible }
    }

    /// Adds this camera's contribution into `pass.weight` for every visible
    /// vertex, the CPU-visible half of `computeBlendingContribution`.
    pub fn compute_blending_contribution(&self, pass: &mut VisibilityPass) {
        for (visible, weight) in pass.visible.iter().zip(pass.weight.iter_mut()) {
            if *visible {
                *weight += 1.0;
            }
        }
    }
}

impl GraphObject for Camera {
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
            "eye" => {
                self.eye = Vec3::new(values[0].as_real() as f32, values[1].as_real() as f32, values[2].as_real() as f32);
                self.recompute_matrices();
                true
            }
            "target" => {
                self.target = Vec3::new(values[0].as_real() as f32, values[1].as_real() as f32, values[2].as_real() as f32);
                self.recompute_matrices();
                true
            }
            "up" => {
                self.up = Vec3::new(values[0].as_real() as f32, values[1].as_real() as f32, values[2].as_real() as f32);
                self.recompute_matrices();
                true
            }
            "fov" => {
                self.fov_degrees = values[0].as_real() as f32;
                self.recompute_matrices();
                true
            }
            "aspect" => {
                self.aspect = values[0].as_real() as f32;
                self.recompute_matrices();
                true
            }
            "near" => {
                self.near = values[0].as_real() as f32;
                self.recompute_matrices();
                true
            }
            "far" => {
                self.far = values[0].as_real() as f32;
                self.recompute_matrices();
                true
            }
            "clearColor" => {
                self.clear_color = [values[0].as_real() as f32, values[1].as_real() as f32, values[2].as_real() as f32, values[3].as_real() as f32];
                true
            }
            "brightness" => {
                self.brightness = values[0].as_real() as f32;
                true
            }
            "colorTemperature" => {
                self.color_temperature = values[0].as_real() as f32;
                true
            }
            "activateColorLUT" => {
                self.activate_color_lut = values[0].as_bool();
                true
            }
            "colorLUTSize" => {
                self.color_lut_size = values[0].as_integer();
                true
            }
            "colorLUT" => {
                self.color_lut = values.clone();
                true
            }
            "colorMixMatrix" => {
                if values.len() != 9 {
                    return false;
                }
                self.color_mix_matrix = values.clone();
                true
            }
            "whitePoint" => {
                self.white_point = [values[0].as_real() as f32, values[1].as_real() as f32, values[2].as_real() as f32];
                true
            }
            "colorCurves" => {
                self.color_curves = values.clone();
                true
            }
            "colorSamples" => {
                self.color_samples = values.clone();
                true
            }
            _ => false,
        }
    }
    fn get_attribute(&self, name: &str) -> Option<Values> {
        match name {
            "eye" => Some(vec![Value::Real(f64::from(self.eye.x)), Value::Real(f64::from(self.eye.y)), Value::Real(f64::from(self.eye.z))]),
            "target" => Some(vec![Value::Real(f64::from(self.target.x)), Value::Real(f64::from(self.target.y)), Value::Real(f64::from(self.target.z))]),
            "fov" => Some(value::single(f64::from(self.fov_degrees))),
            "colorLUT" => Some(self.color_lut.clone()),
            "colorSamples" => Some(self.color_samples.clone()),
            "colorCurves" => Some(self.color_curves.clone()),
            _ => None,
        }
    }
    fn renders(&self) -> bool {
        true
    }
    /// Draws every gathered batch of linked-Object geometry into this
    /// camera's offscreen target through the blending shader.
    fn render(&mut self, frame: &mut crate::scene::gpu::RenderFrame<'_>) {
        use crate::scene::gpu::frame::CAMERA_TARGET_HEIGHT;
        let name = self.base.name().to_owned();
        let width = ((f64::from(CAMERA_TARGET_HEIGHT) * f64::from(self.aspect.max(0.01))) as u32).max(1);
        let batches = frame.batches.get(&name).map_or(&[][..], Vec::as_slice);
        let clear = wgpu::Color {
            r: f64::from(self.clear_color[0]),
            g: f64::from(self.clear_color[1]),
            b: f64::from(self.clear_color[2]),
            a: f64::from(self.clear_color[3]),
        };
        frame.resources.draw_pass(
            frame.gpu,
            frame.encoder,
            crate::scene::gpu::TargetKind::Camera,
            &name,
            width,
            CAMERA_TARGET_HEIGHT,
            clear,
            self.view_projection(),
            self.brightness,
            batches,
            frame.frame_index,
        );
    }
    fn compute_camera_visibility(&self, positions: &[Vec3]) -> Option<(Vec<bool>, Vec<f32>)> {
        let pass = self.compute_vertex_visibility(positions);
        Some((pass.visible, pass.weight))
    }
    fn accumulate_camera_blending(&self, visible: &[bool], weight: &mut [f32]) {
        let mut pass = VisibilityPass { visible: visible.to_vec(), weight: weight.to_vec() };
        self.compute_blending_contribution(&mut pass);
        weight.copy_from_slice(&pass.weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_in_front_of_camera_is_visible() {
        let camera = Camera::new("cam1");
        let pass = camera.compute_vertex_visibility(&[Vec3::new(0.0, 0.0, -1.0)]);
        assert!(pass.visible[0]);
    }

    #[test]
    fn vertex_behind_camera_is_not_visible() {
        let camera = Camera::new("cam1");
        let pass = camera.compute_vertex_visibility(&[Vec3::new(0.0, 0.0, 20.0)]);
        assert!(!pass.visible[0]);
    }

    #[test]
    fn blending_contribution_only_adds_weight_to_visible_vertices() {
        let camera = Camera::new("cam1");
        let mut pass = camera.compute_vertex_visibility(&[Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 0.0, 20.0)]);
        camera.compute_blending_contribution(&mut pass);
        assert!((pass.weight[0] - 1.0).abs() < f32::EPSILON);
        assert!((pass.weight[1] - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn eye_attribute_round_trips_through_the_runtime() {
        let mut camera = Camera::new("cam1");
        assert!(attribute::apply_set(&mut camera, "eye", &vec![Value::Real(1.0), Value::Real(2.0), Value::Real(3.0)]));
        assert_eq!(attribute::apply_get(&camera, "eye"), vec![Value::Real(1.0), Value::Real(2.0), Value::Real(3.0)]);
    }

    #[test]
    fn color_lut_accepts_any_sample_count() {
        let mut camera = Camera::new("cam1");
        let lut: Values = (0..12).map(|i| Value::Real(f64::from(i) / 11.0)).collect();
        assert!(attribute::apply_set(&mut camera, "colorLUT", &lut));
        assert_eq!(attribute::apply_get(&camera, "colorLUT").len(), 12);
    }

    #[test]
    fn color_mix_matrix_requires_nine_entries() {
        let mut camera = Camera::new("cam1");
        assert!(!attribute::apply_set(&mut camera, "colorMixMatrix", &vec![Value::Real(1.0); 4]));
        assert!(attribute::apply_set(&mut camera, "colorMixMatrix", &vec![Value::Real(1.0); 9]));
    }
}
