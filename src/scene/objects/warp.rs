//! Control-lattice deformation applied between a camera's output and a
//! window's input, so a projector can be aligned to a non-flat surface.
//! Rendering re-draws the upstream camera target through a tessellated
//! grid whose vertices follow the lattice while the texture coordinates
//! stay on the undeformed grid.

use std::sync::OnceLock;

use glam::{Mat4, Vec3};

use crate::attribute::{self, ArgKind, AttributeDescriptor, SyncPolicy};
use crate::graph_object::{Category, GraphObject, GraphObjectBase, RenderPriority};
use crate::scene::gpu::frame::CAMERA_TARGET_HEIGHT;
use crate::scene::gpu::{DrawBatch, RenderFrame, TargetKind};
use crate::value::{self, Value, Values};

fn descriptors() -> &'static [AttributeDescriptor] {
    static TABLE: OnceLock<Vec<AttributeDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            attribute::descriptor("patchResolution", vec![ArgKind::Integer], "subdivision count per lattice cell", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("patchSize", vec![ArgKind::Integer, ArgKind::Integer], "lattice dimensions (columns, rows)", SyncPolicy::Auto, true, false, false),
            attribute::descriptor_variadic("patchControl", "flattened (x, y) control point pairs", SyncPolicy::Auto, true, false, true),
        ]
    })
}

pub struct Warp {
    base: GraphObjectBase,
    patch_resolution: i64,
    columns: i64,
    rows: i64,
    control_points: Vec<(f64, f64)>,
}

impl Warp {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut base = GraphObjectBase::new(name, "warp", Category::Warp);
        base.set_render_priority(RenderPriority::PostCamera);
        let mut warp = Self { base, patch_resolution: 8, columns: 2, rows: 2, control_points: Vec::new() };
        warp.reset_grid();
        warp
    }

    fn reset_grid(&mut self) {
        let (cols, rows) = (self.columns.max(1), self.rows.max(1));
        self.control_points = (0..rows)
            .flat_map(|r| {
                (0..cols).map(move |c| {
                    let x = c as f64 / (cols - 1).max(1) as f64;
                    let y = r as f64 / (rows - 1).max(1) as f64;
                    (x, y)
                })
            })
            .collect();
    }

    /// Deforms a point on the unit grid through the control lattice:
    /// bilinear interpolation of the containing cell's four corners.
    fn deformed(&self, gx: f64, gy: f64) -> (f64, f64) {
        let (cols, rows) = (self.columns.max(2) as usize, self.rows.max(2) as usize);
        if self.control_points.len() < cols * rows {
            return (gx, gy);
        }
        let fx = gx.clamp(0.0, 1.0) * (cols - 1) as f64;
        let fy = gy.clamp(0.0, 1.0) * (rows - 1) as f64;
        let cx = (fx as usize).min(cols - 2);
        let cy = (fy as usize).min(rows - 2);
        let s = fx - cx as f64;
        let t = fy - cy as f64;
        let p = |x: usize, y: usize| self.control_points[y * cols + x];
        let (p00, p10, p01, p11) = (p(cx, cy), p(cx + 1, cy), p(cx, cy + 1), p(cx + 1, cy + 1));
        let x = (1.0 - s) * (1.0 - t) * p00.0 + s * (1.0 - t) * p10.0 + (1.0 - s) * t * p01.0 + s * t * p11.0;
        let y = (1.0 - s) * (1.0 - t) * p00.1 + s * (1.0 - t) * p10.1 + (1.0 - s) * t * p01.1 + s * t * p11.1;
        (x, y)
    }

    /// Tessellates the lattice into a triangle list: clip-space positions
    /// follow the deformed lattice, texture coordinates stay on the
    /// undeformed grid, `patchResolution` sub-quads per cell edge.
    #[must_use]
    pub fn tessellated_batch(&self) -> DrawBatch {
        let resolution = self.patch_resolution.max(1) as usize;
        let (cols, rows) = (self.columns.max(2) as usize, self.rows.max(2) as usize);
        let steps_x = (cols - 1) * resolution;
        let steps_y = (rows - 1) * resolution;
        let mut batch = DrawBatch::default();
        let mut push = |gx: f64, gy: f64| {
            let (dx, dy) = self.deformed(gx, gy);
            batch.positions.push(Vec3::new((dx * 2.0 - 1.0) as f32, (dy * 2.0 - 1.0) as f32, 0.0));
            batch.uvs.push([gx as f32, 1.0 - gy as f32]);
            batch.weights.push(1.0);
        };
        for iy in 0..steps_y {
            for ix in 0..steps_x {
                let (x0, x1) = (ix as f64 / steps_x as f64, (ix + 1) as f64 / steps_x as f64);
                let (y0, y1) = (iy as f64 / steps_y as f64, (iy + 1) as f64 / steps_y as f64);
                for (gx, gy) in [(x0, y0), (x1, y0), (x1, y1), (x0, y0), (x1, y1), (x0, y1)] {
                    push(gx, gy);
                }
            }
        }
        batch
    }

    /// Returns the index of the control point nearest `xy` (normalized
    /// `[0,1]` cursor coordinates), or `None` if the lattice is empty.
    #[must_use]
    pub fn pick_control_point(&self, xy: (f64, f64)) -> Option<usize> {
        self.control_points
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da = (a.0 - xy.0).powi(2) + (a.1 - xy.1).powi(2);
                let db = (b.0 - xy.0).powi(2) + (b.1 - xy.1).powi(2);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(index, _)| index)
    }
}

impl GraphObject for Warp {
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
            "patchResolution" => {
                self.patch_resolution = values[0].as_integer();
                true
            }
            "patchSize" => {
                self.columns = values[0].as_integer();
                self.rows = values[1].as_integer();
                self.reset_grid();
                true
            }
            "patchControl" => {
                if values.len() % 2 != 0 {
                    return false;
                }
                self.control_points = values.chunks(2).map(|pair| (pair[0].as_real(), pair[1].as_real())).collect();
                true
            }
            _ => false,
        }
    }
    fn get_attribute(&self, name: &str) -> Option<Values> {
        match name {
            "patchResolution" => Some(value::single(self.patch_resolution)),
            "patchSize" => Some(vec![Value::Integer(self.columns), Value::Integer(self.rows)]),
            "patchControl" => Some(self.control_points.iter().flat_map(|(x, y)| [Value::Real(*x), Value::Real(*y)]).collect()),
            _ => None,
        }
    }
    fn renders(&self) -> bool {
        true
    }
    /// Re-draws the upstream camera output through the deformed lattice
    /// into this warp's own target, which then shadows the raw camera
    /// output for any downstream window.
    fn render(&mut self, frame: &mut RenderFrame<'_>) {
        let name = self.base.name().to_owned();
        let Some(source) = frame.inputs.get(&name).and_then(|list| list.first()).cloned() else {
            return;
        };
        let mut batch = self.tessellated_batch();
        batch.textures = vec![source.clone()];
        let (width, height) = frame.resources.source_size(&source).unwrap_or((1920, CAMERA_TARGET_HEIGHT));
        frame.resources.draw_pass(frame.gpu, frame.encoder, TargetKind::Warp, &name, width, height, wgpu::Color::BLACK, Mat4::IDENTITY, 1.0, &[batch], frame.frame_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_has_size_rows_times_columns_points() {
        let warp = Warp::new("w1");
        assert_eq!(warp.control_points.len(), 4);
    }

    #[test]
    fn pick_control_point_returns_the_nearest_corner() {
        let warp = Warp::new("w1");
        let index = warp.pick_control_point((0.9, 0.9)).unwrap();
        assert_eq!(warp.control_points[index], (1.0, 1.0));
    }

    #[test]
    fn patch_size_change_regenerates_the_grid() {
        let mut warp = Warp::new("w1");
        attribute::apply_set(&mut warp, "patchSize", &vec![Value::Integer(3), Value::Integer(3)]);
        assert_eq!(warp.control_points.len(), 9);
    }

    #[test]
    fn identity_lattice_tessellates_into_the_unit_grid() {
        let warp = Warp::new("w1");
        let batch = warp.tessellated_batch();
        // one cell, default resolution 8: 8x8 sub-quads, two triangles each
        assert_eq!(batch.positions.len(), 8 * 8 * 6);
        assert!(batch.positions.iter().all(|p| (-1.0..=1.0).contains(&p.x) && (-1.0..=1.0).contains(&p.y)));
        assert!(batch.uvs.iter().all(|uv| (0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1])));
    }

    #[test]
    fn displaced_control_points_deform_the_lattice_edge() {
        let mut warp = Warp::new("w1");
        // pull the whole right column inward
        attribute::apply_set(
            &mut warp,
            "patchControl",
            &vec![Value::Real(0.0), Value::Real(0.0), Value::Real(0.85), Value::Real(0.0), Value::Real(0.0), Value::Real(1.0), Value::Real(0.8), Value::Real(1.0)],
        );
        let batch = warp.tessellated_batch();
        let max_x = batch.positions.iter().map(|p| p.x).fold(f32::MIN, f32::max);
        assert!(max_x < 1.0 - 1e-3, "the deformed lattice must pull the edge inward, got {max_x}");
    }
}
