//! Raw vertex/index geometry, plus the "alternative buffer" slot the
//! Blender writes a tessellated mesh into. `useAlternativeBuffers` picks
//! which set an `Object` should bind for drawing, without invalidating the
//! original mesh (so deactivating blending is instant, not a re-upload).

use std::sync::OnceLock;

use glam::Vec3;

use crate::attribute::{self, AttributeDescriptor, SyncPolicy};
use crate::graph_object::{Category, GraphObject, GraphObjectBase, RenderPriority};
use crate::value::Values;

fn descriptors() -> &'static [AttributeDescriptor] {
    static TABLE: OnceLock<Vec<AttributeDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            attribute::descriptor("useAlternativeBuffers", vec![crate::attribute::ArgKind::Bool], "bind the blending-recomputed buffers instead of the source mesh", SyncPolicy::Auto, false, false, false),
            attribute::descriptor("vertexCount", vec![], "number of vertices in the source mesh", SyncPolicy::Auto, false, false, true),
        ]
    })
}

/// One vertex/index/annexe buffer set. `Geometry` keeps two: the source
/// mesh and the Blender's alternative output.
#[derive(Debug, Default, Clone)]
pub struct MeshBuffers {
    pub positions: Vec<Vec3>,
    pub uvs: Vec<[f32; 2]>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
}

pub struct Geometry {
    base: GraphObjectBase,
    source: MeshBuffers,
    alternative: MeshBuffers,
    use_alternative: bool,
    blend_weights: Vec<f32>,
}

impl Geometry {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_type(name, "geometry")
    }

    /// Builds under an alternate type string (`mesh` is an alias kept so a
    /// configuration written against either name loads and saves back the
    /// same way).
    #[must_use]
    pub fn with_type(name: impl Into<String>, type_name: &'static str) -> Self {
        let mut base = GraphObjectBase::new(name, type_name, Category::Geometry);
        base.set_render_priority(RenderPriority::NoRender);
        Self { base, source: MeshBuffers::default(), alternative: MeshBuffers::default(), use_alternative: false, blend_weights: Vec::new() }
    }

    #[must_use]
    pub fn active_buffers(&self) -> &MeshBuffers {
        if self.use_alternative {
            &self.alternative
        } else {
            &self.source
        }
    }

    pub fn set_source_buffers(&mut self, buffers: MeshBuffers) {
        self.source = buffers;
        self.base.mark_updated();
    }

    pub fn set_alternative_buffers(&mut self, buffers: MeshBuffers) {
        self.alternative = buffers;
    }

    #[must_use]
    pub fn uses_alternative(&self) -> bool {
        self.use_alternative
    }

    /// Restores the source mesh as current and discards the alternative
    /// buffers — `resetTessellation`'s effect on a `Geometry`.
    pub fn reset_tessellation(&mut self) {
        self.use_alternative = false;
        self.alternative = MeshBuffers::default();
    }
}

impl GraphObject for Geometry {
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
            "useAlternativeBuffers" => {
                self.use_alternative = values[0].as_bool();
                true
            }
            _ => false,
        }
    }
    fn get_attribute(&self, name: &str) -> Option<Values> {
        match name {
            "vertexCount" => Some(crate::value::single(self.source.positions.len() as i64)),
            _ => None,
        }
    }
    /// Deserializes a counted mesh frame (see [`encode_mesh`]) into the
    /// alternative buffer slot and activates it — the receiving half of
    /// the Blender's cross-process mesh distribution. A malformed frame is
    /// rejected without touching the current buffers.
    fn receive_buffer(&mut self, payload: &[u8]) -> bool {
        let Some(buffers) = decode_mesh(payload) else {
            return false;
        };
        self.set_alternative_buffers(buffers);
        self.use_alternative = true;
        true
    }

    fn reset_geometry_tessellation(&mut self) {
        self.reset_tessellation();
    }

    fn mesh_positions(&self) -> Option<Vec<Vec3>> {
        Some(self.source.positions.clone())
    }

    fn active_mesh_snapshot(&self) -> Option<(Vec<Vec3>, Vec<[f32; 2]>)> {
        let buffers = self.active_buffers();
        Some((buffers.positions.clone(), buffers.uvs.clone()))
    }

    fn apply_tessellated_positions(&mut self, positions: Vec<Vec3>) {
        self.set_alternative_buffers(MeshBuffers { positions, ..Default::default() });
        self.use_alternative = true;
    }

    fn serialize_active_mesh(&self) -> Option<Vec<u8>> {
        Some(encode_mesh(self.active_buffers()))
    }

    fn set_blend_weights(&mut self, weights: Vec<f32>) {
        self.blend_weights = weights;
    }

    fn blend_weights(&self) -> Option<Vec<f32>> {
        Some(self.blend_weights.clone())
    }
}

/// Flattens a mesh into its replication frame: four element counts
/// (vertices, uvs, normals, annexe), then the arrays tightly packed as
/// 32-bit floats — vec4 vertices (w = 1), vec2 uvs, vec4 normals (w = 0).
/// The annexe slot is carried as a count of zero; nothing here produces
/// one.
#[must_use]
pub fn encode_mesh(buffers: &MeshBuffers) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(32 + buffers.positions.len() * 16 + buffers.uvs.len() * 8 + buffers.normals.len() * 16);
    bytes.extend_from_slice(&(buffers.positions.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&(buffers.uvs.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&(buffers.normals.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes());
    for p in &buffers.positions {
        for component in [p.x, p.y, p.z, 1.0] {
            bytes.extend_from_slice(&component.to_le_bytes());
        }
    }
    for uv in &buffers.uvs {
        bytes.extend_from_slice(&uv[0].to_le_bytes());
        bytes.extend_from_slice(&uv[1].to_le_bytes());
    }
    for n in &buffers.normals {
        for component in [n.x, n.y, n.z, 0.0] {
            bytes.extend_from_slice(&component.to_le_bytes());
        }
    }
    bytes
}

/// Parses a frame produced by [`encode_mesh`]. Returns `None` if the
/// counts don't match the payload length. An annexe array, if present, is
/// skipped (the count is validated but the data has no CPU-side home).
#[must_use]
pub fn decode_mesh(payload: &[u8]) -> Option<MeshBuffers> {
    if payload.len() < 32 {
        return None;
    }
    let (n_vertices, n_uvs, n_normals, n_annexe) = (
        u64::from_le_bytes(payload[0..8].try_into().ok()?) as usize,
        u64::from_le_bytes(payload[8..16].try_into().ok()?) as usize,
        u64::from_le_bytes(payload[16..24].try_into().ok()?) as usize,
        u64::from_le_bytes(payload[24..32].try_into().ok()?) as usize,
    );
    let expected = 32usize
        .checked_add(n_vertices.checked_mul(16)?)?
        .checked_add(n_uvs.checked_mul(8)?)?
        .checked_add(n_normals.checked_mul(16)?)?
        .checked_add(n_annexe.checked_mul(16)?)?;
    if payload.len() != expected {
        return None;
    }
    let f32_at = |offset: usize| f32::from_le_bytes([payload[offset], payload[offset + 1], payload[offset + 2], payload[offset + 3]]);

    let mut offset = 32;
    let mut positions = Vec::with_capacity(n_vertices);
    for _ in 0..n_vertices {
        positions.push(Vec3::new(f32_at(offset), f32_at(offset + 4), f32_at(offset + 8)));
        offset += 16;
    }
    let mut uvs = Vec::with_capacity(n_uvs);
    for _ in 0..n_uvs {
        uvs.push([f32_at(offset), f32_at(offset + 4)]);
        offset += 8;
    }
    let mut normals = Vec::with_capacity(n_normals);
    for _ in 0..n_normals {
        normals.push(Vec3::new(f32_at(offset), f32_at(offset + 4), f32_at(offset + 8)));
        offset += 16;
    }
    Some(MeshBuffers { positions, uvs, normals, indices: Vec::new() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_alternative_buffers_switches_active_set() {
        let mut geometry = Geometry::new("g1");
        geometry.set_source_buffers(MeshBuffers { positions: vec![Vec3::ZERO], ..Default::default() });
        geometry.set_alternative_buffers(MeshBuffers { positions: vec![Vec3::ZERO, Vec3::ONE], ..Default::default() });
        assert_eq!(geometry.active_buffers().positions.len(), 1);
        geometry.use_alternative = true;
        assert_eq!(geometry.active_buffers().positions.len(), 2);
    }

    #[test]
    fn serialize_active_mesh_round_trips_through_receive_buffer() {
        let mut source = Geometry::new("g1");
        source.set_source_buffers(MeshBuffers {
            positions: vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(-1.0, 0.5, 9.0)],
            uvs: vec![[0.0, 0.0], [1.0, 1.0]],
            normals: vec![Vec3::Y, Vec3::Y],
            ..Default::default()
        });
        let payload = source.serialize_active_mesh().unwrap();

        let mut target = Geometry::new("g2");
        assert!(target.receive_buffer(&payload));
        assert_eq!(target.active_buffers().positions, source.active_buffers().positions);
        assert_eq!(target.active_buffers().uvs, source.active_buffers().uvs);
        assert_eq!(target.active_buffers().normals, source.active_buffers().normals);
    }

    #[test]
    fn truncated_mesh_frame_is_rejected_without_side_effects() {
        let mut geometry = Geometry::new("g1");
        assert!(!geometry.receive_buffer(&[1, 2, 3]));
        let mut valid = encode_mesh(&MeshBuffers { positions: vec![Vec3::ZERO], ..Default::default() });
        valid.pop();
        assert!(!geometry.receive_buffer(&valid));
        assert!(!geometry.uses_alternative());
    }

    #[test]
    fn reset_tessellation_drops_alternative_buffers() {
        let mut geometry = Geometry::new("g1");
        geometry.set_alternative_buffers(MeshBuffers { positions: vec![Vec3::ZERO], ..Default::default() });
        geometry.use_alternative = true;
        geometry.reset_tessellation();
        assert!(!geometry.uses_alternative());
        assert!(geometry.active_buffers().positions.is_empty());
    }
}
