//! A renderable mesh instance: a `(geometry, shader, texture-list)` triple
//! plus the dirty bits the Blender's algorithm toggles through no-argument
//! attribute setters.

use std::sync::OnceLock;

use crate::attribute::{self, ArgKind, AttributeDescriptor, SyncPolicy};
use crate::graph_object::{Category, GraphObject, GraphObjectBase, RenderPriority};
use crate::value::Values;

fn descriptors() -> &'static [AttributeDescriptor] {
    static TABLE: OnceLock<Vec<AttributeDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            attribute::descriptor("geometry", vec![ArgKind::String], "name of the linked Geometry", SyncPolicy::Auto, true, false, false),
            attribute::descriptor_variadic("textures", "ordered list of linked texture object names", SyncPolicy::Auto, true, false, true),
            attribute::descriptor("visible", vec![ArgKind::Bool], "whether this object is drawn", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("activateVertexBlending", vec![], "enable sampling the per-vertex blending weight attribute", SyncPolicy::Auto, false, false, false),
            attribute::descriptor("resetTessellation", vec![], "discard Blender-produced alternative geometry", SyncPolicy::Auto, false, false, false),
            attribute::descriptor("resetBlendingAttribute", vec![], "zero the per-vertex blending weight attribute", SyncPolicy::Auto, false, false, false),
            attribute::descriptor("resetVisibility", vec![], "clear the per-vertex visibility flags", SyncPolicy::Auto, false, false, false),
        ]
    })
}

pub struct Object {
    base: GraphObjectBase,
    geometry: String,
    textures: Vec<String>,
    visible: bool,
    vertex_blending_active: bool,
}

impl Object {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut base = GraphObjectBase::new(name, "object", Category::Object);
        base.set_render_priority(RenderPriority::PreCamera);
        Self { base, geometry: String::new(), textures: Vec::new(), visible: true, vertex_blending_active: false }
    }

    #[must_use]
    pub fn geometry_name(&self) -> &str {
        &self.geometry
    }

    #[must_use]
    pub fn is_vertex_blending_active(&self) -> bool {
        self.vertex_blending_active
    }
}

impl GraphObject for Object {
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
            "geometry" => {
                self.geometry = values[0].as_string();
                true
            }
            "textures" => {
                self.textures = values.iter().map(crate::value::Value::as_string).collect();
                true
            }
            "visible" => {
                self.visible = values[0].as_bool();
                true
            }
            "activateVertexBlending" => {
                self.vertex_blending_active = true;
                self.base.mark_updated();
                true
            }
            "resetTessellation" | "resetBlendingAttribute" | "resetVisibility" => {
                if name == "resetTessellation" {
                    self.vertex_blending_active = false;
                }
                self.base.mark_updated();
                true
            }
            _ => false,
        }
    }
    fn get_attribute(&self, name: &str) -> Option<Values> {
        match name {
            "textures" => Some(self.textures.iter().cloned().map(crate::value::Value::String).collect()),
            _ => None,
        }
    }
    fn renders(&self) -> bool {
        self.visible
    }
    fn linked_geometry(&self) -> Option<String> {
        if self.geometry.is_empty() {
            None
        } else {
            Some(self.geometry.clone())
        }
    }
    fn texture_names(&self) -> Vec<String> {
        self.textures.clone()
    }
    fn is_vertex_blending_active(&self) -> bool {
        self.vertex_blending_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn activate_vertex_blending_is_a_no_argument_toggle() {
        let mut object = Object::new("o1");
        assert!(!object.is_vertex_blending_active());
        assert!(attribute::apply_set(&mut object, "activateVertexBlending", &Values::new()));
        assert!(object.is_vertex_blending_active());
    }

    #[test]
    fn reset_tessellation_clears_the_blending_flag() {
        let mut object = Object::new("o1");
        attribute::apply_set(&mut object, "activateVertexBlending", &Values::new());
        attribute::apply_set(&mut object, "resetTessellation", &Values::new());
        assert!(!object.is_vertex_blending_active());
    }

    #[test]
    fn geometry_attribute_stores_the_linked_name() {
        let mut object = Object::new("o1");
        attribute::apply_set(&mut object, "geometry", &vec![Value::String("g1".into())]);
        assert_eq!(object.geometry_name(), "g1");
    }
}
