//! A post-processing filter stage applied between an `Object`'s texture
//! output and whatever samples it next.

use std::sync::OnceLock;

use crate::attribute::{self, ArgKind, AttributeDescriptor, SyncPolicy};
use crate::graph_object::{Category, GraphObject, GraphObjectBase, RenderPriority};
use crate::value::{self, Values};

fn descriptors() -> &'static [AttributeDescriptor] {
    static TABLE: OnceLock<Vec<AttributeDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            attribute::descriptor("enabled", vec![ArgKind::Bool], "whether the filter is applied", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("strength", vec![ArgKind::Real], "filter blend strength, 0..1", SyncPolicy::Auto, true, false, false),
        ]
    })
}

pub struct Filter {
    base: GraphObjectBase,
    enabled: bool,
    strength: f64,
}

impl Filter {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut base = GraphObjectBase::new(name, "filter", Category::Filter);
        base.set_render_priority(RenderPriority::PostCamera);
        Self { base, enabled: true, strength: 1.0 }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl GraphObject for Filter {
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
            "enabled" => {
                self.enabled = values[0].as_bool();
                true
            }
            "strength" => {
                self.strength = values[0].as_real().clamp(0.0, 1.0);
                true
            }
            _ => false,
        }
    }
    fn get_attribute(&self, name: &str) -> Option<Values> {
        match name {
            "strength" => Some(value::single(self.strength)),
            _ => None,
        }
    }
    fn renders(&self) -> bool {
        self.enabled
    }
}
