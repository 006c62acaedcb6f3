//! An ordered render-queue grouping: names a fixed sequence of other
//! objects the scheduler should treat as one unit for priority purposes,
//! without owning them.

use std::sync::OnceLock;

use crate::attribute::{self, AttributeDescriptor, SyncPolicy};
use crate::graph_object::{Category, GraphObject, GraphObjectBase, RenderPriority};
use crate::value::Values;

fn descriptors() -> &'static [AttributeDescriptor] {
    static TABLE: OnceLock<Vec<AttributeDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| vec![attribute::descriptor_variadic("members", "ordered list of member object names", SyncPolicy::Auto, true, false, true)])
}

pub struct Queue {
    base: GraphObjectBase,
    members: Vec<String>,
}

impl Queue {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut base = GraphObjectBase::new(name, "queue", Category::Queue);
        base.set_render_priority(RenderPriority::NoRender);
        Self { base, members: Vec::new() }
    }

    #[must_use]
    pub fn members(&self) -> &[String] {
        &self.members
    }
}

impl GraphObject for Queue {
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
            "members" => {
                self.members = values.iter().map(crate::value::Value::as_string).collect();
                true
            }
            _ => false,
        }
    }
    fn get_attribute(&self, name: &str) -> Option<Values> {
        match name {
            "members" => Some(self.members.iter().cloned().map(crate::value::Value::String).collect()),
            _ => None,
        }
    }
}
