//! Drag-and-drop `UserInput` subclass: one `State` per drop event,
//! carrying the dropped paths as string values.

use std::sync::OnceLock;

use crate::attribute::{self, ArgKind, AttributeDescriptor, SyncPolicy};
use crate::graph_object::{Category, GraphObject, GraphObjectBase, RenderPriority};
use crate::input::state::{State, UserInputCore};
use crate::value::{Value, Values};

fn descriptors() -> &'static [AttributeDescriptor] {
    static TABLE: OnceLock<Vec<AttributeDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| vec![attribute::descriptor("updateRate", vec![ArgKind::Integer], "loop rate in Hz, floored at 10", SyncPolicy::Auto, true, false, false)])
}

pub struct DragNDrop {
    base: GraphObjectBase,
    core: UserInputCore,
}

impl DragNDrop {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut base = GraphObjectBase::new(name, "dragndrop", Category::Other);
        base.set_render_priority(RenderPriority::NoRender);
        Self { base, core: UserInputCore::new() }
    }

    #[must_use]
    pub fn core(&self) -> &UserInputCore {
        &self.core
    }

    pub fn ingest(&self, paths: Vec<String>, modifiers: u32, window: &str) {
        if paths.is_empty() {
            return;
        }
        self.core.push(State { action: "dragndrop_drop".to_owned(), value: paths.into_iter().map(Value::String).collect(), modifiers, window: window.to_owned() });
    }

    #[must_use]
    pub fn capture(&self, id: &str) -> bool {
        self.core.capture(id)
    }

    pub fn release(&self, id: &str) {
        self.core.release(id);
    }

    #[must_use]
    pub fn get_state(&self, id: &str) -> Vec<State> {
        self.core.snapshot(id)
    }
}

impl GraphObject for DragNDrop {
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
            "updateRate" => {
                self.core.set_update_rate(values[0].as_integer().max(0) as u32);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_produces_one_state_with_every_path() {
        let dnd = DragNDrop::new("dnd");
        dnd.ingest(vec!["/tmp/a.png".into(), "/tmp/b.png".into()], 0, "main");
        let states = dnd.get_state("viewer");
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].action, "dragndrop_drop");
        assert_eq!(states[0].value, vec![Value::String("/tmp/a.png".into()), Value::String("/tmp/b.png".into())]);
    }

    #[test]
    fn an_empty_drop_is_not_recorded() {
        let dnd = DragNDrop::new("dnd");
        dnd.ingest(Vec::new(), 0, "main");
        assert!(dnd.get_state("viewer").is_empty());
    }
}
