//! Debug/control overlay: conceptually an `Object` whose texture is an
//! off-screen UI render target, bound to one `Window` and forwarding that
//! window's input events. The immediate-mode UI backend itself is an
//! external collaborator; this type carries the binding and visibility
//! state the scheduler needs to decide whether to draw it.

use std::sync::OnceLock;

use crate::attribute::{self, ArgKind, AttributeDescriptor, SyncPolicy};
use crate::graph_object::{Category, GraphObject, GraphObjectBase, RenderPriority};
use crate::value::Values;

fn descriptors() -> &'static [AttributeDescriptor] {
    static TABLE: OnceLock<Vec<AttributeDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            attribute::descriptor("window", vec![ArgKind::String], "name of the Window this overlay draws into", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("visible", vec![ArgKind::Bool], "whether the overlay is drawn this frame", SyncPolicy::Auto, true, false, false),
        ]
    })
}

pub struct Gui {
    base: GraphObjectBase,
    window: String,
    visible: bool,
}

impl Gui {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut base = GraphObjectBase::new(name, "gui", Category::Gui);
        base.set_render_priority(RenderPriority::Gui);
        Self { base, window: String::new(), visible: true }
    }

    #[must_use]
    pub fn bound_window(&self) -> &str {
        &self.window
    }
}

impl GraphObject for Gui {
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
            "window" => {
                self.window = values[0].as_string();
                true
            }
            "visible" => {
                self.visible = values[0].as_bool();
                true
            }
            _ => false,
        }
    }
    fn renders(&self) -> bool {
        self.visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn binding_to_a_window_is_recorded() {
        let mut gui = Gui::new("gui1");
        attribute::apply_set(&mut gui, "window", &vec![Value::String("main".into())]);
        assert_eq!(gui.bound_window(), "main");
    }

    #[test]
    fn hidden_gui_does_not_render() {
        let mut gui = Gui::new("gui1");
        attribute::apply_set(&mut gui, "visible", &vec![Value::Bool(false)]);
        assert!(!gui.renders());
    }
}
