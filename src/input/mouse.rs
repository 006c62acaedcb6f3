//! Mouse `UserInput` subclass: cursor position, button press state and
//! wheel delta, each an independent `State` action in arrival order.

use std::sync::OnceLock;

use winit::event::{ElementState, MouseButton, MouseScrollDelta};

use crate::attribute::{self, ArgKind, AttributeDescriptor, SyncPolicy};
use crate::graph_object::{Category, GraphObject, GraphObjectBase, RenderPriority};
use crate::input::state::{State, UserInputCore};
use crate::value::{Value, Values};

fn descriptors() -> &'static [AttributeDescriptor] {
    static TABLE: OnceLock<Vec<AttributeDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| vec![attribute::descriptor("updateRate", vec![ArgKind::Integer], "loop rate in Hz, floored at 10", SyncPolicy::Auto, true, false, false)])
}

pub struct Mouse {
    base: GraphObjectBase,
    core: UserInputCore,
}

impl Mouse {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut base = GraphObjectBase::new(name, "mouse", Category::Other);
        base.set_render_priority(RenderPriority::NoRender);
        Self { base, core: UserInputCore::new() }
    }

    #[must_use]
    pub fn core(&self) -> &UserInputCore {
        &self.core
    }

    pub fn ingest_move(&self, x: f64, y: f64, modifiers: u32, window: &str) {
        self.core.push(State { action: "mouse_move".to_owned(), value: vec![Value::Real(x), Value::Real(y)], modifiers, window: window.to_owned() });
    }

    pub fn ingest_button(&self, button: MouseButton, element_state: ElementState, modifiers: u32, window: &str) {
        let action = match element_state {
            ElementState::Pressed => "mouse_press",
            ElementState::Released => "mouse_release",
        };
        self.core.push(State { action: action.to_owned(), value: vec![Value::String(button_name(button))], modifiers, window: window.to_owned() });
    }

    pub fn ingest_scroll(&self, delta: MouseScrollDelta, modifiers: u32, window: &str) {
        let (dx, dy) = match delta {
            MouseScrollDelta::LineDelta(x, y) => (f64::from(x), f64::from(y)),
            MouseScrollDelta::PixelDelta(pos) => (pos.x, pos.y),
        };
        self.core.push(State { action: "mouse_scroll".to_owned(), value: vec![Value::Real(dx), Value::Real(dy)], modifiers, window: window.to_owned() });
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

fn button_name(button: MouseButton) -> String {
    match button {
        MouseButton::Left => "left".to_owned(),
        MouseButton::Right => "right".to_owned(),
        MouseButton::Middle => "middle".to_owned(),
        MouseButton::Back => "back".to_owned(),
        MouseButton::Forward => "forward".to_owned(),
        MouseButton::Other(code) => format!("other_{code}"),
    }
}

impl GraphObject for Mouse {
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
    fn move_press_and_scroll_are_ordered_in_arrival_order() {
        let mouse = Mouse::new("mouse");
        mouse.ingest_move(10.0, 20.0, 0, "main");
        mouse.ingest_button(MouseButton::Left, ElementState::Pressed, 0, "main");
        mouse.ingest_scroll(MouseScrollDelta::LineDelta(0.0, 1.0), 0, "main");
        let states = mouse.get_state("viewer");
        assert_eq!(states.iter().map(|s| s.action.as_str()).collect::<Vec<_>>(), ["mouse_move", "mouse_press", "mouse_scroll"]);
    }

    #[test]
    fn pixel_scroll_passes_through_without_a_line_scale_factor() {
        let mouse = Mouse::new("mouse");
        mouse.ingest_scroll(MouseScrollDelta::PixelDelta(winit::dpi::PhysicalPosition::new(12.0, -4.0)), 0, "main");
        let states = mouse.get_state("viewer");
        assert_eq!(states[0].value, vec![Value::Real(12.0), Value::Real(-4.0)]);
    }
}
