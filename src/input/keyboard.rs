//! Keyboard `UserInput` subclass: translates physical key events into
//! `keyboard_press` / `keyboard_release` states. Keys are identified by
//! physical `KeyCode`, so keyboard layout doesn't change which key fires.

use std::sync::OnceLock;

use winit::event::ElementState;
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::attribute::{self, ArgKind, AttributeDescriptor, SyncPolicy};
use crate::graph_object::{Category, GraphObject, GraphObjectBase, RenderPriority};
use crate::input::state::{State, UserInputCore};
use crate::value::{self, Values};

fn descriptors() -> &'static [AttributeDescriptor] {
    static TABLE: OnceLock<Vec<AttributeDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| vec![attribute::descriptor("updateRate", vec![ArgKind::Integer], "loop rate in Hz, floored at 10", SyncPolicy::Auto, true, false, false)])
}

pub struct Keyboard {
    base: GraphObjectBase,
    core: UserInputCore,
}

impl Keyboard {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut base = GraphObjectBase::new(name, "keyboard", Category::Other);
        base.set_render_priority(RenderPriority::NoRender);
        Self { base, core: UserInputCore::new() }
    }

    #[must_use]
    pub fn core(&self) -> &UserInputCore {
        &self.core
    }

    /// Called by the window-event thread for every physical key transition.
    pub fn ingest(&self, code: PhysicalKey, element_state: ElementState, modifiers: u32, window: &str) {
        let PhysicalKey::Code(code) = code else { return };
        let action = match element_state {
            ElementState::Pressed => "keyboard_press",
            ElementState::Released => "keyboard_release",
        };
        self.core.push(State { action: action.to_owned(), value: value::single(key_name(code)), modifiers, window: window.to_owned() });
    }

    #[must_use]
    pub fn capture(&self, id: &str) -> bool {
        self.core.capture(id)
    }

    pub fn release(&self, id: &str) {
        self.core.release(id);
    }

    /// No separate drain step: `ingest` already produces `State` records.
    #[must_use]
    pub fn get_state(&self, id: &str) -> Vec<State> {
        self.core.snapshot(id)
    }
}

fn key_name(code: KeyCode) -> String {
    format!("{code:?}")
}

impl GraphObject for Keyboard {
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
    fn key_press_then_release_produces_two_states_in_order() {
        let keyboard = Keyboard::new("kbd");
        keyboard.ingest(PhysicalKey::Code(KeyCode::KeyW), ElementState::Pressed, 0, "main");
        keyboard.ingest(PhysicalKey::Code(KeyCode::KeyW), ElementState::Released, 0, "main");
        let states = keyboard.get_state("viewer");
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].action, "keyboard_press");
        assert_eq!(states[1].action, "keyboard_release");
    }

    #[test]
    fn capture_blocks_other_readers() {
        let keyboard = Keyboard::new("kbd");
        keyboard.ingest(PhysicalKey::Code(KeyCode::Space), ElementState::Pressed, 0, "main");
        assert!(keyboard.capture("owner"));
        assert!(keyboard.get_state("intruder").is_empty());
        assert_eq!(keyboard.get_state("owner").len(), 1);
    }
}
