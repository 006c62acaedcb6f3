//! Joystick `UserInput` subclass: axis values are dead-zoned,
//! accumulated between reads and reset on read; button values reflect the
//! current boolean press-state.
//!
//! Winit carries no joystick/gamepad events, so ingestion is driven by
//! whatever polls the physical device (not built here, the same
//! hardware-decoupling this crate applies to `color_calibration::capture`).

use std::sync::OnceLock;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::attribute::{self, ArgKind, AttributeDescriptor, SyncPolicy};
use crate::graph_object::{Category, GraphObject, GraphObjectBase, RenderPriority};
use crate::input::state::{State, UserInputCore, JOYSTICK_DEAD_ZONE};
use crate::value::{Value, Values};

fn descriptors() -> &'static [AttributeDescriptor] {
    static TABLE: OnceLock<Vec<AttributeDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| vec![attribute::descriptor("updateRate", vec![ArgKind::Integer], "loop rate in Hz, floored at 10", SyncPolicy::Auto, true, false, false)])
}

pub struct Joystick {
    base: GraphObjectBase,
    core: UserInputCore,
    index: u32,
    axes: Mutex<FxHashMap<u32, f32>>,
}

impl Joystick {
    #[must_use]
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        let mut base = GraphObjectBase::new(name, "joystick", Category::Other);
        base.set_render_priority(RenderPriority::NoRender);
        Self { base, core: UserInputCore::new(), index, axes: Mutex::new(FxHashMap::default()) }
    }

    #[must_use]
    pub fn core(&self) -> &UserInputCore {
        &self.core
    }

    /// Accumulates a raw axis sample, dead-zoning it first. Multiple
    /// samples between reads add up; `read_state` flushes the total.
    pub fn ingest_axis(&self, axis: u32, raw_value: f32) {
        let value = if raw_value.abs() < JOYSTICK_DEAD_ZONE { 0.0 } else { raw_value };
        if value == 0.0 {
            return;
        }
        *self.axes.lock().entry(axis).or_insert(0.0) += value;
    }

    pub fn ingest_button(&self, button: u32, pressed: bool, modifiers: u32, window: &str) {
        self.core.push(State { action: format!("joystick_{}_buttons", self.index), value: vec![Value::Integer(i64::from(button)), Value::Bool(pressed)], modifiers, window: window.to_owned() });
    }

    /// Flushes the axis accumulator into `State` records and zeroes it.
    pub fn read_state(&self, modifiers: u32, window: &str) {
        let mut axes = self.axes.lock();
        for (axis, value) in axes.drain() {
            self.core.push(State { action: format!("joystick_{}_axes", self.index), value: vec![Value::Integer(i64::from(axis)), Value::Real(f64::from(value))], modifiers, window: window.to_owned() });
        }
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
        self.read_state(0, "main");
        self.core.snapshot(id)
    }
}

impl GraphObject for Joystick {
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
    fn sub_dead_zone_samples_are_dropped() {
        let joystick = Joystick::new("joy", 0);
        joystick.ingest_axis(0, 0.1);
        let states = joystick.get_state("viewer");
        assert!(states.is_empty());
    }

    #[test]
    fn multiple_samples_accumulate_between_reads() {
        let joystick = Joystick::new("joy", 0);
        joystick.ingest_axis(1, 0.3);
        joystick.ingest_axis(1, 0.3);
        let states = joystick.get_state("viewer");
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].action, "joystick_0_axes");
        let Value::Real(total) = states[0].value[1] else { panic!("expected a real axis value") };
        assert!((total - 0.6).abs() < 1e-6);
    }

    #[test]
    fn reading_resets_the_accumulator() {
        let joystick = Joystick::new("joy", 2);
        joystick.ingest_axis(0, 0.5);
        assert_eq!(joystick.get_state("viewer").len(), 1);
        assert!(joystick.get_state("viewer").is_empty());
    }

    #[test]
    fn button_state_is_reported_immediately_not_accumulated() {
        let joystick = Joystick::new("joy", 0);
        joystick.ingest_button(3, true, 0, "main");
        joystick.ingest_button(3, false, 0, "main");
        let states = joystick.get_state("viewer");
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].value[1], Value::Bool(true));
        assert_eq!(states[1].value[1], Value::Bool(false));
    }
}
