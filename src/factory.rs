//! Type-string → constructor dispatch for config-driven object creation.
//!
//! The configuration schema spawns objects by type name (`"camera"`,
//! `"window"`, ...); `Factory` is the table a `RootObject` consults to
//! turn that string into a boxed `GraphObject`.

use rustc_hash::FxHashMap;

use crate::graph_object::GraphObject;

/// A constructor registered under one type name.
type Constructor = Box<dyn Fn(String) -> Box<dyn GraphObject + Send> + Send + Sync>;

/// Maps config `type` strings to constructors. One `Factory` lives inside
/// each `RootObject`; Scene and World register different type sets.
#[derive(Default)]
pub struct Factory {
    constructors: FxHashMap<&'static str, Constructor>,
}

impl Factory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor under `type_name`. Re-registering the same
    /// name replaces the previous constructor.
    pub fn register<F>(&mut self, type_name: &'static str, ctor: F)
    where
        F: Fn(String) -> Box<dyn GraphObject + Send> + Send + Sync + 'static,
    {
        self.constructors.insert(type_name, Box::new(ctor));
    }

    /// Builds a new object of `type_name` named `name`, or `None` if no
    /// constructor is registered for that type.
    #[must_use]
    pub fn build(&self, type_name: &str, name: String) -> Option<Box<dyn GraphObject + Send>> {
        self.constructors.get(type_name).map(|ctor| ctor(name))
    }

    /// Whether a constructor is registered for `type_name`.
    #[must_use]
    pub fn supports(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Lists every registered type name, in no particular order.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeDescriptor;
    use crate::graph_object::{Category, GraphObject, GraphObjectBase};
    use crate::value::Values;

    struct Stub {
        base: GraphObjectBase,
    }

    impl GraphObject for Stub {
        fn base(&self) -> &GraphObjectBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut GraphObjectBase {
            &mut self.base
        }
        fn attribute_descriptors(&self) -> &[AttributeDescriptor] {
            &[]
        }
        fn set_attribute(&mut self, _name: &str, _values: &Values) -> bool {
            false
        }
    }

    #[test]
    fn unregistered_type_builds_nothing() {
        let factory = Factory::new();
        assert!(factory.build("camera", "cam1".into()).is_none());
    }

    #[test]
    fn registered_type_builds_and_names_the_object() {
        let mut factory = Factory::new();
        factory.register("stub", |name| {
            Box::new(Stub {
                base: GraphObjectBase::new(name, "stub", Category::Other),
            })
        });
        let obj = factory.build("stub", "a".into()).unwrap();
        assert_eq!(obj.name(), "a");
        assert!(factory.supports("stub"));
    }
}
