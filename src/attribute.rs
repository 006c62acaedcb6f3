//! Attribute runtime: typed, named slots on a [`crate::graph_object::GraphObject`].
//!
//! Reflection over trait objects doesn't fit Rust's ownership model the way
//! it would a dynamic language: there is no closure that can both live
//! inside `self` and mutate `self`. Instead, each concrete object type
//! exposes a `'static` table of [`AttributeDescriptor`]s (name, type
//! signature, docs, flags) used purely for validation/introspection, and
//! implements `set_attribute`/`get_attribute` as ordinary `match`-dispatched
//! methods. [`apply_set`]/[`apply_get`]/[`describe`] validate against the
//! descriptor table and then delegate to the object.

use crate::graph_object::GraphObject;
use crate::value::{Value, Values};

/// Per-argument kind code used in a [`TypeSignature`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Any numeric value (`n`).
    Numeric,
    /// A real (floating point) value (`r`).
    Real,
    /// An integer value (`i`).
    Integer,
    /// A boolean value (`b`).
    Bool,
    /// A string value (`s`).
    String,
}

impl ArgKind {
    /// Whether `value`'s tagged kind satisfies this argument kind.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ArgKind::Numeric => value.is_numeric(),
            ArgKind::Real => matches!(value, Value::Real(_) | Value::Integer(_)),
            ArgKind::Integer => matches!(value, Value::Integer(_)),
            ArgKind::Bool => matches!(value, Value::Bool(_)),
            ArgKind::String => matches!(value, Value::String(_)),
        }
    }
}

/// A per-argument kind signature. Arity is `kinds.len()`; missing or extra
/// arguments are rejected. Variadic signatures accept any arity and any
/// kinds — used by attributes whose payload is a flattened list (a LUT, a
/// texture-name list, control-point pairs) whose length only the setter
/// can judge.
#[derive(Debug, Clone)]
pub struct TypeSignature {
    /// Expected kind for each positional argument.
    pub kinds: Vec<ArgKind>,
    /// Accept any arity and kinds; `kinds` is ignored.
    pub variadic: bool,
}

impl TypeSignature {
    /// Builds a fixed-arity signature from a list of kinds.
    #[must_use]
    pub fn new(kinds: Vec<ArgKind>) -> Self {
        Self { kinds, variadic: false }
    }

    /// Builds a signature that accepts any argument list.
    #[must_use]
    pub fn any() -> Self {
        Self { kinds: Vec::new(), variadic: true }
    }

    /// Validates arity and per-argument kinds against `values`.
    pub fn validate(&self, values: &[Value]) -> Result<(), String> {
        if self.variadic {
            return Ok(());
        }
        if values.len() != self.kinds.len() {
            return Err(format!(
                "expected {} argument(s), got {}",
                self.kinds.len(),
                values.len()
            ));
        }
        for (i, (kind, value)) in self.kinds.iter().zip(values.iter()).enumerate() {
            if !kind.accepts(value) {
                return Err(format!("argument {i} has the wrong kind"));
            }
        }
        Ok(())
    }
}

/// Whether an attribute's value is pushed eagerly or only on request, and
/// whether the setter blocks the caller until the peer has acknowledged it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Replicated opportunistically; the setter does not block.
    #[default]
    Auto,
    /// The setter blocks the sender until the peer acknowledges the set.
    ForceSync,
}

/// Static description of one attribute, registered once per concrete type.
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    /// Attribute name, unique within the owning object.
    pub name: &'static str,
    /// Argument-kind signature validated before the setter runs.
    pub signature: TypeSignature,
    /// Human-readable documentation string (`describe`).
    pub doc: &'static str,
    /// Replication policy.
    pub sync_policy: SyncPolicy,
    /// Whether this attribute is written out on configuration save.
    pub savable: bool,
    /// Distant-only attributes may only be pushed World → Scene, never read
    /// back or set locally by the Scene.
    pub distant_only: bool,
    /// Whether this attribute has a getter distinct from the stored-Values
    /// fallback (purely informational; `get_attribute` always decides).
    pub has_getter: bool,
}

/// Builds an [`AttributeDescriptor`]. Object types build their descriptor
/// table once, as a plain `Vec`, the first time `attribute_descriptors` is
/// called (see `GraphObjectBase::descriptors_once` in `graph_object.rs`).
#[must_use]
pub fn descriptor(
    name: &'static str,
    kinds: Vec<ArgKind>,
    doc: &'static str,
    sync_policy: SyncPolicy,
    savable: bool,
    distant_only: bool,
    has_getter: bool,
) -> AttributeDescriptor {
    AttributeDescriptor {
        name,
        signature: TypeSignature::new(kinds),
        doc,
        sync_policy,
        savable,
        distant_only,
        has_getter,
    }
}

/// Builds an [`AttributeDescriptor`] whose setter accepts any argument
/// list, for attributes carrying flattened variable-length payloads.
#[must_use]
pub fn descriptor_variadic(
    name: &'static str,
    doc: &'static str,
    sync_policy: SyncPolicy,
    savable: bool,
    distant_only: bool,
    has_getter: bool,
) -> AttributeDescriptor {
    AttributeDescriptor {
        name,
        signature: TypeSignature::any(),
        doc,
        sync_policy,
        savable,
        distant_only,
        has_getter,
    }
}

/// Finds the descriptor for `attr` among `descriptors`, if any.
#[must_use]
pub fn find<'a>(descriptors: &'a [AttributeDescriptor], attr: &str) -> Option<&'a AttributeDescriptor> {
    descriptors.iter().find(|d| d.name == attr)
}

/// The attribute runtime's `set` operation: validate arity/kind against the
/// object's registered signature, invoke the setter, and on success record
/// the last-changed timestamp and cache `values` for the default getter.
///
/// Returns `false` (logging a warning) for an unknown attribute, a
/// signature mismatch, or a setter that itself returned `false`.
pub fn apply_set(obj: &mut dyn GraphObject, attr: &str, values: &Values) -> bool {
    let Some(descriptor) = find(obj.attribute_descriptors(), attr).cloned() else {
        log::warn!("attribute error on {}.{attr}: unknown attribute", obj.name());
        return false;
    };
    if let Err(reason) = descriptor.signature.validate(values) {
        log::warn!("attribute error on {}.{attr}: {reason}", obj.name());
        return false;
    }
    if !obj.set_attribute(attr, values) {
        log::warn!("attribute error on {}.{attr}: setter rejected the value", obj.name());
        return false;
    }
    obj.base_mut().record_set(attr, values.clone());
    true
}

/// The attribute runtime's `get` operation: invoke the getter if the object
/// provides one, otherwise return the cached last-set `Values`, or an empty
/// sequence if the attribute was never set nor has a getter.
#[must_use]
pub fn apply_get(obj: &dyn GraphObject, attr: &str) -> Values {
    if find(obj.attribute_descriptors(), attr).is_none() {
        return Values::new();
    }
    if let Some(values) = obj.get_attribute(attr) {
        return values;
    }
    obj.base().cached(attr).unwrap_or_default()
}

/// The attribute runtime's `describe` operation.
#[must_use]
pub fn describe(obj: &dyn GraphObject, attr: &str) -> String {
    find(obj.attribute_descriptors(), attr)
        .map(|d| d.doc.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn signature_rejects_wrong_arity() {
        let sig = TypeSignature::new(vec![ArgKind::Integer, ArgKind::Integer]);
        assert!(sig.validate(&[Value::Integer(1)]).is_err());
        assert!(sig.validate(&[Value::Integer(1), Value::Integer(2)]).is_ok());
    }

    #[test]
    fn numeric_kind_accepts_both_integer_and_real() {
        assert!(ArgKind::Numeric.accepts(&Value::Integer(1)));
        assert!(ArgKind::Numeric.accepts(&Value::Real(1.0)));
        assert!(!ArgKind::Numeric.accepts(&Value::String("x".into())));
    }

    #[test]
    fn string_kind_rejects_numeric() {
        assert!(!ArgKind::String.accepts(&Value::Integer(1)));
        assert!(ArgKind::String.accepts(&Value::String("x".into())));
    }

    #[test]
    fn variadic_signature_accepts_any_arity_and_kinds() {
        let sig = TypeSignature::any();
        assert!(sig.validate(&[]).is_ok());
        assert!(sig.validate(&[Value::Real(1.0), Value::String("x".into()), Value::Sequence(vec![])]).is_ok());
    }
}
