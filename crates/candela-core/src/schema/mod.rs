// ── Schema-driven serialization ──
//
// The gateway speaks an opaque, numerically-keyed wire dictionary per
// resource. This module maps those dictionaries to and from typed
// local instances through static schema tables: one ordered set of
// property descriptors per model type, built once and shared.

mod engine;
pub mod proxy;
pub mod repair;
pub mod transforms;

use std::collections::BTreeMap;
use std::sync::Weak;

use serde_json::Value;

use crate::ops::OperationProvider;

/// Wire dictionary shape: short numeric-looking string keys.
pub type WireObject = serde_json::Map<String, Value>;

/// A value transform between local and wire representation.
pub type TransformFn = fn(&Value) -> Value;

/// Cross-field validity rule: given the mutated instance and the diff
/// reference, decide whether this property must accompany the change
/// even if it did not itself change.
pub type RequiredFn = fn(&Instance, &Instance) -> bool;

/// Selects the schema for a nested property. Receives the parent
/// instance with all earlier descriptors already parsed, so the choice
/// may depend on sibling data (e.g. a model number).
pub type FactoryFn = fn(&Instance) -> &'static Schema;

/// What a property contains.
#[derive(Clone, Copy)]
pub enum PropertyKind {
    Scalar,
    Nested(FactoryFn),
    NestedArray(FactoryFn),
}

impl std::fmt::Debug for PropertyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar => f.write_str("Scalar"),
            Self::Nested(_) => f.write_str("Nested"),
            Self::NestedArray(_) => f.write_str("NestedArray"),
        }
    }
}

/// One property of a schema.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    /// Local property name.
    pub name: &'static str,
    /// Stable wire key, unique within the schema.
    pub key: &'static str,
    /// Value assumed when the wire omits the key. Properties without a
    /// default are left unset.
    pub default: Option<Value>,
    /// Local → wire transform. A property without one is copied verbatim.
    pub serialize: Option<TransformFn>,
    /// Wire → local transform.
    pub deserialize: Option<TransformFn>,
    /// Always include in serialized output, changed or not.
    pub never_skip: bool,
    /// Serialize nested array elements one by one against the
    /// positionally-corresponding reference element.
    pub split_arrays: bool,
    /// Never include in serialized output (gateway-reported only).
    pub do_not_serialize: bool,
    /// Cross-field inclusion rule.
    pub required: Option<RequiredFn>,
    pub kind: PropertyKind,
}

impl PropertyDescriptor {
    pub fn scalar(name: &'static str, key: &'static str) -> Self {
        Self {
            name,
            key,
            default: None,
            serialize: None,
            deserialize: None,
            never_skip: false,
            split_arrays: true,
            do_not_serialize: false,
            required: None,
            kind: PropertyKind::Scalar,
        }
    }

    pub fn nested(name: &'static str, key: &'static str, factory: FactoryFn) -> Self {
        Self {
            kind: PropertyKind::Nested(factory),
            ..Self::scalar(name, key)
        }
    }

    pub fn nested_array(name: &'static str, key: &'static str, factory: FactoryFn) -> Self {
        Self {
            kind: PropertyKind::NestedArray(factory),
            ..Self::scalar(name, key)
        }
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Set both transforms at once (the usual case).
    pub fn transforms(mut self, serialize: TransformFn, deserialize: TransformFn) -> Self {
        self.serialize = Some(serialize);
        self.deserialize = Some(deserialize);
        self
    }

    pub fn never_skip(mut self) -> Self {
        self.never_skip = true;
        self
    }

    /// Serialize the whole array atomically instead of per element.
    pub fn atomic(mut self) -> Self {
        self.split_arrays = false;
        self
    }

    /// Gateway-reported only; never part of outbound payloads.
    pub fn read_only(mut self) -> Self {
        self.do_not_serialize = true;
        self
    }

    pub fn required_when(mut self, rule: RequiredFn) -> Self {
        self.required = Some(rule);
        self
    }
}

/// An ordered set of property descriptors describing one model type.
///
/// Identity is pointer identity: every model type owns exactly one
/// static `Schema`, and two instances share a type iff they share the
/// schema reference.
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    properties: Vec<PropertyDescriptor>,
}

impl Schema {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            properties: Vec::new(),
        }
    }

    /// Add a property. Panics on a duplicate name or wire key; schemas
    /// are built once at startup, so this is a construction-time check.
    pub fn prop(mut self, descriptor: PropertyDescriptor) -> Self {
        assert!(
            !self.properties.iter().any(|p| p.name == descriptor.name),
            "schema {}: duplicate property name {}",
            self.name,
            descriptor.name
        );
        assert!(
            !self.properties.iter().any(|p| p.key == descriptor.key),
            "schema {}: duplicate wire key {}",
            self.name,
            descriptor.key
        );
        self.properties.push(descriptor);
        self
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn descriptor(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Whether any own property is `never_skip` (one level; nested
    /// schemas are consulted through their instances).
    pub(crate) fn has_never_skip(&self) -> bool {
        self.properties.iter().any(|p| p.never_skip)
    }
}

// ── Values and instances ─────────────────────────────────────────────

/// The value of one property on an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Json(Value),
    Nested(Instance),
    NestedArray(Vec<Instance>),
}

impl PropValue {
    pub fn json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// A typed value conforming to a schema.
///
/// Carries an optional weak back-reference to the operation provider
/// that produced it; the reference is never serialized and only used
/// by the convenience operations in [`crate::ops`].
#[derive(Debug, Clone)]
pub struct Instance {
    schema: &'static Schema,
    values: BTreeMap<&'static str, PropValue>,
    provider: Option<Weak<dyn OperationProvider>>,
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.schema, other.schema) && self.values == other.values
    }
}

impl Instance {
    /// A fresh instance with declared defaults filled in and everything
    /// else unset.
    pub fn empty(schema: &'static Schema) -> Self {
        let mut values = BTreeMap::new();
        for d in schema.properties() {
            if let Some(default) = &d.default {
                values.insert(d.name, PropValue::Json(default.clone()));
            }
        }
        Self {
            schema,
            values,
            provider: None,
        }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.values.get(name)
    }

    pub fn json(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(PropValue::json)
    }

    pub fn bool_of(&self, name: &str) -> Option<bool> {
        self.json(name).and_then(Value::as_bool)
    }

    pub fn f64_of(&self, name: &str) -> Option<f64> {
        self.json(name).and_then(Value::as_f64)
    }

    pub fn u32_of(&self, name: &str) -> Option<u32> {
        self.json(name)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    pub fn str_of(&self, name: &str) -> Option<&str> {
        self.json(name).and_then(Value::as_str)
    }

    pub fn nested(&self, name: &str) -> Option<&Instance> {
        match self.get(name)? {
            PropValue::Nested(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn nested_array(&self, name: &str) -> Option<&[Instance]> {
        match self.get(name)? {
            PropValue::NestedArray(items) => Some(items),
            _ => None,
        }
    }

    /// Set a property. Panics if the schema does not declare `name`;
    /// writing an undeclared property is a programming error.
    pub fn set(&mut self, name: &'static str, value: PropValue) {
        assert!(
            self.schema.descriptor(name).is_some(),
            "schema {} has no property {name}",
            self.schema.name
        );
        self.values.insert(name, value);
    }

    pub fn set_json(&mut self, name: &'static str, value: Value) {
        self.set(name, PropValue::Json(value));
    }

    pub(crate) fn values_mut(&mut self) -> &mut BTreeMap<&'static str, PropValue> {
        &mut self.values
    }

    /// Attach the operation-provider back-reference. Set after
    /// construction by the reconciliation engine, never serialized.
    pub fn attach_provider(&mut self, provider: Weak<dyn OperationProvider>) {
        self.provider = Some(provider);
    }

    pub fn provider(&self) -> Option<Weak<dyn OperationProvider>> {
        self.provider.clone()
    }

    /// Whether any property of this instance's schema, or of any nested
    /// instance, is `never_skip`.
    pub(crate) fn any_never_skip(&self) -> bool {
        if self.schema.has_never_skip() {
            return true;
        }
        self.values.values().any(|v| match v {
            PropValue::Json(_) => false,
            PropValue::Nested(inst) => inst.any_never_skip(),
            PropValue::NestedArray(items) => items.iter().any(Instance::any_never_skip),
        })
    }
}
