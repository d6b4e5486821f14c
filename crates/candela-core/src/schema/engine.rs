// ── Parse / serialize / diff ──
//
// The generic mapping between wire dictionaries and instances, and the
// diff-against-reference serializer that produces minimal outbound
// payloads.

use serde_json::Value;

use super::{Instance, PropValue, PropertyDescriptor, PropertyKind, Schema, WireObject};

impl Instance {
    /// Materialize an instance from a wire dictionary.
    ///
    /// Unknown wire keys are ignored. Missing keys leave the declared
    /// default (or nothing). Nested properties recurse through their
    /// factory, which sees the partially-parsed parent and may select a
    /// schema based on sibling data.
    pub fn parse(schema: &'static Schema, wire: &WireObject) -> Self {
        let mut instance = Instance::empty(schema);
        for d in schema.properties() {
            let Some(raw) = wire.get(d.key) else {
                continue;
            };
            match d.kind {
                PropertyKind::Scalar => {
                    let value = d.deserialize.map_or_else(|| raw.clone(), |f| f(raw));
                    instance.values_mut().insert(d.name, PropValue::Json(value));
                }
                PropertyKind::Nested(factory) => {
                    if let Value::Object(map) = raw {
                        let nested = Instance::parse(factory(&instance), map);
                        instance.values_mut().insert(d.name, PropValue::Nested(nested));
                    }
                }
                PropertyKind::NestedArray(factory) => {
                    if let Value::Array(items) = raw {
                        let schema = factory(&instance);
                        let parsed: Vec<Instance> = items
                            .iter()
                            .filter_map(Value::as_object)
                            .map(|map| Instance::parse(schema, map))
                            .collect();
                        instance
                            .values_mut()
                            .insert(d.name, PropValue::NestedArray(parsed));
                    }
                }
            }
        }
        instance
    }

    /// Produce a wire dictionary.
    ///
    /// With a reference, only properties that must accompany the change
    /// are included: `never_skip` ones, ones whose required predicate
    /// fires, and ones whose value differs from the reference (deep
    /// equality). Without a reference, everything set and serializable
    /// is included (full-state payload).
    pub fn serialize(&self, reference: Option<&Instance>) -> WireObject {
        let mut out = WireObject::new();

        for d in self.schema.properties() {
            if d.do_not_serialize {
                continue;
            }

            let own = self.get(d.name);
            let reference_value = reference.and_then(|r| r.get(d.name));

            let include = d.never_skip
                || reference.is_none()
                || d.required.is_some_and(|rule| {
                    reference.is_some_and(|r| rule(self, r))
                })
                || own != reference_value;

            if !include {
                continue;
            }
            let Some(own) = own else {
                // Unset and without a default: nothing to emit.
                continue;
            };

            match own {
                PropValue::Json(value) => {
                    let wire = d.serialize.map_or_else(|| value.clone(), |f| f(value));
                    out.insert(d.key.to_owned(), wire);
                }
                PropValue::Nested(nested) => {
                    let nested_reference = reference_value.and_then(|v| match v {
                        PropValue::Nested(inst) => Some(inst),
                        _ => None,
                    });
                    let sub = nested.serialize(nested_reference);
                    // An empty sub-object means "no change" unless some
                    // descendant insists on being present.
                    if !sub.is_empty() || d.never_skip || nested.any_never_skip() {
                        out.insert(d.key.to_owned(), Value::Object(sub));
                    }
                }
                PropValue::NestedArray(items) => {
                    let reference_items = reference_value.and_then(|v| match v {
                        PropValue::NestedArray(r) => Some(r.as_slice()),
                        _ => None,
                    });
                    if let Some(array) = serialize_array(d, items, reference_items) {
                        out.insert(d.key.to_owned(), array);
                    }
                }
            }
        }

        out
    }

    /// Shallow-overwrite the named properties on a fresh deep copy.
    ///
    /// Used to build the desired state from a partial change request
    /// before diffing against the current reference. Panics on a
    /// property name the schema does not declare.
    pub fn merge(&self, changes: &[(&'static str, PropValue)]) -> Instance {
        let mut merged = self.clone();
        for (name, value) in changes {
            merged.set(name, value.clone());
        }
        merged
    }
}

/// Serialize a nested-array property.
///
/// Split mode serializes each element against the positionally
/// corresponding reference element and keeps positional `{}` entries so
/// indices line up on the wire; trailing elements that produced nothing
/// and carry no never-skip field are dropped. Atomic mode serializes
/// every element in full.
fn serialize_array(
    descriptor: &PropertyDescriptor,
    items: &[Instance],
    reference_items: Option<&[Instance]>,
) -> Option<Value> {
    if !descriptor.split_arrays {
        let full: Vec<Value> = items
            .iter()
            .map(|item| Value::Object(item.serialize(None)))
            .collect();
        return Some(Value::Array(full));
    }

    let mut entries = Vec::with_capacity(items.len());
    let mut last_kept = None;

    for (index, item) in items.iter().enumerate() {
        let reference = reference_items.and_then(|r| r.get(index));
        let sub = item.serialize(reference);
        if !sub.is_empty() || item.any_never_skip() {
            last_kept = Some(index);
        }
        entries.push(Value::Object(sub));
    }

    let last = last_kept?;
    entries.truncate(last + 1);
    Some(Value::Array(entries))
}
