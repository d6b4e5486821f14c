// ── Firmware quirk repairs ──
//
// Some gateway firmware revisions misreport devices. Repairs run right
// after parsing an inbound dictionary, before any diffing, so the rest
// of the crate only ever sees the corrected shape. A repair may also
// need to re-add a field to outbound payloads that the diff dropped
// because the repair itself supplied it as a default.

use serde_json::{Value, json};

use crate::model::device::{self, device_type};
use crate::schema::{Instance, PropValue, WireObject};

/// A targeted correction for one known firmware misbehavior.
pub struct QuirkRepair {
    pub name: &'static str,
    /// Whether the parsed instance shows the quirk's signature.
    pub matches: fn(&Instance) -> bool,
    /// Rewrite the instance into the shape the firmware should have
    /// reported.
    pub apply: fn(&mut Instance),
    /// Re-inject fields into an outbound payload that the diff omitted
    /// because the repair had supplied them.
    pub restore: fn(&Instance, &mut WireObject),
}

impl std::fmt::Debug for QuirkRepair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuirkRepair").field("name", &self.name).finish()
    }
}

/// Gateway 1.4.x reports some bulbs with the remote-control type code
/// and without a transition time in their light entries.
static BULB_REPORTED_AS_REMOTE: QuirkRepair = QuirkRepair {
    name: "bulb-reported-as-remote",
    matches: |device| {
        device::device_type_of(device) == Some(device_type::REMOTE)
            && device::model_number(device)
                .is_some_and(|model| model.to_ascii_lowercase().contains("bulb"))
            && !device::lights(device).is_empty()
    },
    apply: |device| {
        device.set_json("device_type", json!(device_type::LAMP));
        if let Some(PropValue::NestedArray(lights)) = device.values_mut().get_mut("light_list") {
            for light in lights {
                if light.json("transition_time").is_none() {
                    light.set_json("transition_time", json!(0.5));
                }
            }
        }
    },
    restore: |_device, payload| {
        // The repaired transition default is indistinguishable from an
        // unchanged value, so the diff drops it; the firmware however
        // ignores light updates without one.
        let Some(Value::Array(lights)) = payload.get_mut("3311") else {
            return;
        };
        for entry in lights {
            if let Value::Object(map) = entry {
                map.entry("5712").or_insert_with(|| json!(5));
            }
        }
    },
};

static KNOWN_REPAIRS: &[&QuirkRepair] = &[&BULB_REPORTED_AS_REMOTE];

/// Apply every matching repair to a freshly parsed device. Returns the
/// names of the repairs that matched, for the caller to log and to
/// replay on outbound payloads.
pub fn repair_known_quirks(device: &mut Instance) -> Vec<&'static str> {
    let mut applied = Vec::new();
    for repair in KNOWN_REPAIRS {
        if (repair.matches)(device) {
            (repair.apply)(device);
            applied.push(repair.name);
        }
    }
    applied
}

/// Replay the restore half of every repair that matched `device` at
/// parse time onto an outbound payload.
pub fn restore_repaired_defaults(device: &Instance, applied: &[&'static str], payload: &mut WireObject) {
    for repair in KNOWN_REPAIRS {
        if applied.contains(&repair.name) {
            (repair.restore)(device, payload);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::device::DEVICE;

    fn parse(wire: serde_json::Value) -> Instance {
        match wire {
            serde_json::Value::Object(map) => Instance::parse(&DEVICE, &map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn misreported_bulb_gets_its_type_fixed() {
        let mut device = parse(json!({
            "9003": 65537,
            "5750": 0,
            "3": { "1": "TRADFRI bulb GU10 WS 400lm" },
            "3311": [{ "5850": 1 }],
        }));
        let applied = repair_known_quirks(&mut device);
        assert_eq!(applied, vec!["bulb-reported-as-remote"]);
        assert_eq!(device::device_type_of(&device), Some(device_type::LAMP));
        let light = &device::lights(&device)[0];
        assert_eq!(light.f64_of("transition_time"), Some(0.5));
    }

    #[test]
    fn actual_remote_is_left_alone() {
        let mut device = parse(json!({
            "9003": 65538,
            "5750": 0,
            "3": { "1": "TRADFRI remote control" },
        }));
        assert!(repair_known_quirks(&mut device).is_empty());
        assert_eq!(device::device_type_of(&device), Some(device_type::REMOTE));
    }

    #[test]
    fn restore_reinjects_transition_time() {
        let mut device = parse(json!({
            "9003": 65537,
            "5750": 0,
            "3": { "1": "TRADFRI bulb GU10 WS 400lm" },
            "3311": [{ "5850": 1 }],
        }));
        let applied = repair_known_quirks(&mut device);

        let mut payload = match json!({ "3311": [{ "5850": 0 }] }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        restore_repaired_defaults(&device, &applied, &mut payload);
        assert_eq!(payload, match json!({ "3311": [{ "5850": 0, "5712": 5 }] }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        });
    }

    #[test]
    fn restore_without_applied_repairs_is_a_no_op() {
        let device = parse(json!({ "9003": 1, "5750": 2 }));
        let mut payload = WireObject::new();
        restore_repaired_defaults(&device, &[], &mut payload);
        assert!(payload.is_empty());
    }
}
