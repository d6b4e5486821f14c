// ── Group schema ──
//
// Groups carry their own on/off and brightness, the id of the active
// scene, and a device-id membership list nested two levels deep on the
// wire.

use std::sync::LazyLock;

use serde_json::json;

use crate::schema::{Instance, PropertyDescriptor, Schema, transforms};

fn scene_id_changed(own: &Instance, reference: &Instance) -> bool {
    own.get("scene_id") != reference.get("scene_id")
}

fn dimmer_changed(own: &Instance, reference: &Instance) -> bool {
    own.get("dimmer") != reference.get("dimmer")
}

pub static GROUP: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new("group")
        .prop(PropertyDescriptor::scalar("instance_id", "9003"))
        .prop(PropertyDescriptor::scalar("name", "9001"))
        .prop(PropertyDescriptor::scalar("created_at", "9002").read_only())
        .prop(
            PropertyDescriptor::scalar("on_off", "5850")
                .default_value(json!(false))
                .transforms(transforms::bool_to_wire, transforms::wire_to_bool)
                // Activating a scene without an explicit on/off flag
                // leaves the group in whatever state it was; the
                // gateway wants the flag on every scene change.
                .required_when(scene_id_changed),
        )
        .prop(
            PropertyDescriptor::scalar("dimmer", "5851")
                .transforms(transforms::brightness_to_wire, transforms::wire_to_brightness),
        )
        .prop(
            PropertyDescriptor::scalar("transition_time", "5712")
                .default_value(json!(0.5))
                .transforms(transforms::seconds_to_wire, transforms::wire_to_seconds)
                .required_when(dimmer_changed),
        )
        .prop(PropertyDescriptor::scalar("scene_id", "9039"))
        .prop(
            PropertyDescriptor::scalar("device_ids", "9018")
                .transforms(transforms::device_ids_to_wire, transforms::wire_to_device_ids),
        )
});

/// Ids of the devices belonging to a group.
pub fn device_ids(group: &Instance) -> Vec<u32> {
    group
        .json("device_ids")
        .and_then(serde_json::Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(serde_json::Value::as_u64)
                .filter_map(|id| u32::try_from(id).ok())
                .collect()
        })
        .unwrap_or_default()
}
