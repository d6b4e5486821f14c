// ── Scene (mood) schema ──
//
// Scenes live under a group and hold one light-setting entry per
// member bulb. They are gateway-authored; this client observes them
// and references them by id when activating.

use std::sync::LazyLock;

use serde_json::json;

use crate::schema::{Instance, PropertyDescriptor, Schema, transforms};

/// One per-bulb setting inside a scene.
pub static LIGHT_SETTING: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new("light_setting")
        .prop(PropertyDescriptor::scalar("instance_id", "9003"))
        .prop(
            PropertyDescriptor::scalar("on_off", "5850")
                .default_value(json!(false))
                .transforms(transforms::bool_to_wire, transforms::wire_to_bool),
        )
        .prop(
            PropertyDescriptor::scalar("dimmer", "5851")
                .transforms(transforms::brightness_to_wire, transforms::wire_to_brightness),
        )
        .prop(PropertyDescriptor::scalar("color_hex", "5706"))
});

fn light_setting_schema(_parent: &Instance) -> &'static Schema {
    &LIGHT_SETTING
}

pub static SCENE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new("scene")
        .prop(PropertyDescriptor::scalar("instance_id", "9003"))
        .prop(PropertyDescriptor::scalar("name", "9001"))
        .prop(PropertyDescriptor::scalar("created_at", "9002").read_only())
        .prop(PropertyDescriptor::scalar("scene_index", "9057"))
        .prop(
            PropertyDescriptor::scalar("is_active", "9058")
                .transforms(transforms::bool_to_wire, transforms::wire_to_bool)
                .read_only(),
        )
        .prop(
            PropertyDescriptor::scalar("is_predefined", "9068")
                .default_value(json!(true))
                .transforms(transforms::bool_to_wire, transforms::wire_to_bool)
                .read_only(),
        )
        .prop(PropertyDescriptor::nested_array("light_settings", "15013", light_setting_schema))
});

/// The per-bulb settings of a scene.
pub fn light_settings(scene: &Instance) -> &[Instance] {
    scene.nested_array("light_settings").unwrap_or(&[])
}
