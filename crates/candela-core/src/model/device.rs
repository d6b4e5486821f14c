// ── Device (accessory) schema ──
//
// A device payload carries identification, a read-only info block, and
// a list of light entries. The light schema is picked per device by a
// factory consulting the already-parsed model number, because the
// color capabilities differ per product line.

use std::sync::LazyLock;

use serde_json::json;

use crate::schema::{Instance, PropertyDescriptor, Schema, transforms};

/// Device type codes the gateway reports under key 5750.
pub mod device_type {
    pub const REMOTE: i64 = 0;
    pub const SLAVE_REMOTE: i64 = 1;
    pub const LAMP: i64 = 2;
    pub const PLUG: i64 = 3;
    pub const SENSOR: i64 = 4;
    pub const REPEATER: i64 = 6;
    pub const BLIND: i64 = 7;
}

// ── Color spectrum feature detection ─────────────────────────────────

/// What color control a bulb offers, derived from its model number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spectrum {
    /// On/off and brightness only.
    None,
    /// Tunable white (color temperature).
    White,
    /// Full color (hue/saturation and CIE xy).
    Rgb,
}

/// Resolve the spectrum from a model-number string. `CWS` marks full
/// color, `WS` tunable white; everything else is brightness-only.
pub fn spectrum_for_model(model: &str) -> Spectrum {
    if model.contains("CWS") {
        Spectrum::Rgb
    } else if model.contains("WS") {
        Spectrum::White
    } else {
        Spectrum::None
    }
}

/// Spectrum of a parsed device instance.
pub fn spectrum(device: &Instance) -> Spectrum {
    device
        .nested("device_info")
        .and_then(|info| info.str_of("model_number"))
        .map_or(Spectrum::None, spectrum_for_model)
}

// ── Required predicates ──────────────────────────────────────────────

fn dimmer_changed(own: &Instance, reference: &Instance) -> bool {
    own.get("dimmer") != reference.get("dimmer")
}

fn hue_changed(own: &Instance, reference: &Instance) -> bool {
    own.get("hue") != reference.get("hue")
}

fn saturation_changed(own: &Instance, reference: &Instance) -> bool {
    own.get("saturation") != reference.get("saturation")
}

fn color_x_changed(own: &Instance, reference: &Instance) -> bool {
    own.get("color_x") != reference.get("color_x")
}

// ── Schemas ──────────────────────────────────────────────────────────

fn base_light(name: &'static str) -> Schema {
    Schema::new(name)
        .prop(
            PropertyDescriptor::scalar("on_off", "5850")
                .default_value(json!(false))
                .transforms(transforms::bool_to_wire, transforms::wire_to_bool),
        )
        .prop(
            PropertyDescriptor::scalar("dimmer", "5851")
                .transforms(transforms::brightness_to_wire, transforms::wire_to_brightness),
        )
        .prop(
            PropertyDescriptor::scalar("transition_time", "5712")
                .default_value(json!(0.5))
                .transforms(transforms::seconds_to_wire, transforms::wire_to_seconds)
                // The gateway rejects a bare dimmer change; the ramp
                // duration must ride along even when unchanged.
                .required_when(dimmer_changed),
        )
}

/// Brightness-only light.
pub static LIGHT: LazyLock<Schema> = LazyLock::new(|| base_light("light"));

/// Tunable-white light.
pub static LIGHT_WS: LazyLock<Schema> = LazyLock::new(|| {
    base_light("light.ws")
        .prop(PropertyDescriptor::scalar("color_hex", "5706").read_only())
        .prop(
            PropertyDescriptor::scalar("color_temperature", "5711")
                .transforms(transforms::color_temp_to_wire, transforms::wire_to_color_temp),
        )
});

/// Full-color light.
pub static LIGHT_RGB: LazyLock<Schema> = LazyLock::new(|| {
    base_light("light.rgb")
        .prop(PropertyDescriptor::scalar("color_hex", "5706").read_only())
        .prop(
            PropertyDescriptor::scalar("hue", "5707")
                .transforms(transforms::hue_to_wire, transforms::wire_to_hue)
                .required_when(saturation_changed),
        )
        .prop(
            PropertyDescriptor::scalar("saturation", "5708")
                .transforms(transforms::saturation_to_wire, transforms::wire_to_saturation)
                .required_when(hue_changed),
        )
        .prop(PropertyDescriptor::scalar("color_x", "5709"))
        .prop(
            PropertyDescriptor::scalar("color_y", "5710")
                // Conservatively coupled: the gateway has only ever
                // been observed receiving x and y together.
                .required_when(color_x_changed),
        )
});

/// Read-only manufacturer info block under key 3.
pub static DEVICE_INFO: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new("device_info")
        .prop(PropertyDescriptor::scalar("manufacturer", "0"))
        .prop(PropertyDescriptor::scalar("model_number", "1"))
        .prop(PropertyDescriptor::scalar("serial", "2"))
        .prop(PropertyDescriptor::scalar("firmware_version", "3"))
        .prop(PropertyDescriptor::scalar("power_source", "6").default_value(json!(0)))
        .prop(PropertyDescriptor::scalar("battery", "9"))
});

fn device_info_schema(_parent: &Instance) -> &'static Schema {
    &DEVICE_INFO
}

/// Pick the light schema for a device from its parsed model number.
fn light_schema(parent: &Instance) -> &'static Schema {
    match spectrum(parent) {
        Spectrum::Rgb => &LIGHT_RGB,
        Spectrum::White => &LIGHT_WS,
        Spectrum::None => &LIGHT,
    }
}

/// Top-level device (accessory) schema.
pub static DEVICE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new("device")
        .prop(PropertyDescriptor::scalar("instance_id", "9003"))
        .prop(PropertyDescriptor::scalar("name", "9001"))
        .prop(PropertyDescriptor::scalar("created_at", "9002").read_only())
        .prop(PropertyDescriptor::scalar("device_type", "5750").default_value(json!(0)))
        .prop(
            PropertyDescriptor::scalar("alive", "9019")
                .transforms(transforms::bool_to_wire, transforms::wire_to_bool)
                .read_only(),
        )
        .prop(PropertyDescriptor::scalar("last_seen", "9020").read_only())
        .prop(
            // Wire 0 means enabled; the one inverted flag in the tree.
            PropertyDescriptor::scalar("auto_update_enabled", "9054").transforms(
                transforms::inverted_bool_to_wire,
                transforms::wire_to_inverted_bool,
            ),
        )
        // device_info must precede light_list: the light factory reads
        // the model number parsed from it.
        .prop(PropertyDescriptor::nested("device_info", "3", device_info_schema).read_only())
        .prop(PropertyDescriptor::nested_array("light_list", "3311", light_schema))
});

// ── Accessors ────────────────────────────────────────────────────────

pub fn device_type_of(device: &Instance) -> Option<i64> {
    device.json("device_type").and_then(serde_json::Value::as_i64)
}

pub fn model_number(device: &Instance) -> Option<&str> {
    device.nested("device_info")?.str_of("model_number")
}

pub fn lights(device: &Instance) -> &[Instance] {
    device.nested_array("light_list").unwrap_or(&[])
}
