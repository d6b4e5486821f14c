// ── Notification schema ──
//
// The gateway pushes notification records whose detail payload is an
// array of `"key=value"` strings; locally they are a flat string map.

use std::sync::LazyLock;

use serde_json::Value;

use crate::schema::{Instance, PropertyDescriptor, Schema, transforms};

/// Notification event codes under key 9015.
pub mod event {
    pub const NEW_FIRMWARE_AVAILABLE: i64 = 1001;
    pub const GATEWAY_REBOOT_NOTIFICATION: i64 = 1003;
    pub const LOSS_OF_INTERNET_CONNECTIVITY: i64 = 5001;
}

pub static NOTIFICATION: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new("notification")
        .prop(PropertyDescriptor::scalar("created_at", "9002").read_only())
        .prop(PropertyDescriptor::scalar("event", "9015"))
        .prop(
            PropertyDescriptor::scalar("details", "9017")
                .transforms(transforms::details_to_wire, transforms::wire_to_details),
        )
        .prop(
            PropertyDescriptor::scalar("is_acknowledged", "9014")
                .transforms(transforms::bool_to_wire, transforms::wire_to_bool),
        )
});

/// One detail value by key, if present.
pub fn detail<'a>(notification: &'a Instance, key: &str) -> Option<&'a str> {
    notification
        .json("details")?
        .get(key)
        .and_then(Value::as_str)
}
