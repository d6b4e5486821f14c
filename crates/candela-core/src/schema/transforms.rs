// ── Wire transform kernels ──
//
// Small total functions plugged into property descriptors. Local
// values are human units (bool, percent, degrees, seconds); wire
// values are the gateway's integer encodings. A value of an unexpected
// shape is passed through unchanged rather than guessed at.

use serde_json::{Value, json};

use crate::convert;

// ── Booleans ─────────────────────────────────────────────────────────

/// Local bool → wire 0/1.
pub fn bool_to_wire(v: &Value) -> Value {
    match v.as_bool() {
        Some(b) => json!(i32::from(b)),
        None => v.clone(),
    }
}

/// Wire 0/1 → local bool.
pub fn wire_to_bool(v: &Value) -> Value {
    match v.as_i64() {
        Some(n) => json!(n != 0),
        None => v.clone(),
    }
}

/// Inverted bool: wire 0 means *enabled*.
pub fn inverted_bool_to_wire(v: &Value) -> Value {
    match v.as_bool() {
        Some(b) => json!(i32::from(!b)),
        None => v.clone(),
    }
}

/// Wire 0-means-enabled → local bool.
pub fn wire_to_inverted_bool(v: &Value) -> Value {
    match v.as_i64() {
        Some(n) => json!(n == 0),
        None => v.clone(),
    }
}

// ── Scaled numeric ranges ────────────────────────────────────────────

fn map_f64(v: &Value, f: impl Fn(f64) -> Value) -> Value {
    match v.as_f64() {
        Some(n) => f(n),
        None => v.clone(),
    }
}

/// Brightness percent → wire 0–254.
pub fn brightness_to_wire(v: &Value) -> Value {
    map_f64(v, |n| json!(convert::percent_to_brightness(n)))
}

/// Wire 0–254 → brightness percent.
pub fn wire_to_brightness(v: &Value) -> Value {
    map_f64(v, |n| json!(convert::brightness_to_percent(n)))
}

/// Color temperature percent → wire mired.
pub fn color_temp_to_wire(v: &Value) -> Value {
    map_f64(v, |n| json!(convert::percent_to_color_temp(n)))
}

/// Wire mired → color temperature percent.
pub fn wire_to_color_temp(v: &Value) -> Value {
    map_f64(v, |n| json!(convert::color_temp_to_percent(n)))
}

/// Fan speed percent → wire 0–50 in steps of 5.
pub fn fan_speed_to_wire(v: &Value) -> Value {
    map_f64(v, |n| json!(convert::percent_to_fan_speed(n)))
}

/// Wire 0–50 → fan speed percent.
pub fn wire_to_fan_speed(v: &Value) -> Value {
    map_f64(v, |n| json!(convert::fan_speed_to_percent(n)))
}

/// Hue degrees → wire 0–65535.
pub fn hue_to_wire(v: &Value) -> Value {
    map_f64(v, |n| json!(convert::hue_to_wire(n)))
}

/// Wire 0–65535 → hue degrees.
pub fn wire_to_hue(v: &Value) -> Value {
    map_f64(v, |n| json!(convert::wire_to_hue(n)))
}

/// Saturation percent → wire 0–65279.
pub fn saturation_to_wire(v: &Value) -> Value {
    map_f64(v, |n| json!(convert::saturation_to_wire(n)))
}

/// Wire 0–65279 → saturation percent.
pub fn wire_to_saturation(v: &Value) -> Value {
    map_f64(v, |n| json!(convert::wire_to_saturation(n)))
}

/// Transition time seconds → wire tenths.
pub fn seconds_to_wire(v: &Value) -> Value {
    map_f64(v, |n| json!(convert::seconds_to_tenths(n)))
}

/// Wire tenths → transition time seconds.
pub fn wire_to_seconds(v: &Value) -> Value {
    map_f64(v, |n| json!(convert::tenths_to_seconds(n)))
}

// ── Structured encodings ─────────────────────────────────────────────

/// Wrapper keys around a group's device-id list.
const DEVICE_IDS_OUTER: &str = "15002";
const DEVICE_IDS_INNER: &str = "9003";

/// Local `[ids]` → wire `{"15002": {"9003": [ids]}}`.
pub fn device_ids_to_wire(v: &Value) -> Value {
    match v {
        Value::Array(_) => json!({ DEVICE_IDS_OUTER: { DEVICE_IDS_INNER: v } }),
        _ => v.clone(),
    }
}

/// Wire `{"15002": {"9003": [ids]}}` → local `[ids]`.
pub fn wire_to_device_ids(v: &Value) -> Value {
    v.get(DEVICE_IDS_OUTER)
        .and_then(|inner| inner.get(DEVICE_IDS_INNER))
        .cloned()
        .unwrap_or_else(|| v.clone())
}

/// Local `{key: value}` map → wire `["key=value", ...]`.
pub fn details_to_wire(v: &Value) -> Value {
    match v.as_object() {
        Some(map) => Value::Array(
            map.iter()
                .map(|(k, val)| {
                    let text = val.as_str().map_or_else(|| val.to_string(), str::to_owned);
                    json!(format!("{k}={text}"))
                })
                .collect(),
        ),
        None => v.clone(),
    }
}

/// Wire `["key=value", ...]` → local flat string map. Entries without
/// a `=` are kept with an empty value.
pub fn wire_to_details(v: &Value) -> Value {
    match v.as_array() {
        Some(items) => {
            let mut map = serde_json::Map::new();
            for item in items {
                let Some(text) = item.as_str() else { continue };
                let (key, value) = text.split_once('=').unwrap_or((text, ""));
                map.insert(key.to_owned(), json!(value));
            }
            Value::Object(map)
        }
        None => v.clone(),
    }
}
