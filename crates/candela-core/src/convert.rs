// ── Color and unit conversion kernels ──
//
// Pure functions used by the serialization transforms and the virtual
// color properties. Local values are human units (percent, degrees,
// fractional seconds); wire values are the gateway's native integer
// ranges.

/// Wire range of brightness-like properties.
pub const MAX_BRIGHTNESS: f64 = 254.0;
/// Wire range of the hue property.
pub const MAX_HUE: f64 = 65_535.0;
/// Wire range of the saturation property.
pub const MAX_SATURATION: f64 = 65_279.0;
/// Wire range of the CIE x/y coordinates.
pub const MAX_CIE: f64 = 65_535.0;
/// Wire range of the fan-speed property.
pub const MAX_FAN_SPEED: f64 = 50.0;
/// Color temperature wire range, cold to warm, in mired.
pub const COLOR_TEMP_RANGE: (f64, f64) = (250.0, 454.0);

// ── Range scaling ────────────────────────────────────────────────────

fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// Map a 0–100 percentage onto `lo..=hi`, clamping and rounding.
pub fn percent_to_range(percent: f64, lo: f64, hi: f64) -> i64 {
    let percent = clamp(percent, 0.0, 100.0);
    (lo + percent / 100.0 * (hi - lo)).round() as i64
}

/// Inverse of [`percent_to_range`], rounded to whole percent.
pub fn range_to_percent(value: f64, lo: f64, hi: f64) -> f64 {
    let value = clamp(value, lo, hi);
    ((value - lo) / (hi - lo) * 100.0).round()
}

/// Brightness percent → wire value 0–254.
pub fn percent_to_brightness(percent: f64) -> i64 {
    percent_to_range(percent, 0.0, MAX_BRIGHTNESS)
}

/// Wire brightness 0–254 → whole percent.
pub fn brightness_to_percent(value: f64) -> f64 {
    range_to_percent(value, 0.0, MAX_BRIGHTNESS)
}

/// Color temperature percent (0 = cold, 100 = warm) → mired.
pub fn percent_to_color_temp(percent: f64) -> i64 {
    percent_to_range(percent, COLOR_TEMP_RANGE.0, COLOR_TEMP_RANGE.1)
}

/// Mired → color temperature percent.
pub fn color_temp_to_percent(value: f64) -> f64 {
    range_to_percent(value, COLOR_TEMP_RANGE.0, COLOR_TEMP_RANGE.1)
}

/// Fan speed percent → wire value 0–50, rounded to the nearest
/// multiple of 5 (the gateway ignores finer steps).
pub fn percent_to_fan_speed(percent: f64) -> i64 {
    let raw = percent_to_range(percent, 0.0, MAX_FAN_SPEED);
    ((raw as f64 / 5.0).round() as i64) * 5
}

/// Wire fan speed 0–50 → whole percent.
pub fn fan_speed_to_percent(value: f64) -> f64 {
    range_to_percent(value, 0.0, MAX_FAN_SPEED)
}

/// Hue in degrees (0–360) → wire value 0–65535.
pub fn hue_to_wire(degrees: f64) -> i64 {
    (clamp(degrees, 0.0, 360.0) / 360.0 * MAX_HUE).round() as i64
}

/// Wire hue 0–65535 → degrees, one decimal of precision.
pub fn wire_to_hue(value: f64) -> f64 {
    (clamp(value, 0.0, MAX_HUE) / MAX_HUE * 3600.0).round() / 10.0
}

/// Saturation percent → wire value 0–65279.
pub fn saturation_to_wire(percent: f64) -> i64 {
    (clamp(percent, 0.0, 100.0) / 100.0 * MAX_SATURATION).round() as i64
}

/// Wire saturation 0–65279 → percent, one decimal of precision.
pub fn wire_to_saturation(value: f64) -> f64 {
    (clamp(value, 0.0, MAX_SATURATION) / MAX_SATURATION * 1000.0).round() / 10.0
}

/// Transition time in fractional seconds → wire tenths-of-a-second.
pub fn seconds_to_tenths(seconds: f64) -> i64 {
    (seconds.max(0.0) * 10.0).round() as i64
}

/// Wire tenths-of-a-second → fractional seconds.
pub fn tenths_to_seconds(tenths: f64) -> f64 {
    tenths.max(0.0) / 10.0
}

// ── Color spaces ─────────────────────────────────────────────────────

/// Parse a 6-digit hex color string (no `#` prefix, case-insensitive).
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

/// Format an RGB triple as a lowercase 6-digit hex string.
pub fn rgb_to_hex(r: u8, g: u8, b: u8) -> String {
    format!("{r:02x}{g:02x}{b:02x}")
}

/// RGB → HSV. Hue in degrees (0–360), saturation and value 0–100.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = f64::from(r) / 255.0;
    let g = f64::from(g) / 255.0;
    let b = f64::from(b) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let saturation = if max == 0.0 { 0.0 } else { delta / max * 100.0 };
    (hue, saturation, max * 100.0)
}

/// HSV → RGB. Hue in degrees (0–360), saturation and value 0–100.
pub fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> (u8, u8, u8) {
    let hue = clamp(hue, 0.0, 360.0) % 360.0;
    let s = clamp(saturation, 0.0, 100.0) / 100.0;
    let v = clamp(value, 0.0, 100.0) / 100.0;

    let c = v * s;
    let x = c * (1.0 - ((hue / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match hue as u32 / 60 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (
        ((r + m) * 255.0).round() as u8,
        ((g + m) * 255.0).round() as u8,
        ((b + m) * 255.0).round() as u8,
    )
}

/// RGB → CIE xy chromaticity, scaled to the gateway's 0–65535 range.
///
/// Uses the sRGB D65 conversion matrix without gamma correction; the
/// gateway applies its own correction downstream.
pub fn rgb_to_cie(r: u8, g: u8, b: u8) -> (i64, i64) {
    let r = f64::from(r) / 255.0;
    let g = f64::from(g) / 255.0;
    let b = f64::from(b) / 255.0;

    let x = 0.4124 * r + 0.3576 * g + 0.1805 * b;
    let y = 0.2126 * r + 0.7152 * g + 0.0722 * b;
    let z = 0.0193 * r + 0.1192 * g + 0.9505 * b;

    let sum = x + y + z;
    if sum == 0.0 {
        return (0, 0);
    }
    (
        (x / sum * MAX_CIE).round() as i64,
        (y / sum * MAX_CIE).round() as i64,
    )
}

// ── Predefined colors ────────────────────────────────────────────────

/// A color the gateway's own app exposes as a preset. Spectrum-limited
/// bulbs only accept these; full-color bulbs snap to them when the
/// backing values match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredefinedColor {
    pub name: &'static str,
    pub hex: &'static str,
}

/// White-spectrum presets, cold to warm.
pub const WHITE_SPECTRUM_COLORS: &[PredefinedColor] = &[
    PredefinedColor { name: "cold", hex: "f5faf6" },
    PredefinedColor { name: "normal", hex: "f1e0b5" },
    PredefinedColor { name: "warm", hex: "efd275" },
];

/// Full-color presets.
pub const RGB_COLORS: &[PredefinedColor] = &[
    PredefinedColor { name: "blue", hex: "4a418a" },
    PredefinedColor { name: "light blue", hex: "6c83ba" },
    PredefinedColor { name: "saturated purple", hex: "8f2686" },
    PredefinedColor { name: "lime", hex: "a9d62b" },
    PredefinedColor { name: "light purple", hex: "c984bb" },
    PredefinedColor { name: "yellow", hex: "d6e44b" },
    PredefinedColor { name: "saturated pink", hex: "d9337c" },
    PredefinedColor { name: "dark peach", hex: "da5d41" },
    PredefinedColor { name: "saturated red", hex: "dc4b31" },
    PredefinedColor { name: "cool daylight", hex: "dcf0f8" },
    PredefinedColor { name: "pink", hex: "e491af" },
    PredefinedColor { name: "peach", hex: "e57345" },
    PredefinedColor { name: "warm amber", hex: "e78834" },
    PredefinedColor { name: "light pink", hex: "e8bedd" },
    PredefinedColor { name: "cool white", hex: "eaf6fb" },
    PredefinedColor { name: "candlelight", hex: "ebb63e" },
];

/// Look up a predefined color by exact hex value.
pub fn predefined_for_hex(hex: &str) -> Option<&'static PredefinedColor> {
    let needle = hex.to_ascii_lowercase();
    RGB_COLORS
        .iter()
        .chain(WHITE_SPECTRUM_COLORS)
        .find(|c| c.hex == needle)
}

/// The hue/saturation pair a predefined color decomposes into, at the
/// same precision the virtual color setter stores.
pub fn predefined_hue_saturation(color: &PredefinedColor) -> Option<(f64, f64)> {
    let (r, g, b) = hex_to_rgb(color.hex)?;
    let (hue, saturation, _) = rgb_to_hsv(r, g, b);
    Some((round1(hue), round1(saturation)))
}

/// Find the predefined color whose hue/saturation decomposition equals
/// the given backing values exactly (at storage precision).
pub fn predefined_matching_hue_saturation(
    hue: f64,
    saturation: f64,
) -> Option<&'static PredefinedColor> {
    RGB_COLORS
        .iter()
        .find(|c| predefined_hue_saturation(c) == Some((round1(hue), round1(saturation))))
}

/// Round to one decimal, the storage precision of hue and saturation.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn brightness_scaling_round_trips_whole_percents() {
        for percent in [0.0, 1.0, 50.0, 70.0, 100.0] {
            let wire = percent_to_brightness(percent);
            assert_eq!(brightness_to_percent(wire as f64), percent);
        }
        assert_eq!(percent_to_brightness(100.0), 254);
        assert_eq!(percent_to_brightness(150.0), 254, "clamped");
        assert_eq!(percent_to_brightness(-3.0), 0, "clamped");
    }

    #[test]
    fn color_temp_uses_the_mired_range() {
        assert_eq!(percent_to_color_temp(0.0), 250);
        assert_eq!(percent_to_color_temp(100.0), 454);
        assert_eq!(color_temp_to_percent(352.0), 50.0);
    }

    #[test]
    fn fan_speed_snaps_to_multiples_of_five() {
        assert_eq!(percent_to_fan_speed(0.0), 0);
        assert_eq!(percent_to_fan_speed(47.0), 25);
        assert_eq!(percent_to_fan_speed(53.0), 25);
        assert_eq!(percent_to_fan_speed(100.0), 50);
        assert_eq!(percent_to_fan_speed(24.0), 10);
    }

    #[test]
    fn transition_time_is_tenths_of_a_second() {
        assert_eq!(seconds_to_tenths(0.5), 5);
        assert_eq!(seconds_to_tenths(2.0), 20);
        assert_eq!(tenths_to_seconds(5.0), 0.5);
        assert_eq!(seconds_to_tenths(-1.0), 0, "clamped");
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(hex_to_rgb("bada55"), Some((0xba, 0xda, 0x55)));
        assert_eq!(hex_to_rgb("BADA55"), Some((0xba, 0xda, 0x55)));
        assert_eq!(hex_to_rgb("xyzxyz"), None);
        assert_eq!(hex_to_rgb("fff"), None);
        assert_eq!(rgb_to_hex(0xba, 0xda, 0x55), "bada55");
    }

    #[test]
    fn hsv_round_trips_primaries() {
        for (r, g, b) in [(255, 0, 0), (0, 255, 0), (0, 0, 255), (255, 255, 255)] {
            let (h, s, v) = rgb_to_hsv(r, g, b);
            assert_eq!(hsv_to_rgb(h, s, v), (r, g, b));
        }
    }

    #[test]
    fn cie_of_white_is_the_d65ish_point() {
        let (x, y) = rgb_to_cie(255, 255, 255);
        // sRGB white lands near (0.313, 0.329) scaled.
        assert!((x - 20_497).abs() < 300, "x = {x}");
        assert!((y - 21_563).abs() < 300, "y = {y}");
    }

    #[test]
    fn predefined_lookup_is_case_insensitive() {
        assert_eq!(predefined_for_hex("E78834").unwrap().name, "warm amber");
        assert!(predefined_for_hex("123456").is_none());
    }

    #[test]
    fn predefined_hue_saturation_matches_itself() {
        for color in RGB_COLORS {
            let (hue, sat) = predefined_hue_saturation(color).unwrap();
            let matched = predefined_matching_hue_saturation(hue, sat).unwrap();
            assert_eq!(matched.hex, color.hex);
        }
    }
}
