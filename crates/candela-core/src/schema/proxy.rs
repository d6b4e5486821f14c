// ── Virtual-property wrappers ──
//
// Lights expose a computed `color` property with no backing wire key:
// a hex string derived from (and written back into) hue/saturation or
// color temperature, depending on the bulb's spectrum. The wrapper is
// the explicit stand-in for transparent get/set interception: declared
// virtual properties dispatch to these functions, everything else
// passes through to the backing instance.
//
// The spectrum is resolved once, when the device wrapper is built, and
// inherited by the nested light wrappers it hands out.

use serde_json::json;

use crate::convert;
use crate::model::device::{self, Spectrum};
use crate::schema::Instance;

/// A device with its feature detection resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxiedDevice {
    instance: Instance,
    spectrum: Spectrum,
}

impl ProxiedDevice {
    pub fn new(instance: Instance) -> Self {
        let spectrum = device::spectrum(&instance);
        Self { instance, spectrum }
    }

    pub fn spectrum(&self) -> Spectrum {
        self.spectrum
    }

    /// The backing instance; reads pass through unchanged.
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn into_instance(self) -> Instance {
        self.instance
    }

    /// Read view of the light entry at `index`, carrying the spectrum
    /// resolved at construction.
    pub fn light(&self, index: usize) -> Option<ProxiedLight<'_>> {
        let light = device::lights(&self.instance).get(index)?;
        Some(ProxiedLight {
            light,
            spectrum: self.spectrum,
        })
    }

    /// Write view of the light entry at `index`.
    pub fn light_mut(&mut self, index: usize) -> Option<ProxiedLightMut<'_>> {
        let spectrum = self.spectrum;
        let light = match self.instance.values_mut().get_mut("light_list")? {
            crate::schema::PropValue::NestedArray(items) => items.get_mut(index)?,
            _ => return None,
        };
        Some(ProxiedLightMut { light, spectrum })
    }
}

/// Read view of a light with virtual-property dispatch.
#[derive(Debug, Clone, Copy)]
pub struct ProxiedLight<'a> {
    light: &'a Instance,
    spectrum: Spectrum,
}

impl ProxiedLight<'_> {
    /// The virtual color property.
    pub fn color(&self) -> Option<String> {
        read_color(self.light, self.spectrum)
    }

    /// Pass-through read of a backing property.
    pub fn instance(&self) -> &Instance {
        self.light
    }
}

/// Write view of a light with virtual-property dispatch.
#[derive(Debug)]
pub struct ProxiedLightMut<'a> {
    light: &'a mut Instance,
    spectrum: Spectrum,
}

impl ProxiedLightMut<'_> {
    pub fn color(&self) -> Option<String> {
        read_color(self.light, self.spectrum)
    }

    /// Write the virtual color property, rewriting the backing fields.
    /// Returns `false` when the hex string is malformed or the bulb
    /// has no color support.
    pub fn set_color(&mut self, hex: &str) -> bool {
        write_color(self.light, self.spectrum, hex)
    }

    /// Pass-through write of a backing property.
    pub fn set_json(&mut self, name: &'static str, value: serde_json::Value) {
        self.light.set_json(name, value);
    }

    pub fn instance(&self) -> &Instance {
        self.light
    }
}

// ── Virtual color get/set ────────────────────────────────────────────

fn read_color(light: &Instance, spectrum: Spectrum) -> Option<String> {
    match spectrum {
        Spectrum::Rgb => {
            let hue = light.f64_of("hue")?;
            let saturation = light.f64_of("saturation")?;
            if let Some(predefined) = convert::predefined_matching_hue_saturation(hue, saturation)
            {
                return Some(predefined.hex.to_owned());
            }
            let (r, g, b) = convert::hsv_to_rgb(hue, saturation, 100.0);
            Some(convert::rgb_to_hex(r, g, b))
        }
        Spectrum::White => {
            let percent = light.f64_of("color_temperature")?;
            let index = ((percent / 50.0).round() as usize)
                .min(convert::WHITE_SPECTRUM_COLORS.len() - 1);
            Some(convert::WHITE_SPECTRUM_COLORS[index].hex.to_owned())
        }
        // No color hardware: expose the raw reported hex, if any.
        Spectrum::None => light.str_of("color_hex").map(str::to_owned),
    }
}

fn write_color(light: &mut Instance, spectrum: Spectrum, hex: &str) -> bool {
    let hex = hex.to_ascii_lowercase();
    let Some((r, g, b)) = convert::hex_to_rgb(&hex) else {
        return false;
    };

    match spectrum {
        Spectrum::Rgb => {
            let (hue, saturation, _value) = convert::rgb_to_hsv(r, g, b);
            light.set_json("hue", json!(convert::round1(hue)));
            light.set_json("saturation", json!(convert::round1(saturation)));
            // x and y always travel together with the virtual setter.
            let (x, y) = convert::rgb_to_cie(r, g, b);
            light.set_json("color_x", json!(x));
            light.set_json("color_y", json!(y));
            true
        }
        Spectrum::White => {
            // Spectrum-limited bulbs only accept the white presets;
            // snap to the nearest one and store its temperature.
            let index = nearest_white(r, g, b);
            let percent = index as f64 * 50.0;
            light.set_json("color_temperature", json!(percent));
            true
        }
        Spectrum::None => false,
    }
}

fn nearest_white(r: u8, g: u8, b: u8) -> usize {
    let mut best = 0;
    let mut best_distance = u32::MAX;
    for (index, white) in convert::WHITE_SPECTRUM_COLORS.iter().enumerate() {
        let Some((wr, wg, wb)) = convert::hex_to_rgb(white.hex) else {
            continue;
        };
        let distance = u32::from(r.abs_diff(wr)).pow(2)
            + u32::from(g.abs_diff(wg)).pow(2)
            + u32::from(b.abs_diff(wb)).pow(2);
        if distance < best_distance {
            best_distance = distance;
            best = index;
        }
    }
    best
}
