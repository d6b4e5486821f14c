// ── Convenience operations ──
//
// Instances handed out by the reconciliation engine carry a weak
// back-reference to the client that produced them, so callers can
// mutate a snapshot and submit it without holding the client themselves.
// The provider diffs the desired state against its stored reference and
// sends only what changed.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::convert;
use crate::error::CoreError;
use crate::model;
use crate::schema::proxy::ProxiedDevice;
use crate::schema::{Instance, PropValue};

/// Whether an update turned into a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The diff was non-empty and a request went out.
    Sent,
    /// The desired state matched the reference; nothing was sent.
    NoChange,
}

/// The write half of the client, as seen by detached instances.
#[async_trait]
pub trait OperationProvider: Send + Sync {
    /// Submit a desired device state. The provider owns the reference
    /// snapshot and the diff.
    async fn update_device(&self, id: u32, desired: Instance) -> Result<UpdateOutcome, CoreError>;

    /// Submit a desired group state.
    async fn update_group(&self, id: u32, desired: Instance) -> Result<UpdateOutcome, CoreError>;
}

fn provider_of(instance: &Instance) -> Result<Arc<dyn OperationProvider>, CoreError> {
    instance
        .provider()
        .and_then(|weak| weak.upgrade())
        .ok_or(CoreError::NotConnected)
}

fn id_of(instance: &Instance, kind: &'static str) -> Result<u32, CoreError> {
    model::instance_id(instance).ok_or(CoreError::UnknownResource { kind, id: 0 })
}

/// Mutate every light entry of a cloned device snapshot.
fn with_lights(
    device: &ProxiedDevice,
    mutate: impl Fn(&mut Instance),
) -> Result<(u32, Instance), CoreError> {
    let id = id_of(device.instance(), "device")?;
    let mut desired = device.instance().clone();
    if let Some(PropValue::NestedArray(lights)) = desired.values_mut().get_mut("light_list") {
        for light in lights.iter_mut() {
            mutate(light);
        }
    }
    Ok((id, desired))
}

// ── Device operations ────────────────────────────────────────────────

pub async fn set_device_on_off(device: &ProxiedDevice, on: bool) -> Result<UpdateOutcome, CoreError> {
    let provider = provider_of(device.instance())?;
    let (id, desired) = with_lights(device, |light| light.set_json("on_off", json!(on)))?;
    provider.update_device(id, desired).await
}

/// Set brightness as a 0–100 percentage, with an optional transition in
/// seconds.
pub async fn set_device_brightness(
    device: &ProxiedDevice,
    percent: f64,
    transition: Option<f64>,
) -> Result<UpdateOutcome, CoreError> {
    let provider = provider_of(device.instance())?;
    let (id, desired) = with_lights(device, |light| {
        light.set_json("dimmer", json!(convert::round1(percent.clamp(0.0, 100.0))));
        if let Some(seconds) = transition {
            light.set_json("transition_time", json!(seconds));
        }
    })?;
    provider.update_device(id, desired).await
}

/// Set the virtual color property on every light of the device.
pub async fn set_device_color(
    device: &ProxiedDevice,
    hex: &str,
) -> Result<UpdateOutcome, CoreError> {
    let provider = provider_of(device.instance())?;
    let id = id_of(device.instance(), "device")?;

    let mut desired = device.clone();
    let light_count = device.instance().nested_array("light_list").map_or(0, <[_]>::len);
    for index in 0..light_count {
        let mut light = desired
            .light_mut(index)
            .ok_or(CoreError::UnknownResource { kind: "light", id })?;
        if !light.set_color(hex) {
            return Err(CoreError::Unsupported {
                message: format!("device {id} cannot take color {hex}"),
            });
        }
    }
    provider.update_device(id, desired.into_instance()).await
}

// ── Group operations ─────────────────────────────────────────────────

pub async fn set_group_on_off(group: &Instance, on: bool) -> Result<UpdateOutcome, CoreError> {
    let provider = provider_of(group)?;
    let id = id_of(group, "group")?;
    let mut desired = group.clone();
    desired.set_json("on_off", json!(on));
    provider.update_group(id, desired).await
}

pub async fn set_group_brightness(
    group: &Instance,
    percent: f64,
    transition: Option<f64>,
) -> Result<UpdateOutcome, CoreError> {
    let provider = provider_of(group)?;
    let id = id_of(group, "group")?;
    let mut desired = group.clone();
    desired.set_json("dimmer", json!(convert::round1(percent.clamp(0.0, 100.0))));
    if let Some(seconds) = transition {
        desired.set_json("transition_time", json!(seconds));
    }
    provider.update_group(id, desired).await
}

/// Activate a scene on a group. The gateway requires the group to be
/// switched on in the same request; the schema's inclusion rules add
/// the on flag automatically, this only has to set it.
pub async fn activate_scene(group: &Instance, scene_id: u32) -> Result<UpdateOutcome, CoreError> {
    let provider = provider_of(group)?;
    let id = id_of(group, "group")?;
    let mut desired = group.clone();
    desired.set_json("scene_id", json!(scene_id));
    desired.set_json("on_off", json!(true));
    provider.update_group(id, desired).await
}
