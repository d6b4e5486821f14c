// Diff-based updates through the client: minimal payloads, required
// field coupling, and no-op suppression.

#![allow(clippy::unwrap_used)]

mod support;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use candela_core::ops;
use candela_core::{GatewayClient, GatewayConfig, Method, OperationProvider, UpdateOutcome};

use support::MockTransport;

const DEVICE_INDEX: &str = "coaps://gw.local:5684/15001";
const BULB: &str = "coaps://gw.local:5684/15001/65536";
const GROUP_INDEX: &str = "coaps://gw.local:5684/15004";
const GROUP: &str = "coaps://gw.local:5684/15004/131073";
const SCENE_INDEX: &str = "coaps://gw.local:5684/15005/131073";

async fn client_with_bulb(transport: &Arc<MockTransport>) -> GatewayClient {
    let config = GatewayConfig::new("gw.local", "identity", "psk");
    let client = GatewayClient::new(config, transport.clone()).unwrap();
    client.connect().await.unwrap();

    let observer = tokio::spawn({
        let client = client.clone();
        async move { client.observe_devices().await }
    });
    transport.push(DEVICE_INDEX, json!([65536])).await;
    transport
        .push(
            BULB,
            json!({
                "9003": 65536,
                "9001": "bulb",
                "5750": 2,
                "3": { "1": "TRADFRI bulb E27 CWS opal 600lm" },
                "3311": [{ "5850": 0, "5851": 254 }],
            }),
        )
        .await;
    observer.await.unwrap().unwrap();
    client
}

async fn client_with_group(transport: &Arc<MockTransport>) -> GatewayClient {
    let config = GatewayConfig::new("gw.local", "identity", "psk");
    let client = GatewayClient::new(config, transport.clone()).unwrap();
    client.connect().await.unwrap();

    let observer = tokio::spawn({
        let client = client.clone();
        async move { client.observe_groups_and_scenes().await }
    });
    transport.push(GROUP_INDEX, json!([131_073])).await;
    transport
        .push(
            GROUP,
            json!({
                "9003": 131_073,
                "9001": "living room",
                "5850": 0,
                "5851": 254,
                "9039": 196_608,
            }),
        )
        .await;
    transport.push(SCENE_INDEX, json!([])).await;
    observer.await.unwrap().unwrap();
    client
}

#[tokio::test]
async fn switching_a_group_on_sends_only_the_flag() {
    let transport = Arc::new(MockTransport::new());
    let client = client_with_group(&transport).await;

    let group = client.group(131_073).await.unwrap();
    let outcome = ops::set_group_on_off(&group, true).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Sent);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, GROUP);
    assert_eq!(requests[0].method, Method::Put);
    assert_eq!(requests[0].payload, Some(json!({ "5850": 1 })));
}

#[tokio::test]
async fn unchanged_state_sends_nothing() {
    let transport = Arc::new(MockTransport::new());
    let client = client_with_group(&transport).await;

    let group = client.group(131_073).await.unwrap();
    let outcome = client.update_group(131_073, group).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::NoChange);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn group_brightness_drags_the_transition_time() {
    let transport = Arc::new(MockTransport::new());
    let client = client_with_group(&transport).await;

    let group = client.group(131_073).await.unwrap();
    ops::set_group_brightness(&group, 50.0, None).await.unwrap();

    let requests = transport.requests();
    assert_eq!(
        requests[0].payload,
        Some(json!({ "5851": 127, "5712": 5 }))
    );
}

#[tokio::test]
async fn scene_activation_couples_the_on_flag() {
    let transport = Arc::new(MockTransport::new());
    let client = client_with_group(&transport).await;

    let group = client.group(131_073).await.unwrap();
    ops::activate_scene(&group, 196_609).await.unwrap();

    let requests = transport.requests();
    assert_eq!(
        requests[0].payload,
        Some(json!({ "9039": 196_609, "5850": 1 }))
    );
}

#[tokio::test]
async fn device_brightness_serializes_one_light_entry() {
    let transport = Arc::new(MockTransport::new());
    let client = client_with_bulb(&transport).await;

    let device = client.device(65536).await.unwrap();
    ops::set_device_brightness(&device, 50.0, None).await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests[0].path, BULB);
    assert_eq!(
        requests[0].payload,
        Some(json!({ "3311": [{ "5851": 127, "5712": 5 }] }))
    );
}

#[tokio::test]
async fn device_color_write_sends_the_backing_fields() {
    let transport = Arc::new(MockTransport::new());
    let client = client_with_bulb(&transport).await;

    let device = client.device(65536).await.unwrap();
    ops::set_device_color(&device, "e78834").await.unwrap();

    let requests = transport.requests();
    let payload = requests[0].payload.clone().unwrap();
    let light = &payload["3311"][0];
    // Hue and saturation travel together, with the CIE pair alongside.
    assert!(light.get("5707").is_some());
    assert!(light.get("5708").is_some());
    assert!(light.get("5709").is_some());
    assert!(light.get("5710").is_some());
    assert!(light.get("5850").is_none(), "unchanged on flag must not ride along");
}

#[tokio::test]
async fn updating_an_untracked_device_is_an_error() {
    let transport = Arc::new(MockTransport::new());
    let client = client_with_bulb(&transport).await;

    let device = client.device(65536).await.unwrap();
    let err = client
        .update_device(99, device.instance().clone())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        candela_core::CoreError::UnknownResource { kind: "device", id: 99 }
    ));
}
