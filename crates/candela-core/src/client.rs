// ── Gateway client ──
//
// Full lifecycle management for a gateway connection: session setup,
// observed collections with per-item reconciliation, diff-based
// updates, and reactive event streaming.
//
// Each observed collection is driven by one actor task. Observer
// callbacks never touch shared state; they forward the raw response
// into the actor's inbox, and the actor owns the tracker and performs
// all registration, teardown, and event emission in arrival order.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use candela_coap::{
    CoapResponse, CoapTransport, Endpoint, GatewayUrl, Method, ObserveCallback,
};

use crate::config::GatewayConfig;
use crate::error::CoreError;
use crate::model::device::DEVICE;
use crate::model::group::GROUP;
use crate::model::scene::SCENE;
use crate::ops::{OperationProvider, UpdateOutcome};
use crate::schema::proxy::ProxiedDevice;
use crate::schema::repair;
use crate::schema::{Instance, Schema, WireObject};
use crate::tracker::{CollectionTracker, LoadPhase};
use crate::watchdog::LivenessProbe;

const EVENT_CHANNEL_SIZE: usize = 256;

// ── Events ───────────────────────────────────────────────────────────

/// Everything the client reports to consumers.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// A device appeared or changed. Carries the full current state.
    DeviceUpdated(Arc<ProxiedDevice>),
    DeviceRemoved(u32),
    GroupUpdated(Arc<Instance>),
    GroupRemoved(u32),
    SceneUpdated { group: u32, scene: Arc<Instance> },
    SceneRemoved { group: u32, scene: u32 },
    /// A non-fatal protocol problem on an observed path.
    ObserveError { path: String, reason: String },
}

// ── Client ───────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc`. Owns the observed collections and the
/// background actor tasks driving them.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn CoapTransport>,
    config: GatewayConfig,
    url: GatewayUrl,
    event_tx: broadcast::Sender<GatewayEvent>,
    cancel: CancellationToken,
    devices: Mutex<HashMap<u32, StoredDevice>>,
    groups: Mutex<HashMap<u32, Instance>>,
    scenes: Mutex<HashMap<(u32, u32), Instance>>,
    device_actor: Mutex<Option<ActorHandle>>,
    group_actor: Mutex<Option<ActorHandle>>,
}

/// Reference snapshot of a device, with the quirk repairs that were
/// applied when it was parsed. The repairs replay on outbound payloads.
struct StoredDevice {
    instance: Instance,
    repairs: Vec<&'static str>,
}

struct ActorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl GatewayClient {
    /// Create a client over a transport. Does not touch the network;
    /// call [`connect()`](Self::connect) to negotiate the session.
    pub fn new(
        config: GatewayConfig,
        transport: Arc<dyn CoapTransport>,
    ) -> Result<Self, CoreError> {
        let url = GatewayUrl::new(&config.host, config.port)?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Ok(Self {
            inner: Arc::new(ClientInner {
                transport,
                config,
                url,
                event_tx,
                cancel: CancellationToken::new(),
                devices: Mutex::new(HashMap::new()),
                groups: Mutex::new(HashMap::new()),
                scenes: Mutex::new(HashMap::new()),
                device_actor: Mutex::new(None),
                group_actor: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Subscribe to the event broadcast stream.
    pub fn events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.event_tx.subscribe()
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Negotiate the secure session with the gateway.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let accepted = self
            .inner
            .transport
            .connect(&self.inner.config.identity, &self.inner.config.psk)
            .await?;
        if !accepted {
            return Err(CoreError::Authentication);
        }
        info!(host = %self.inner.config.host, "connected to gateway");
        Ok(())
    }

    /// Probe gateway liveness through the transport.
    pub async fn ping(&self) -> bool {
        self.inner.transport.ping(None).await
    }

    /// Discard the session, forcing re-negotiation on next use.
    /// Observers survive a reset; the transport re-registers them.
    pub async fn reset(&self) {
        self.inner.transport.reset().await;
    }

    /// Stop all observation and background tasks. Idempotent.
    pub async fn shutdown(&self) {
        self.stop_observing_devices().await;
        self.stop_observing_groups_and_scenes().await;
        self.inner.cancel.cancel();
        debug!("client shut down");
    }

    // ── Device observation ───────────────────────────────────────────

    /// Begin observing the device collection.
    ///
    /// Resolves once every device listed by the first index snapshot
    /// has delivered its initial state. Calling again while observation
    /// is active is a no-op.
    pub async fn observe_devices(&self) -> Result<(), CoreError> {
        let mut slot = self.inner.device_actor.lock().await;
        if slot.is_some() {
            debug!("device observation already active");
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();

        let index_path = self.inner.url.collection(Endpoint::Devices);
        let index_tx = tx.clone();
        let callback: ObserveCallback =
            Arc::new(move |resp| {
                let _ = index_tx.send(DeviceMsg::Index(resp));
            });
        self.inner
            .transport
            .observe(&index_path, Method::Get, callback)
            .await?;

        let cancel = self.inner.cancel.child_token();
        let actor = DeviceActor {
            inner: self.inner.clone(),
            tx,
            tracker: CollectionTracker::new("devices"),
            done: Some(done_tx),
            failure: None,
        };
        let task = tokio::spawn(actor.run(rx, cancel.clone()));
        *slot = Some(ActorHandle { cancel, task });
        drop(slot);

        done_rx.await.unwrap_or_else(|_| {
            Err(CoreError::InitialLoadFailed {
                collection: "devices",
                reason: "observer task ended before the initial load".into(),
            })
        })
    }

    /// Stop observing devices and forget all device state. Idempotent.
    pub async fn stop_observing_devices(&self) {
        let Some(handle) = self.inner.device_actor.lock().await.take() else {
            return;
        };
        // The actor stops the per-item observers on its way out; it is
        // the only place that knows about loads still in flight.
        handle.cancel.cancel();
        let _ = handle.task.await;

        self.inner
            .transport
            .stop_observing(&self.inner.url.collection(Endpoint::Devices))
            .await;
        self.inner.devices.lock().await.clear();
        debug!("device observation stopped");
    }

    // ── Group and scene observation ──────────────────────────────────

    /// Begin observing groups, including each group's scene collection.
    ///
    /// Resolves once every group and every scene of every group has
    /// delivered its initial state. Idempotent while active.
    pub async fn observe_groups_and_scenes(&self) -> Result<(), CoreError> {
        let mut slot = self.inner.group_actor.lock().await;
        if slot.is_some() {
            debug!("group observation already active");
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();

        let index_path = self.inner.url.collection(Endpoint::Groups);
        let index_tx = tx.clone();
        let callback: ObserveCallback =
            Arc::new(move |resp| {
                let _ = index_tx.send(GroupMsg::Index(resp));
            });
        self.inner
            .transport
            .observe(&index_path, Method::Get, callback)
            .await?;

        let cancel = self.inner.cancel.child_token();
        let actor = GroupActor {
            inner: self.inner.clone(),
            tx,
            tracker: CollectionTracker::new("groups"),
            scene_trackers: HashMap::new(),
            done: Some(done_tx),
            failure: None,
        };
        let task = tokio::spawn(actor.run(rx, cancel.clone()));
        *slot = Some(ActorHandle { cancel, task });
        drop(slot);

        done_rx.await.unwrap_or_else(|_| {
            Err(CoreError::InitialLoadFailed {
                collection: "groups",
                reason: "observer task ended before the initial load".into(),
            })
        })
    }

    /// Stop observing groups and scenes and forget their state.
    pub async fn stop_observing_groups_and_scenes(&self) {
        let Some(handle) = self.inner.group_actor.lock().await.take() else {
            return;
        };
        // The actor stops the group, scene-index, and scene observers
        // on its way out, pending loads included.
        handle.cancel.cancel();
        let _ = handle.task.await;

        self.inner
            .transport
            .stop_observing(&self.inner.url.collection(Endpoint::Groups))
            .await;
        self.inner.groups.lock().await.clear();
        self.inner.scenes.lock().await.clear();
        debug!("group observation stopped");
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    /// Current state of one device, if tracked.
    pub async fn device(&self, id: u32) -> Option<ProxiedDevice> {
        let devices = self.inner.devices.lock().await;
        devices.get(&id).map(|d| self.proxied(d.instance.clone()))
    }

    /// Current state of all tracked devices, ordered by id.
    pub async fn devices(&self) -> Vec<ProxiedDevice> {
        let devices = self.inner.devices.lock().await;
        let mut out: Vec<_> = devices
            .iter()
            .map(|(id, d)| (*id, self.proxied(d.instance.clone())))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out.into_iter().map(|(_, d)| d).collect()
    }

    pub async fn group(&self, id: u32) -> Option<Instance> {
        let groups = self.inner.groups.lock().await;
        groups.get(&id).map(|g| {
            let mut g = g.clone();
            g.attach_provider(self.provider_ref());
            g
        })
    }

    pub async fn scenes_of(&self, group: u32) -> Vec<Instance> {
        let scenes = self.inner.scenes.lock().await;
        let mut out: Vec<_> = scenes
            .iter()
            .filter(|((gid, _), _)| *gid == group)
            .map(|((_, sid), s)| (*sid, s.clone()))
            .collect();
        out.sort_by_key(|(sid, _)| *sid);
        out.into_iter().map(|(_, s)| s).collect()
    }

    fn proxied(&self, mut instance: Instance) -> ProxiedDevice {
        instance.attach_provider(self.provider_ref());
        ProxiedDevice::new(instance)
    }

    fn provider_ref(&self) -> Weak<dyn OperationProvider> {
        Arc::downgrade(&self.inner) as Weak<dyn OperationProvider>
    }
}

// ── Updates ──────────────────────────────────────────────────────────

#[async_trait]
impl OperationProvider for ClientInner {
    async fn update_device(&self, id: u32, desired: Instance) -> Result<UpdateOutcome, CoreError> {
        let (reference, repairs) = {
            let devices = self.devices.lock().await;
            let stored = devices
                .get(&id)
                .ok_or(CoreError::UnknownResource { kind: "device", id })?;
            (stored.instance.clone(), stored.repairs.clone())
        };

        let mut payload = desired.serialize(Some(&reference));
        if payload.is_empty() {
            debug!(device = id, "update matches reference, nothing to send");
            return Ok(UpdateOutcome::NoChange);
        }
        repair::restore_repaired_defaults(&desired, &repairs, &mut payload);

        let path = self.url.item(Endpoint::Devices, id);
        self.put(&path, payload).await?;
        Ok(UpdateOutcome::Sent)
    }

    async fn update_group(&self, id: u32, desired: Instance) -> Result<UpdateOutcome, CoreError> {
        let reference = {
            let groups = self.groups.lock().await;
            groups
                .get(&id)
                .ok_or(CoreError::UnknownResource { kind: "group", id })?
                .clone()
        };

        let payload = desired.serialize(Some(&reference));
        if payload.is_empty() {
            debug!(group = id, "update matches reference, nothing to send");
            return Ok(UpdateOutcome::NoChange);
        }

        let path = self.url.item(Endpoint::Groups, id);
        self.put(&path, payload).await?;
        Ok(UpdateOutcome::Sent)
    }
}

impl ClientInner {
    async fn put(&self, path: &str, payload: WireObject) -> Result<(), CoreError> {
        let body = serde_json::to_vec(&Value::Object(payload)).map_err(|e| {
            CoreError::Payload {
                path: path.to_owned(),
                reason: e.to_string(),
            }
        })?;
        let response = self.transport.request(path, Method::Put, Some(body)).await?;
        if !response.code.is_success() {
            return Err(CoreError::Protocol {
                path: path.to_owned(),
                code: response.code,
            });
        }
        debug!(path, code = %response.code, "update accepted");
        Ok(())
    }

    fn emit(&self, event: GatewayEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[async_trait]
impl OperationProvider for GatewayClient {
    async fn update_device(&self, id: u32, desired: Instance) -> Result<UpdateOutcome, CoreError> {
        self.inner.update_device(id, desired).await
    }

    async fn update_group(&self, id: u32, desired: Instance) -> Result<UpdateOutcome, CoreError> {
        self.inner.update_group(id, desired).await
    }
}

#[async_trait]
impl LivenessProbe for GatewayClient {
    async fn ping(&self) -> bool {
        self.inner.transport.ping(None).await
    }

    async fn drop_session(&self) {
        self.inner.transport.reset().await;
    }
}

// ── Shared actor helpers ─────────────────────────────────────────────

/// Decode an index payload: a JSON array of resource ids.
fn parse_id_index(resp: &CoapResponse, path: &str) -> Result<Vec<u32>, CoreError> {
    if !resp.code.is_success() {
        return Err(CoreError::Protocol {
            path: path.to_owned(),
            code: resp.code,
        });
    }
    let value = resp.json(path)?;
    let Value::Array(entries) = value else {
        return Err(CoreError::Payload {
            path: path.to_owned(),
            reason: "index payload is not an array".into(),
        });
    };
    let mut ids = Vec::with_capacity(entries.len());
    for entry in entries {
        let id = entry
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| CoreError::Payload {
                path: path.to_owned(),
                reason: format!("index entry {entry} is not a resource id"),
            })?;
        ids.push(id);
    }
    Ok(ids)
}

/// Decode an item payload into an instance of `schema`.
fn parse_item(
    resp: &CoapResponse,
    path: &str,
    schema: &'static Schema,
) -> Result<Instance, CoreError> {
    let value = resp.json(path)?;
    let Value::Object(map) = value else {
        return Err(CoreError::Payload {
            path: path.to_owned(),
            reason: "item payload is not an object".into(),
        });
    };
    Ok(Instance::parse(schema, &map))
}

// ── Device actor ─────────────────────────────────────────────────────

enum DeviceMsg {
    Index(CoapResponse),
    Item(u32, CoapResponse),
}

struct DeviceActor {
    inner: Arc<ClientInner>,
    tx: mpsc::UnboundedSender<DeviceMsg>,
    tracker: CollectionTracker,
    done: Option<oneshot::Sender<Result<(), CoreError>>>,
    failure: Option<CoreError>,
}

impl DeviceActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<DeviceMsg>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => break,
                },
            }
        }
        self.teardown().await;
    }

    /// Drop every per-item observer, including ones whose first answer
    /// never arrived. Only the actor knows about those.
    async fn teardown(&self) {
        for id in self.tracker.tracked_ids().collect::<Vec<_>>() {
            self.inner
                .transport
                .stop_observing(&self.inner.url.item(Endpoint::Devices, id))
                .await;
        }
    }

    async fn handle(&mut self, msg: DeviceMsg) {
        match msg {
            DeviceMsg::Index(resp) => self.handle_index(resp).await,
            DeviceMsg::Item(id, resp) => self.handle_item(id, resp).await,
        }
        self.maybe_finish();
    }

    async fn handle_index(&mut self, resp: CoapResponse) {
        let path = self.inner.url.collection(Endpoint::Devices);
        let ids = match parse_id_index(&resp, &path) {
            Ok(ids) => ids,
            Err(err) => return self.report(path, err),
        };

        let delta = self.tracker.apply_index(&ids);
        debug!(added = delta.added.len(), removed = delta.removed.len(), "device index");

        for id in delta.removed {
            self.remove_device(id).await;
        }

        let registrations = delta.added.into_iter().map(|id| {
            let path = self.inner.url.item(Endpoint::Devices, id);
            let tx = self.tx.clone();
            let transport = self.inner.transport.clone();
            async move {
                let callback: ObserveCallback =
                    Arc::new(move |resp| {
                        let _ = tx.send(DeviceMsg::Item(id, resp));
                    });
                (id, path.clone(), transport.observe(&path, Method::Get, callback).await)
            }
        });
        for (id, path, result) in join_all(registrations).await {
            if let Err(err) = result {
                self.registration_failed(id, path, err.into());
            }
        }
    }

    async fn handle_item(&mut self, id: u32, resp: CoapResponse) {
        if !self.tracker.is_tracked(id) {
            debug!(device = id, "late callback for untracked device, ignoring");
            return;
        }

        if resp.code == candela_coap::MessageCode::NotFound {
            // The item path says gone, but the index has the final
            // word; keep the last known state until it withdraws the
            // id.
            debug!(device = id, "item answered 4.04, deferring removal to the index");
            return;
        }

        let path = self.inner.url.item(Endpoint::Devices, id);
        if !resp.code.is_success() {
            return self.report(
                path.clone(),
                CoreError::Protocol { path, code: resp.code },
            );
        }

        let mut instance = match parse_item(&resp, &path, &DEVICE) {
            Ok(instance) => instance,
            Err(err) => return self.report(path, err),
        };
        let repairs = repair::repair_known_quirks(&mut instance);
        if !repairs.is_empty() {
            debug!(device = id, ?repairs, "applied firmware quirk repairs");
        }

        {
            let mut devices = self.inner.devices.lock().await;
            devices.insert(id, StoredDevice { instance: instance.clone(), repairs });
        }
        instance.attach_provider(Arc::downgrade(&self.inner) as Weak<dyn OperationProvider>);
        self.inner
            .emit(GatewayEvent::DeviceUpdated(Arc::new(ProxiedDevice::new(instance))));
        self.tracker.item_loaded(id);
    }

    async fn remove_device(&mut self, id: u32) {
        self.inner
            .transport
            .stop_observing(&self.inner.url.item(Endpoint::Devices, id))
            .await;
        let was_stored = self.inner.devices.lock().await.remove(&id).is_some();
        self.tracker.forget(id);
        if was_stored {
            self.inner.emit(GatewayEvent::DeviceRemoved(id));
        }
    }

    /// Registration failures reject the pending load; after the load
    /// they only cost us this one device.
    fn registration_failed(&mut self, id: u32, path: String, err: CoreError) {
        if self.tracker.item_failed(id) {
            self.failure = Some(CoreError::InitialLoadFailed {
                collection: "devices",
                reason: err.to_string(),
            });
        } else {
            warn!(device = id, error = %err, "observer registration failed, skipping device");
            self.tracker.forget(id);
            self.inner.emit(GatewayEvent::ObserveError {
                path,
                reason: err.to_string(),
            });
        }
    }

    /// Protocol problems fail a pending initial load; afterwards they
    /// are reported and observation continues.
    fn report(&mut self, path: String, err: CoreError) {
        if self.done.is_some() {
            self.failure = Some(CoreError::InitialLoadFailed {
                collection: "devices",
                reason: err.to_string(),
            });
        } else {
            warn!(path, error = %err, "device observation error");
            self.inner.emit(GatewayEvent::ObserveError {
                path,
                reason: err.to_string(),
            });
        }
    }

    fn maybe_finish(&mut self) {
        if self.done.is_none() {
            return;
        }
        if let Some(failure) = self.failure.take() {
            if let Some(done) = self.done.take() {
                let _ = done.send(Err(failure));
            }
        } else if self.tracker.phase() == LoadPhase::Steady {
            if let Some(done) = self.done.take() {
                let _ = done.send(Ok(()));
                info!("device collection loaded");
            }
        }
    }
}

// ── Group actor ──────────────────────────────────────────────────────

enum GroupMsg {
    Index(CoapResponse),
    Group(u32, CoapResponse),
    SceneIndex(u32, CoapResponse),
    Scene(u32, u32, CoapResponse),
}

struct GroupActor {
    inner: Arc<ClientInner>,
    tx: mpsc::UnboundedSender<GroupMsg>,
    tracker: CollectionTracker,
    /// One scene sub-collection per loaded group; its initial load
    /// gates the overall load completion.
    scene_trackers: HashMap<u32, CollectionTracker>,
    done: Option<oneshot::Sender<Result<(), CoreError>>>,
    failure: Option<CoreError>,
}

impl GroupActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<GroupMsg>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => break,
                },
            }
        }
        self.teardown().await;
    }

    /// Drop every group, scene-index, and scene observer, pending
    /// first answers included.
    async fn teardown(&self) {
        for id in self.tracker.tracked_ids().collect::<Vec<_>>() {
            self.inner
                .transport
                .stop_observing(&self.inner.url.item(Endpoint::Groups, id))
                .await;
        }
        for (&group, scenes) in &self.scene_trackers {
            self.inner
                .transport
                .stop_observing(&self.inner.url.item(Endpoint::Scenes, group))
                .await;
            for scene in scenes.tracked_ids().collect::<Vec<_>>() {
                self.inner
                    .transport
                    .stop_observing(&self.inner.url.nested(Endpoint::Scenes, group, scene))
                    .await;
            }
        }
    }

    async fn handle(&mut self, msg: GroupMsg) {
        match msg {
            GroupMsg::Index(resp) => self.handle_index(resp).await,
            GroupMsg::Group(id, resp) => self.handle_group(id, resp).await,
            GroupMsg::SceneIndex(group, resp) => self.handle_scene_index(group, resp).await,
            GroupMsg::Scene(group, scene, resp) => self.handle_scene(group, scene, resp).await,
        }
        self.maybe_finish();
    }

    async fn handle_index(&mut self, resp: CoapResponse) {
        let path = self.inner.url.collection(Endpoint::Groups);
        let ids = match parse_id_index(&resp, &path) {
            Ok(ids) => ids,
            Err(err) => return self.report(path, err),
        };

        let delta = self.tracker.apply_index(&ids);
        debug!(added = delta.added.len(), removed = delta.removed.len(), "group index");

        for id in delta.removed {
            self.remove_group(id).await;
        }

        let registrations = delta.added.into_iter().map(|id| {
            let path = self.inner.url.item(Endpoint::Groups, id);
            let tx = self.tx.clone();
            let transport = self.inner.transport.clone();
            async move {
                let callback: ObserveCallback =
                    Arc::new(move |resp| {
                        let _ = tx.send(GroupMsg::Group(id, resp));
                    });
                (id, path.clone(), transport.observe(&path, Method::Get, callback).await)
            }
        });
        for (id, path, result) in join_all(registrations).await {
            if let Err(err) = result {
                self.registration_failed(id, path, err.into());
            }
        }
    }

    async fn handle_group(&mut self, id: u32, resp: CoapResponse) {
        if !self.tracker.is_tracked(id) {
            debug!(group = id, "late callback for untracked group, ignoring");
            return;
        }

        if resp.code == candela_coap::MessageCode::NotFound {
            debug!(group = id, "item answered 4.04, deferring removal to the index");
            return;
        }

        let path = self.inner.url.item(Endpoint::Groups, id);
        if !resp.code.is_success() {
            return self.report(
                path.clone(),
                CoreError::Protocol { path, code: resp.code },
            );
        }

        let instance = match parse_item(&resp, &path, &GROUP) {
            Ok(instance) => instance,
            Err(err) => return self.report(path, err),
        };

        {
            let mut groups = self.inner.groups.lock().await;
            groups.insert(id, instance.clone());
        }
        let mut live = instance;
        live.attach_provider(Arc::downgrade(&self.inner) as Weak<dyn OperationProvider>);
        self.inner.emit(GatewayEvent::GroupUpdated(Arc::new(live)));
        self.tracker.item_loaded(id);

        // First sight of this group: start its scene sub-collection.
        if !self.scene_trackers.contains_key(&id) {
            self.scene_trackers.insert(id, CollectionTracker::new("scenes"));
            let scene_index = self.inner.url.item(Endpoint::Scenes, id);
            let tx = self.tx.clone();
            let callback: ObserveCallback =
                Arc::new(move |resp| {
                    let _ = tx.send(GroupMsg::SceneIndex(id, resp));
                });
            if let Err(err) = self
                .inner
                .transport
                .observe(&scene_index, Method::Get, callback)
                .await
            {
                self.report(scene_index, err.into());
            }
        }
    }

    async fn handle_scene_index(&mut self, group: u32, resp: CoapResponse) {
        let path = self.inner.url.item(Endpoint::Scenes, group);
        let ids = match parse_id_index(&resp, &path) {
            Ok(ids) => ids,
            Err(err) => return self.report(path, err),
        };

        let Some(tracker) = self.scene_trackers.get_mut(&group) else {
            debug!(group, "scene index for untracked group, ignoring");
            return;
        };
        let delta = tracker.apply_index(&ids);

        for scene in delta.removed {
            self.remove_scene(group, scene).await;
        }

        let registrations = delta.added.into_iter().map(|scene| {
            let path = self.inner.url.nested(Endpoint::Scenes, group, scene);
            let tx = self.tx.clone();
            let transport = self.inner.transport.clone();
            async move {
                let callback: ObserveCallback =
                    Arc::new(move |resp| {
                        let _ = tx.send(GroupMsg::Scene(group, scene, resp));
                    });
                (scene, path.clone(), transport.observe(&path, Method::Get, callback).await)
            }
        });
        for (scene, path, result) in join_all(registrations).await {
            if let Err(err) = result {
                self.scene_registration_failed(group, scene, path, err.into());
            }
        }
    }

    async fn handle_scene(&mut self, group: u32, scene: u32, resp: CoapResponse) {
        let tracked = self
            .scene_trackers
            .get(&group)
            .is_some_and(|t| t.is_tracked(scene));
        if !tracked {
            debug!(group, scene, "late callback for untracked scene, ignoring");
            return;
        }

        if resp.code == candela_coap::MessageCode::NotFound {
            debug!(group, scene, "item answered 4.04, deferring removal to the index");
            return;
        }

        let path = self.inner.url.nested(Endpoint::Scenes, group, scene);
        if !resp.code.is_success() {
            return self.report(
                path.clone(),
                CoreError::Protocol { path, code: resp.code },
            );
        }

        let instance = match parse_item(&resp, &path, &SCENE) {
            Ok(instance) => instance,
            Err(err) => return self.report(path, err),
        };

        {
            let mut scenes = self.inner.scenes.lock().await;
            scenes.insert((group, scene), instance.clone());
        }
        self.inner.emit(GatewayEvent::SceneUpdated {
            group,
            scene: Arc::new(instance),
        });
        if let Some(tracker) = self.scene_trackers.get_mut(&group) {
            tracker.item_loaded(scene);
        }
    }

    async fn remove_scene(&mut self, group: u32, scene: u32) {
        self.inner
            .transport
            .stop_observing(&self.inner.url.nested(Endpoint::Scenes, group, scene))
            .await;
        let was_stored = self.inner.scenes.lock().await.remove(&(group, scene)).is_some();
        if let Some(tracker) = self.scene_trackers.get_mut(&group) {
            tracker.forget(scene);
        }
        if was_stored {
            self.inner.emit(GatewayEvent::SceneRemoved { group, scene });
        }
    }

    /// Scene observers come down before the group's removal event
    /// fires, so consumers never see a scene of a group that is already
    /// gone.
    async fn remove_group(&mut self, id: u32) {
        let scenes: Option<Vec<u32>> = self
            .scene_trackers
            .get(&id)
            .map(|tracker| tracker.known_ids().collect());
        if let Some(scenes) = scenes {
            for scene in scenes {
                self.remove_scene(id, scene).await;
            }
            self.inner
                .transport
                .stop_observing(&self.inner.url.item(Endpoint::Scenes, id))
                .await;
            self.scene_trackers.remove(&id);
        }

        self.inner
            .transport
            .stop_observing(&self.inner.url.item(Endpoint::Groups, id))
            .await;
        let was_stored = self.inner.groups.lock().await.remove(&id).is_some();
        self.tracker.forget(id);
        if was_stored {
            self.inner.emit(GatewayEvent::GroupRemoved(id));
        }
    }

    fn registration_failed(&mut self, id: u32, path: String, err: CoreError) {
        if self.tracker.item_failed(id) {
            self.failure = Some(CoreError::InitialLoadFailed {
                collection: "groups",
                reason: err.to_string(),
            });
        } else {
            warn!(group = id, error = %err, "observer registration failed, skipping group");
            self.tracker.forget(id);
            self.inner.emit(GatewayEvent::ObserveError {
                path,
                reason: err.to_string(),
            });
        }
    }

    fn scene_registration_failed(&mut self, group: u32, scene: u32, path: String, err: CoreError) {
        let fatal = self
            .scene_trackers
            .get_mut(&group)
            .is_some_and(|t| t.item_failed(scene));
        if fatal {
            self.failure = Some(CoreError::InitialLoadFailed {
                collection: "groups",
                reason: err.to_string(),
            });
        } else {
            warn!(group, scene, error = %err, "scene observer registration failed, skipping");
            if let Some(tracker) = self.scene_trackers.get_mut(&group) {
                tracker.forget(scene);
            }
            self.inner.emit(GatewayEvent::ObserveError {
                path,
                reason: err.to_string(),
            });
        }
    }

    fn report(&mut self, path: String, err: CoreError) {
        let loading = self.loading();
        if loading {
            self.failure = Some(CoreError::InitialLoadFailed {
                collection: "groups",
                reason: err.to_string(),
            });
        } else {
            warn!(path, error = %err, "group observation error");
            self.inner.emit(GatewayEvent::ObserveError {
                path,
                reason: err.to_string(),
            });
        }
    }

    /// Whether the overall initial load is still pending.
    fn loading(&self) -> bool {
        self.done.is_some()
    }

    /// The group collection is loaded once every group item arrived
    /// and every group's scene sub-collection finished its own load.
    fn fully_loaded(&self) -> bool {
        self.tracker.phase() == LoadPhase::Steady
            && self
                .tracker
                .known_ids()
                .all(|id| {
                    self.scene_trackers
                        .get(&id)
                        .is_some_and(|t| t.phase() == LoadPhase::Steady)
                })
    }

    fn maybe_finish(&mut self) {
        if self.done.is_none() {
            return;
        }
        if let Some(failure) = self.failure.take() {
            if let Some(done) = self.done.take() {
                let _ = done.send(Err(failure));
            }
        } else if self.fully_loaded() {
            if let Some(done) = self.done.take() {
                let _ = done.send(Ok(()));
                info!(groups = self.scene_trackers.len(), "group collection loaded");
            }
        }
    }
}
