// Shared test double: a scripted in-memory transport. Observers are
// registered into a map and fed by the test through `push`; one-shot
// requests are recorded for assertions and answered from a canned
// response table.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use candela_core::{
    CoapResponse, CoapTransport, GatewayEvent, MessageCode, Method, TransportError,
};
use candela_coap::{ContentFormat, ObserveCallback};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub method: Method,
    pub payload: Option<Value>,
}

#[derive(Default)]
struct MockState {
    observers: HashMap<String, ObserveCallback>,
    requests: Vec<RecordedRequest>,
    responses: HashMap<String, CoapResponse>,
    failing_observe_paths: HashSet<String>,
    stopped: Vec<String>,
    reject_credentials: bool,
    ping_answer: bool,
    resets: u32,
}

#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().ping_answer = true;
        transport
    }

    /// Make observer registration fail for `path`.
    pub fn fail_observe(&self, path: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_observe_paths
            .insert(path.to_owned());
    }

    pub fn reject_credentials(&self) {
        self.state.lock().unwrap().reject_credentials = true;
    }

    /// Deliver a 2.05 update to the observer of `path`, waiting for the
    /// registration if it has not happened yet.
    pub async fn push(&self, path: &str, body: Value) {
        let callback = self.wait_for_observer(path).await;
        callback(CoapResponse {
            code: MessageCode::Content,
            format: Some(ContentFormat::Json),
            payload: serde_json::to_vec(&body).unwrap(),
        });
    }

    /// Deliver a payload-less response with an arbitrary code.
    pub async fn push_code(&self, path: &str, code: MessageCode) {
        let callback = self.wait_for_observer(path).await;
        callback(CoapResponse {
            code,
            format: None,
            payload: Vec::new(),
        });
    }

    pub async fn wait_for_observer(&self, path: &str) -> ObserveCallback {
        for _ in 0..10_000 {
            if let Some(callback) = self.state.lock().unwrap().observers.get(path) {
                return callback.clone();
            }
            tokio::task::yield_now().await;
        }
        panic!("no observer registered for {path}");
    }

    pub fn is_observing(&self, path: &str) -> bool {
        self.state.lock().unwrap().observers.contains_key(path)
    }

    pub fn stopped_paths(&self) -> Vec<String> {
        self.state.lock().unwrap().stopped.clone()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn reset_count(&self) -> u32 {
        self.state.lock().unwrap().resets
    }

    /// Canned response for a one-shot request to `path`. Without one,
    /// requests answer 2.04 with an empty payload.
    pub fn respond(&self, path: &str, response: CoapResponse) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(path.to_owned(), response);
    }
}

#[async_trait]
impl CoapTransport for MockTransport {
    async fn connect(&self, _identity: &str, _psk: &str) -> Result<bool, TransportError> {
        Ok(!self.state.lock().unwrap().reject_credentials)
    }

    async fn observe(
        &self,
        path: &str,
        _method: Method,
        callback: ObserveCallback,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_observe_paths.contains(path) {
            return Err(TransportError::ObserveRejected {
                path: path.to_owned(),
                reason: "scripted rejection".into(),
            });
        }
        state.observers.insert(path.to_owned(), callback);
        Ok(())
    }

    async fn stop_observing(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        state.observers.remove(path);
        state.stopped.push(path.to_owned());
    }

    async fn request(
        &self,
        path: &str,
        method: Method,
        payload: Option<Vec<u8>>,
    ) -> Result<CoapResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        let payload = payload.map(|bytes| serde_json::from_slice(&bytes).unwrap());
        state.requests.push(RecordedRequest {
            path: path.to_owned(),
            method,
            payload,
        });
        Ok(state.responses.get(path).cloned().unwrap_or(CoapResponse {
            code: MessageCode::Changed,
            format: None,
            payload: Vec::new(),
        }))
    }

    async fn ping(&self, _timeout: Option<Duration>) -> bool {
        self.state.lock().unwrap().ping_answer
    }

    async fn reset(&self) {
        self.state.lock().unwrap().resets += 1;
    }
}

/// Receive the next event or fail after a test-sized timeout.
pub async fn next_event(rx: &mut broadcast::Receiver<GatewayEvent>) -> GatewayEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}
