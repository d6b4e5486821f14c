// ── Transport collaborator contract ──
//
// The secure request/observe transport candela-core drives. An
// implementation owns the DTLS session and the CoAP message layer;
// the core only sees resource paths, methods, and responses.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;

/// CoAP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// CoAP response code, collapsed to the classes the core dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCode {
    /// 2.01 Created
    Created,
    /// 2.04 Changed
    Changed,
    /// 2.05 Content
    Content,
    /// 4.04 Not Found
    NotFound,
    /// Any other code, carried as `class.detail`.
    Other(u8, u8),
}

impl MessageCode {
    /// Whether this code signals success (class 2).
    pub fn is_success(self) -> bool {
        matches!(self, Self::Created | Self::Changed | Self::Content)
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "2.01"),
            Self::Changed => write!(f, "2.04"),
            Self::Content => write!(f, "2.05"),
            Self::NotFound => write!(f, "4.04"),
            Self::Other(class, detail) => write!(f, "{class}.{detail:02}"),
        }
    }
}

/// Content-format tag attached to a response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    TextPlain,
    Json,
    Other(u16),
}

/// A response delivered by the transport, either to a one-shot request
/// or to a registered observer.
#[derive(Debug, Clone)]
pub struct CoapResponse {
    pub code: MessageCode,
    pub format: Option<ContentFormat>,
    pub payload: Vec<u8>,
}

impl CoapResponse {
    /// Decode the payload as JSON.
    pub fn json(&self, path: &str) -> Result<serde_json::Value, TransportError> {
        serde_json::from_slice(&self.payload).map_err(|e| TransportError::PayloadDecode {
            path: path.to_owned(),
            reason: e.to_string(),
        })
    }
}

/// Callback invoked once per update of an observed resource.
pub type ObserveCallback = Arc<dyn Fn(CoapResponse) + Send + Sync>;

/// The secure request/observe transport the core consumes.
///
/// All methods suspend until the network responds; timeouts belong to
/// the implementation and surface as [`TransportError::Timeout`] (or a
/// failed ping). Implementations must be safe to call concurrently.
#[async_trait]
pub trait CoapTransport: Send + Sync {
    /// Negotiate a DTLS session with the gateway. Returns `false` when
    /// the gateway rejects the credentials.
    async fn connect(&self, identity: &str, psk: &str) -> Result<bool, TransportError>;

    /// Register `callback` to be invoked once per update of `path`.
    ///
    /// Registration is accepted or rejected before this returns; the
    /// first callback invocation carries the current resource state.
    async fn observe(
        &self,
        path: &str,
        method: Method,
        callback: ObserveCallback,
    ) -> Result<(), TransportError>;

    /// Remove a previously registered observer. Unknown paths are a
    /// no-op; an in-flight callback for `path` may still be delivered.
    async fn stop_observing(&self, path: &str);

    /// Perform a one-shot request.
    async fn request(
        &self,
        path: &str,
        method: Method,
        payload: Option<Vec<u8>>,
    ) -> Result<CoapResponse, TransportError>;

    /// Probe gateway liveness. Never errors: an unanswered ping within
    /// `timeout` (or the implementation default) is `false`.
    async fn ping(&self, timeout: Option<Duration>) -> bool;

    /// Discard the current session, forcing re-negotiation on next use.
    async fn reset(&self);
}
