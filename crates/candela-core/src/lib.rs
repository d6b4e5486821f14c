// candela-core: Schema, reconciliation, and watchdog layer over candela-coap.

pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod ops;
pub mod schema;
pub mod tracker;
pub mod watchdog;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{GatewayClient, GatewayEvent};
pub use config::{GatewayConfig, WatchdogOptions};
pub use error::CoreError;
pub use ops::{OperationProvider, UpdateOutcome};
pub use schema::proxy::{ProxiedDevice, ProxiedLight, ProxiedLightMut};
pub use schema::{Instance, PropValue, PropertyDescriptor, Schema, WireObject};
pub use tracker::{CollectionTracker, IndexDelta, LoadPhase};
pub use watchdog::{ConnectionWatchdog, LivenessProbe, WatchdogEvent};

// Transport boundary types consumers are expected to handle directly.
pub use candela_coap::{CoapResponse, CoapTransport, MessageCode, Method, TransportError};
