// ── Core error types ──
//
// User-facing errors from candela-core. Consumers never see raw
// transport failures directly; the `From<TransportError>` impl
// translates them into domain-appropriate variants.

use candela_coap::{MessageCode, TransportError};
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Gateway rejected the supplied identity/pre-shared key")]
    Authentication,

    #[error("Not connected to the gateway")]
    NotConnected,

    #[error("Request to {path} timed out")]
    Timeout { path: String },

    // ── Observation errors ───────────────────────────────────────────
    #[error("Could not register observer for {path}: {reason}")]
    ObserveFailed { path: String, reason: String },

    #[error("Initial load of {collection} failed: {reason}")]
    InitialLoadFailed {
        collection: &'static str,
        reason: String,
    },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("{kind} {id} is not tracked by this client")]
    UnknownResource { kind: &'static str, id: u32 },

    #[error("Gateway answered {path} with unexpected code {code}")]
    Protocol { path: String, code: MessageCode },

    #[error("Malformed payload for {path}: {reason}")]
    Payload { path: String, reason: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    // ── Watchdog errors ──────────────────────────────────────────────
    #[error("Watchdog is already running")]
    WatchdogRunning,
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<TransportError> for CoreError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { path } => CoreError::Timeout { path },
            TransportError::Dtls { reason } => CoreError::Config {
                message: format!("DTLS session error: {reason}"),
            },
            TransportError::ObserveRejected { path, reason } => {
                CoreError::ObserveFailed { path, reason }
            }
            TransportError::UnexpectedCode { path, code } => CoreError::Protocol { path, code },
            TransportError::PayloadDecode { path, reason } => CoreError::Payload { path, reason },
            TransportError::NotConnected => CoreError::NotConnected,
        }
    }
}
