// ── Transport error types ──
//
// Failures a CoAP transport implementation can surface to the core.
// One variant per failure class the consumer dispatches on; anything
// finer-grained stays inside the implementation.

use thiserror::Error;

use crate::transport::MessageCode;

/// Errors produced by a [`CoapTransport`](crate::CoapTransport)
/// implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {path} timed out")]
    Timeout { path: String },

    #[error("DTLS session error: {reason}")]
    Dtls { reason: String },

    #[error("could not register observer for {path}: {reason}")]
    ObserveRejected { path: String, reason: String },

    #[error("unexpected response code {code} for {path}")]
    UnexpectedCode { path: String, code: MessageCode },

    #[error("payload of {path} is not valid JSON: {reason}")]
    PayloadDecode { path: String, reason: String },

    #[error("transport is not connected")]
    NotConnected,
}
