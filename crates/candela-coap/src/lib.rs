// candela-coap: transport boundary for CoAP smart-home gateway clients.
//
// This crate defines the contract a secure CoAP transport must fulfil
// for candela-core to consume it. It deliberately contains no DTLS or
// socket code -- implementations live outside this workspace.

pub mod error;
pub mod path;
pub mod transport;

pub use error::TransportError;
pub use path::{Endpoint, GatewayUrl};
pub use transport::{
    CoapResponse, CoapTransport, ContentFormat, MessageCode, Method, ObserveCallback,
};
