// ── Resource path construction ──
//
// The gateway exposes a numerically-keyed resource tree. Collections
// live at a fixed numeric endpoint, items at `{endpoint}/{id}`, and
// nested items (a group's scenes) at `{endpoint}/{id}/{id2}`.

use std::fmt;

use url::Url;

use crate::error::TransportError;

/// Default CoAPS port of the gateway.
pub const DEFAULT_SECURE_PORT: u16 = 5684;

/// Fixed numeric endpoints of the gateway resource tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Devices,
    Groups,
    Scenes,
    Notifications,
    Gateway,
}

impl Endpoint {
    /// The wire-level numeric path segment.
    pub fn segment(self) -> &'static str {
        match self {
            Self::Devices => "15001",
            Self::Groups => "15004",
            Self::Scenes => "15005",
            Self::Notifications => "15006",
            Self::Gateway => "15011",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Base address of a gateway, from which resource paths are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayUrl {
    base: Url,
}

impl GatewayUrl {
    /// Build the base `coaps://{host}:{port}/` address.
    pub fn new(host: &str, port: u16) -> Result<Self, TransportError> {
        let base = Url::parse(&format!("coaps://{host}:{port}/")).map_err(|e| {
            TransportError::Dtls {
                reason: format!("invalid gateway address {host}:{port}: {e}"),
            }
        })?;
        Ok(Self { base })
    }

    /// Base address with the default secure port.
    pub fn with_default_port(host: &str) -> Result<Self, TransportError> {
        Self::new(host, DEFAULT_SECURE_PORT)
    }

    /// Path of a collection index, e.g. `coaps://gw:5684/15001`.
    pub fn collection(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base, endpoint.segment())
    }

    /// Path of a single item, e.g. `coaps://gw:5684/15001/65536`.
    pub fn item(&self, endpoint: Endpoint, id: u32) -> String {
        format!("{}{}/{id}", self.base, endpoint.segment())
    }

    /// Path of a nested item, e.g. `coaps://gw:5684/15005/131073/196608`.
    pub fn nested(&self, endpoint: Endpoint, id: u32, id2: u32) -> String {
        format!("{}{}/{id}/{id2}", self.base, endpoint.segment())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn collection_and_item_paths() {
        let url = GatewayUrl::with_default_port("gw.local").unwrap();
        assert_eq!(url.collection(Endpoint::Devices), "coaps://gw.local:5684/15001");
        assert_eq!(url.item(Endpoint::Devices, 65536), "coaps://gw.local:5684/15001/65536");
    }

    #[test]
    fn nested_scene_path() {
        let url = GatewayUrl::new("192.168.0.4", 5684).unwrap();
        assert_eq!(
            url.nested(Endpoint::Scenes, 131_073, 196_608),
            "coaps://192.168.0.4:5684/15005/131073/196608"
        );
    }

    #[test]
    fn invalid_host_is_rejected() {
        assert!(GatewayUrl::new("not a host", 5684).is_err());
    }
}
