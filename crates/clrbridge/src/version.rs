//! Version and wire-contract information.

use crate::bridge::protocol::MAGIC;

/// clrbridge version from Cargo.toml
pub const CLRBRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol revision identified by [`MAGIC`]. There is no negotiation.
pub const PROTOCOL_REVISION: u32 = 1;

pub const BYTE_ORDER: &str = "little-endian";

/// What this client speaks on the wire.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WireInfo {
    pub clrbridge: &'static str,
    pub magic: u16,
    pub protocol_revision: u32,
    pub byte_order: &'static str,
    /// Address of the connected server, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
}

impl Default for WireInfo {
    fn default() -> Self {
        Self {
            clrbridge: CLRBRIDGE_VERSION,
            magic: MAGIC,
            protocol_revision: PROTOCOL_REVISION,
            byte_order: BYTE_ORDER,
            peer: None,
        }
    }
}

impl WireInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connected server address.
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_info_has_crate_version() {
        let info = WireInfo::new();
        assert_eq!(info.clrbridge, CLRBRIDGE_VERSION);
        assert_eq!(info.magic, 0xd00d);
        assert!(info.peer.is_none());
    }

    #[test]
    fn wire_info_serializes() {
        let info = WireInfo {
            clrbridge: "0.1.0",
            ..WireInfo::new().with_peer("127.0.0.1:56789")
        };
        insta::assert_json_snapshot!(info, @r#"
        {
          "clrbridge": "0.1.0",
          "magic": 53261,
          "protocol_revision": 1,
          "byte_order": "little-endian",
          "peer": "127.0.0.1:56789"
        }
        "#);
    }
}
