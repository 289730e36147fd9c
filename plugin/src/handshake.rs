//! Handshake line
//!
//! The first line a plugin writes to stdout tells the parent how to reach it:
//!
//! ```text
//! {"socket_type":"unix","address":"/tmp/tether-01j9....sock"}
//! ```
//!
//! Nothing else may be written to stdout before it.

use crate::error::{PluginError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tether_core::{ServiceInfo, SocketKind};

/// Transport announcement written once by the plugin and read once by the loader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// How to dial `address`
    pub socket_type: SocketKind,
    /// `tcp://host:port` or a socket path; absent reads as empty
    #[serde(default)]
    pub address: String,
}

impl Handshake {
    /// Announcement for an endpoint of `kind` reachable at `address`
    pub fn new(kind: SocketKind, address: impl Into<String>) -> Self {
        Self {
            socket_type: kind,
            address: address.into(),
        }
    }

    /// Parse one handshake line
    ///
    /// The line must be a JSON object naming a known socket type. An empty
    /// or absent address is [`PluginError::MissingAddress`].
    pub fn parse(line: &str) -> Result<Self> {
        let handshake: Handshake = serde_json::from_str(line.trim())
            .map_err(|e| PluginError::HandshakeParse(e.to_string()))?;

        if handshake.address.trim().is_empty() {
            return Err(PluginError::MissingAddress);
        }

        Ok(handshake)
    }

    /// Catalog record for the announced endpoint
    pub fn service_info(&self) -> ServiceInfo {
        ServiceInfo::new(self.address.clone(), self.socket_type)
    }

    /// Write the handshake as a single line and flush
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let mut line = serde_json::to_string(self)
            .map_err(|e| PluginError::HandshakeParse(e.to_string()))?;
        line.push('\n');
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}
