//! Environment configuration for plugin processes
//!
//! The loader communicates with a freshly spawned plugin only through
//! environment variables (inbound) and the handshake line (outbound). This
//! module owns the inbound half.
//!
//! | Variable | Meaning |
//! |---|---|
//! | `PLUGIN_SOCKET_TYPE` | `tcp` or `unix` |
//! | `PLUGIN_MIN_PORT` / `PLUGIN_MAX_PORT` | TCP scan range, min inclusive, max exclusive |
//! | `PLUGIN_DISCOVERY_ADDRESS` | catalog service to self-register with |
//! | `PLUGIN_DISCOVERY_REQUIRED` | `true` makes a failed registration fatal |

use crate::error::{PluginError, Result};
use tether_core::SocketKind;

/// Requested transport, `tcp` or `unix`
pub const PLUGIN_SOCKET_TYPE: &str = "PLUGIN_SOCKET_TYPE";
/// First port of the TCP scan
pub const PLUGIN_MIN_PORT: &str = "PLUGIN_MIN_PORT";
/// Exclusive end of the TCP scan
pub const PLUGIN_MAX_PORT: &str = "PLUGIN_MAX_PORT";
/// Catalog service to self-register with
pub const PLUGIN_DISCOVERY_ADDRESS: &str = "PLUGIN_DISCOVERY_ADDRESS";
/// Makes a failed self-registration fatal
pub const PLUGIN_DISCOVERY_REQUIRED: &str = "PLUGIN_DISCOVERY_REQUIRED";

/// First port of the default TCP scan range handed to spawned plugins
pub const DEFAULT_MIN_PORT: u32 = 10000;
/// Exclusive end of the default TCP scan range
pub const DEFAULT_MAX_PORT: u32 = 15000;
/// Largest accepted exclusive upper bound, so port 65535 can be scanned
pub const PORT_LIMIT: u32 = u16::MAX as u32 + 1;

/// TCP port scan bounds, `min` inclusive and `max` exclusive
///
/// The bounds are `u32` because the exclusive end may be 65536.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    /// First port tried
    pub min: u32,
    /// One past the last port tried
    pub max: u32,
}

impl PortRange {
    /// Create a validated range (`0 < min < max <= 65536`)
    pub fn new(min: u32, max: u32) -> Result<Self> {
        if min == 0 {
            return Err(PluginError::Config(
                "minimum port must be a positive integer".to_string(),
            ));
        }
        if min >= max {
            return Err(PluginError::Config(format!(
                "minimum port {min} must be lower than maximum port {max}"
            )));
        }
        if max > PORT_LIMIT {
            return Err(PluginError::Config(format!(
                "maximum port {max} is above {PORT_LIMIT}"
            )));
        }
        Ok(Self { min, max })
    }

    /// Ports in scan order
    pub fn ports(&self) -> impl Iterator<Item = u16> {
        (self.min..self.max.min(PORT_LIMIT)).filter_map(|port| u16::try_from(port).ok())
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_PORT,
            max: DEFAULT_MAX_PORT,
        }
    }
}

/// Transport requested by the launcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportConfig {
    /// Scan the range for a free TCP port
    Tcp(PortRange),
    /// Listen on a fresh Unix domain socket
    Unix,
}

impl TransportConfig {
    /// Socket kind announced in the handshake
    pub fn socket_kind(&self) -> SocketKind {
        match self {
            TransportConfig::Tcp(_) => SocketKind::Tcp,
            TransportConfig::Unix => SocketKind::Unix,
        }
    }
}

/// Everything a serving plugin reads from its environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    /// Transport to negotiate
    pub transport: TransportConfig,
    /// Catalog service to self-register with
    pub discovery_address: Option<String>,
    /// Exit when self-registration fails instead of logging a warning
    pub discovery_required: bool,
}

impl ServeConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup function
    ///
    /// Used by tests so they don't have to mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let socket_type = lookup(PLUGIN_SOCKET_TYPE).ok_or_else(|| {
            PluginError::Config(format!(
                "{PLUGIN_SOCKET_TYPE} must be set to 'tcp' or 'unix'"
            ))
        })?;

        let kind: SocketKind = socket_type
            .trim()
            .parse()
            .map_err(|e| PluginError::Config(format!("{PLUGIN_SOCKET_TYPE}: {e}")))?;

        let transport = match kind {
            SocketKind::Tcp => {
                let min = parse_port(&lookup, PLUGIN_MIN_PORT)?;
                let max = parse_port(&lookup, PLUGIN_MAX_PORT)?;
                TransportConfig::Tcp(PortRange::new(min, max)?)
            }
            SocketKind::Unix => TransportConfig::Unix,
        };

        let discovery_address = lookup(PLUGIN_DISCOVERY_ADDRESS)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let discovery_required = match lookup(PLUGIN_DISCOVERY_REQUIRED) {
            None => false,
            Some(value) => parse_bool(PLUGIN_DISCOVERY_REQUIRED, &value)?,
        };

        Ok(Self {
            transport,
            discovery_address,
            discovery_required,
        })
    }
}

fn parse_port<F>(lookup: &F, key: &str) -> Result<u32>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)
        .ok_or_else(|| PluginError::Config(format!("{key} is required for tcp transport")))?;
    raw.trim()
        .parse::<u32>()
        .map_err(|e| PluginError::Config(format!("{key} could not be parsed as a port: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "" | "0" | "false" | "no" => Ok(false),
        other => Err(PluginError::Config(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_unix_config() {
        let config =
            ServeConfig::from_lookup(lookup_from(&[("PLUGIN_SOCKET_TYPE", "unix")])).unwrap();
        assert_eq!(config.transport, TransportConfig::Unix);
        assert_eq!(config.discovery_address, None);
        assert!(!config.discovery_required);
    }

    #[test]
    fn test_tcp_config() {
        let config = ServeConfig::from_lookup(lookup_from(&[
            ("PLUGIN_SOCKET_TYPE", "tcp"),
            ("PLUGIN_MIN_PORT", "10000"),
            ("PLUGIN_MAX_PORT", "15000"),
        ]))
        .unwrap();
        assert_eq!(
            config.transport,
            TransportConfig::Tcp(PortRange {
                min: 10000,
                max: 15000
            })
        );
        assert_eq!(config.transport.socket_kind(), SocketKind::Tcp);
    }

    #[test]
    fn test_unix_ignores_port_range() {
        let config = ServeConfig::from_lookup(lookup_from(&[
            ("PLUGIN_SOCKET_TYPE", "unix"),
            ("PLUGIN_MIN_PORT", "not-a-number"),
        ]))
        .unwrap();
        assert_eq!(config.transport, TransportConfig::Unix);
    }

    #[test]
    fn test_missing_socket_type() {
        let err = ServeConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, PluginError::Config(_)));
    }

    #[test]
    fn test_unknown_socket_type() {
        let err =
            ServeConfig::from_lookup(lookup_from(&[("PLUGIN_SOCKET_TYPE", "udp")])).unwrap_err();
        assert!(err.to_string().contains("udp"));
    }

    #[test]
    fn test_tcp_requires_ports() {
        let err = ServeConfig::from_lookup(lookup_from(&[
            ("PLUGIN_SOCKET_TYPE", "tcp"),
            ("PLUGIN_MIN_PORT", "10000"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PLUGIN_MAX_PORT"));
    }

    #[test]
    fn test_tcp_rejects_unparseable_port() {
        let err = ServeConfig::from_lookup(lookup_from(&[
            ("PLUGIN_SOCKET_TYPE", "tcp"),
            ("PLUGIN_MIN_PORT", "ten"),
            ("PLUGIN_MAX_PORT", "15000"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PLUGIN_MIN_PORT"));
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(PortRange::new(15000, 10000).is_err());
        assert!(PortRange::new(10000, 10000).is_err());
        assert!(PortRange::new(0, 10).is_err());
        assert!(PortRange::new(10000, 10001).is_ok());
        assert!(PortRange::new(65535, 65537).is_err());
    }

    #[test]
    fn test_range_reaches_last_port() {
        let config = ServeConfig::from_lookup(lookup_from(&[
            ("PLUGIN_SOCKET_TYPE", "tcp"),
            ("PLUGIN_MIN_PORT", "65534"),
            ("PLUGIN_MAX_PORT", "65536"),
        ]))
        .unwrap();
        let TransportConfig::Tcp(range) = config.transport else {
            panic!("expected tcp transport");
        };
        assert_eq!(range.ports().collect::<Vec<_>>(), vec![65534, 65535]);
    }

    #[test]
    fn test_discovery_settings() {
        let config = ServeConfig::from_lookup(lookup_from(&[
            ("PLUGIN_SOCKET_TYPE", "unix"),
            ("PLUGIN_DISCOVERY_ADDRESS", " 127.0.0.1:50051 "),
            ("PLUGIN_DISCOVERY_REQUIRED", "true"),
        ]))
        .unwrap();
        assert_eq!(config.discovery_address.as_deref(), Some("127.0.0.1:50051"));
        assert!(config.discovery_required);
    }

    #[test]
    fn test_empty_discovery_address_is_unset() {
        let config = ServeConfig::from_lookup(lookup_from(&[
            ("PLUGIN_SOCKET_TYPE", "unix"),
            ("PLUGIN_DISCOVERY_ADDRESS", ""),
        ]))
        .unwrap();
        assert_eq!(config.discovery_address, None);
    }

    #[test]
    fn test_bad_discovery_required_flag() {
        let err = ServeConfig::from_lookup(lookup_from(&[
            ("PLUGIN_SOCKET_TYPE", "unix"),
            ("PLUGIN_DISCOVERY_REQUIRED", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(err, PluginError::Config(_)));
    }
}
