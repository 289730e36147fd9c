//! Discovery catalog storage
//!
//! Maps plugin names to the address they can be dialed on. A loader that
//! spawns a plugin records it here, and the catalog gRPC service exposes the
//! same store to other processes.
//!
//! # Architecture
//!
//! ```text
//! Loader ──add("greeter")──►┐
//!                           ├──► CatalogStore ◄──get("greeter")── any caller
//! Catalog RPC Add ─────────►┘
//! ```
//!
//! Entries are never removed: a name maps to at most one endpoint and the
//! last write wins.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Transport a plugin endpoint listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketKind {
    /// TCP `host:port`
    Tcp,
    /// Unix domain socket path
    Unix,
}

impl SocketKind {
    /// Wire/env spelling (`"tcp"` or `"unix"`)
    pub fn as_str(&self) -> &'static str {
        match self {
            SocketKind::Tcp => "tcp",
            SocketKind::Unix => "unix",
        }
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SocketKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(SocketKind::Tcp),
            "unix" => Ok(SocketKind::Unix),
            other => Err(format!(
                "unknown socket type '{other}' (expected 'tcp' or 'unix')"
            )),
        }
    }
}

/// One resolvable plugin endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceInfo {
    /// Dialable address: `tcp://host:port` or a socket path
    pub address: String,
    /// How to dial `address`
    pub socket_kind: SocketKind,
}

impl ServiceInfo {
    /// Create a new endpoint record
    pub fn new(address: impl Into<String>, socket_kind: SocketKind) -> Self {
        Self {
            address: address.into(),
            socket_kind,
        }
    }

    /// Endpoint reachable over TCP
    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new(address, SocketKind::Tcp)
    }

    /// Endpoint reachable over a Unix domain socket
    pub fn unix(path: impl Into<String>) -> Self {
        Self::new(path, SocketKind::Unix)
    }
}

/// Storage backend for the discovery catalog
///
/// Implementations must be thread-safe: the loader, the catalog gRPC service
/// and arbitrary readers share one instance.
pub trait CatalogStore: Send + Sync {
    /// Record `info` under `name`, replacing any previous entry
    ///
    /// Returns `false` if the store refused the write. The in-memory store
    /// never refuses.
    fn add(&self, name: &str, info: ServiceInfo) -> bool;

    /// Look up the endpoint registered under `name`
    fn get(&self, name: &str) -> Option<ServiceInfo>;

    /// Names of all registered plugins (for debugging)
    fn names(&self) -> Vec<String>;

    /// Number of registered plugins
    fn len(&self) -> usize {
        self.names().len()
    }

    /// Whether no plugin is registered
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory catalog for single-process and test deployments
///
/// One mutex guards both reads and writes. Catalogs are written rarely (once
/// per plugin start) and read occasionally, so contention is not a concern.
pub struct MemoryCatalogStore {
    services: Mutex<HashMap<String, ServiceInfo>>,
}

impl MemoryCatalogStore {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogStore for MemoryCatalogStore {
    fn add(&self, name: &str, info: ServiceInfo) -> bool {
        let previous = self.services.lock().insert(name.to_string(), info);
        if let Some(previous) = previous {
            tracing::debug!(
                name = %name,
                previous = %previous.address,
                "Catalog entry replaced"
            );
        }
        true
    }

    fn get(&self, name: &str) -> Option<ServiceInfo> {
        self.services.lock().get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn len(&self) -> usize {
        self.services.lock().len()
    }
}
