//! Transport negotiation
//!
//! A serving plugin needs a listener before it can tell its parent where to
//! connect. Two transports are supported:
//!
//! - TCP: scan a port range and take the first port that binds
//! - Unix: bind a freshly named socket under the system temp directory
//!
//! Port scanning is not atomic with respect to other processes. A port found
//! free may be taken before the bind completes; the scan simply moves on.

use crate::config::{PortRange, TransportConfig};
use crate::error::{PluginError, Result};
use crate::handshake::Handshake;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use tether_core::SocketKind;
use tokio::net::{TcpListener, UnixListener};
use tracing::{debug, info};

/// Removes a Unix socket file when dropped
///
/// Held for as long as the listener serves, so the socket path disappears on
/// every exit path, including early returns and panics that unwind.
#[derive(Debug)]
pub struct SocketPathGuard {
    path: PathBuf,
}

impl SocketPathGuard {
    /// Socket file removed on drop
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketPathGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed unix socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => debug!(path = %self.path.display(), error = %e, "Could not remove unix socket"),
        }
    }
}

/// A bound listener ready to be handed to the gRPC server
#[derive(Debug)]
pub enum PluginListener {
    /// Listener on a scanned TCP port
    Tcp(TcpListener),
    /// Listener on a fresh socket file
    Unix {
        /// Bound listener
        listener: UnixListener,
        /// Removes the socket file once serving ends
        guard: SocketPathGuard,
    },
}

impl PluginListener {
    /// Transport this listener accepts on
    pub fn socket_kind(&self) -> SocketKind {
        match self {
            PluginListener::Tcp(_) => SocketKind::Tcp,
            PluginListener::Unix { .. } => SocketKind::Unix,
        }
    }

    /// Port of a TCP listener, `None` for Unix sockets
    pub fn port(&self) -> Option<u16> {
        match self {
            PluginListener::Tcp(listener) => listener.local_addr().ok().map(|addr| addr.port()),
            PluginListener::Unix { .. } => None,
        }
    }

    /// Path of a Unix socket, `None` for TCP
    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            PluginListener::Tcp(_) => None,
            PluginListener::Unix { guard, .. } => Some(guard.path()),
        }
    }
}

/// Bind the first free port in `range` on `ip`
pub async fn bind_tcp(range: PortRange, ip: IpAddr) -> Result<TcpListener> {
    for port in range.ports() {
        match TcpListener::bind((ip, port)).await {
            Ok(listener) => {
                debug!(port, "Bound TCP port");
                return Ok(listener);
            }
            Err(e) => debug!(port, error = %e, "Port unavailable"),
        }
    }

    Err(PluginError::PortExhausted {
        min: range.min,
        max: range.max,
    })
}

/// Path for a new socket in `dir`
///
/// Kept short: Unix socket paths are limited to roughly 100 bytes.
pub fn unique_socket_path(dir: &Path) -> PathBuf {
    let id = ulid::Ulid::new().to_string().to_lowercase();
    dir.join(format!("tether-{id}.sock"))
}

/// Bind a Unix socket with a fresh name in `dir`
pub fn bind_unix(dir: &Path) -> Result<(UnixListener, SocketPathGuard)> {
    let path = unique_socket_path(dir);
    let listener = UnixListener::bind(&path).map_err(|source| PluginError::SocketCreation {
        path: path.clone(),
        source,
    })?;

    debug!(path = %path.display(), "Bound unix socket");
    Ok((listener, SocketPathGuard { path }))
}

/// First non-loopback IPv4 address of this machine
pub fn local_ipv4() -> Result<Ipv4Addr> {
    let interfaces = get_if_addrs::get_if_addrs()?;

    interfaces
        .iter()
        .filter(|iface| !iface.is_loopback())
        .find_map(|iface| match iface.ip() {
            IpAddr::V4(ip) if !ip.is_loopback() => Some(ip),
            _ => None,
        })
        .ok_or(PluginError::NoLocalAddress)
}

/// Bind a listener for `transport` and build the handshake describing it
///
/// TCP listens on all interfaces and advertises `bind_host` when given,
/// otherwise the first non-loopback IPv4 address.
pub async fn negotiate(
    transport: &TransportConfig,
    bind_host: Option<&str>,
) -> Result<(PluginListener, Handshake)> {
    match transport {
        TransportConfig::Tcp(range) => {
            let listener = bind_tcp(*range, IpAddr::V4(Ipv4Addr::UNSPECIFIED)).await?;
            let port = listener.local_addr()?.port();
            let host = match bind_host {
                Some(host) => host.to_string(),
                None => local_ipv4()?.to_string(),
            };
            let handshake = Handshake::new(SocketKind::Tcp, format!("tcp://{host}:{port}"));
            info!(address = %handshake.address, "Negotiated TCP transport");
            Ok((PluginListener::Tcp(listener), handshake))
        }
        TransportConfig::Unix => {
            let (listener, guard) = bind_unix(&std::env::temp_dir())?;
            let handshake =
                Handshake::new(SocketKind::Unix, guard.path().display().to_string());
            info!(address = %handshake.address, "Negotiated unix transport");
            Ok((PluginListener::Unix { listener, guard }, handshake))
        }
    }
}
