//! Host side of the lifecycle
//!
//! [`load`] either dials a plugin that is already running somewhere
//! (`LoadOptions::address`) or launches the executable at
//! `LoadOptions::path` and waits for its handshake:
//!
//! ```text
//! spawn ──► read handshake ──► dial ──► catalog.add ──► typed client
//!   │            │               │
//!   env vars     one line,       unix socket or tcp,
//!                bounded         bounded
//! ```
//!
//! Any failure after the spawn kills the child before the error is returned.

use crate::config::{
    PLUGIN_DISCOVERY_ADDRESS, PLUGIN_MAX_PORT, PLUGIN_MIN_PORT, PLUGIN_SOCKET_TYPE, PortRange,
};
use crate::connect::{DEFAULT_DIAL_TIMEOUT, PluginAddress, connect};
use crate::error::{PluginError, Result};
use crate::handshake::Handshake;
use crate::plugin::Plugin;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tether_core::{CatalogStore, ServiceInfo, SocketKind};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tonic::transport::Channel;
use tracing::{debug, info, warn};

/// Default bound on waiting for the handshake line
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where to find a plugin and how long to wait for it
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Catalog name of the plugin
    pub name: String,
    /// Executable to launch when no address is given
    pub path: PathBuf,
    /// Address of an already running plugin; skips the launch
    pub address: Option<String>,
    /// Bound on waiting for the child's handshake line
    pub handshake_timeout: Duration,
    /// Bound on connecting to the plugin
    pub dial_timeout: Duration,
    /// TCP scan range passed to the child
    pub port_range: PortRange,
    /// Catalog service the child should register with
    pub discovery_address: Option<String>,
}

impl LoadOptions {
    /// Options for launching the executable at `path`
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            address: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            port_range: PortRange::default(),
            discovery_address: None,
        }
    }

    /// Options for dialing a plugin that is already running at `address`
    pub fn remote(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self::new(name, PathBuf::new()).address(address)
    }

    /// Dial `address` instead of launching `path`
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the dial timeout
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Set the TCP range used if the child falls back to TCP
    pub fn port_range(mut self, range: PortRange) -> Self {
        self.port_range = range;
        self
    }

    /// Ask the child to register with this catalog service
    pub fn discovery_address(mut self, address: impl Into<String>) -> Self {
        self.discovery_address = Some(address.into());
        self
    }
}

/// A loaded plugin: its typed client plus the child process, if we launched one
///
/// The child is killed when this value is dropped.
#[derive(Debug)]
pub struct LoadedPlugin<C> {
    client: C,
    address: PluginAddress,
    child: Option<Child>,
}

impl<C> LoadedPlugin<C> {
    /// Typed client for the plugin's services
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Mutable client, as tonic calls take `&mut self`
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// Address the client is connected to
    pub fn address(&self) -> &PluginAddress {
        &self.address
    }

    /// OS process id of a launched plugin; `None` for remote plugins or after
    /// the process has been reaped
    pub fn process_id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Stop a launched plugin and wait for it to exit
    pub async fn kill(&mut self) -> Result<()> {
        if let Some(child) = self.child.as_mut() {
            child.kill().await?;
            info!(address = %self.address, "Plugin process stopped");
        }
        Ok(())
    }

    /// Split into the client and the child handle
    ///
    /// Keeping the child alive after this is the caller's business.
    pub fn into_parts(self) -> (C, Option<Child>) {
        (self.client, self.child)
    }
}

/// Load a plugin and return its typed client
///
/// With `options.address` set, the plugin is dialed directly and `catalog` is
/// left untouched. Otherwise the executable is launched, and once connected
/// its address is recorded in `catalog` under `options.name`.
pub async fn load<P: Plugin>(
    plugin: &P,
    options: &LoadOptions,
    catalog: &dyn CatalogStore,
) -> Result<LoadedPlugin<P::Client>> {
    match options.address.as_deref() {
        Some(address) => load_remote(plugin, options, address).await,
        None => load_process(plugin, options, catalog).await,
    }
}

async fn load_remote<P: Plugin>(
    plugin: &P,
    options: &LoadOptions,
    address: &str,
) -> Result<LoadedPlugin<P::Client>> {
    let address = PluginAddress::parse(address)?;
    let channel = connect(&address, options.dial_timeout).await?;

    info!(name = %options.name, address = %address, "Loaded remote plugin");
    Ok(LoadedPlugin {
        client: plugin.client(channel),
        address,
        child: None,
    })
}

async fn load_process<P: Plugin>(
    plugin: &P,
    options: &LoadOptions,
    catalog: &dyn CatalogStore,
) -> Result<LoadedPlugin<P::Client>> {
    let mut command = Command::new(&options.path);
    command
        .env(PLUGIN_SOCKET_TYPE, SocketKind::Unix.as_str())
        .env(PLUGIN_MIN_PORT, options.port_range.min.to_string())
        .env(PLUGIN_MAX_PORT, options.port_range.max.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    if let Some(discovery) = &options.discovery_address {
        command.env(PLUGIN_DISCOVERY_ADDRESS, discovery);
    }

    let mut child = command.spawn().map_err(|source| PluginError::Spawn {
        path: options.path.clone(),
        source,
    })?;
    debug!(
        name = %options.name,
        path = %options.path.display(),
        pid = ?child.id(),
        "Spawned plugin process"
    );

    match connect_child(&mut child, options).await {
        Ok((info, address, channel)) => {
            if !catalog.add(&options.name, info.clone()) {
                stop(&mut child, &options.name).await;
                return Err(PluginError::CatalogAddFailed(options.name.clone()));
            }

            info!(
                name = %options.name,
                address = %info.address,
                pid = ?child.id(),
                "Loaded plugin"
            );
            Ok(LoadedPlugin {
                client: plugin.client(channel),
                address,
                child: Some(child),
            })
        }
        Err(e) => {
            warn!(name = %options.name, error = %e, "Plugin failed to start");
            stop(&mut child, &options.name).await;
            Err(e)
        }
    }
}

/// Read the child's handshake and dial the address it announces
async fn connect_child(
    child: &mut Child,
    options: &LoadOptions,
) -> Result<(ServiceInfo, PluginAddress, Channel)> {
    let stdout = child.stdout.take().ok_or_else(|| {
        PluginError::Io(std::io::Error::other("plugin stdout was not captured"))
    })?;
    let mut lines = BufReader::new(stdout).lines();

    let line = tokio::time::timeout(options.handshake_timeout, lines.next_line())
        .await
        .map_err(|_| PluginError::HandshakeTimeout(options.handshake_timeout))??
        .ok_or(PluginError::HandshakeClosed)?;

    let handshake = Handshake::parse(&line)?;
    debug!(name = %options.name, address = %handshake.address, "Received handshake");
    forward_stdout(options.name.clone(), lines);

    let info = handshake.service_info();
    let address = PluginAddress::from_service_info(&info)?;
    let channel = connect(&address, options.dial_timeout).await?;
    Ok((info, address, channel))
}

/// Keep draining the child's stdout so it never blocks on a full pipe
fn forward_stdout(name: String, mut lines: Lines<BufReader<ChildStdout>>) {
    tokio::spawn(async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => debug!(plugin = %name, line = %line, "Plugin stdout"),
                Ok(None) => break,
                Err(e) => {
                    debug!(plugin = %name, error = %e, "Plugin stdout closed");
                    break;
                }
            }
        }
    });
}

async fn stop(child: &mut Child, name: &str) {
    if let Err(e) = child.kill().await {
        debug!(plugin = %name, error = %e, "Could not kill plugin process");
    }
}
