//! Plugin side of the lifecycle
//!
//! ```text
//! bind ──► announce ──► register (optional) ──► serve ──► shutdown
//!  │          │               │                    │
//!  listener   handshake on    catalog Add          tonic server on
//!  bound      stdout          (best effort)        the bound listener
//! ```
//!
//! The listener is bound before the handshake is written, so the parent can
//! dial as soon as it reads the line.

use crate::config::ServeConfig;
use crate::connect::DEFAULT_DIAL_TIMEOUT;
use crate::discovery::DiscoveryClient;
use crate::error::{PluginError, Result};
use crate::handshake::Handshake;
use crate::plugin::Plugin;
use crate::transport::{PluginListener, negotiate};
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tether_core::ServiceInfo;
use tokio_stream::wrappers::{TcpListenerStream, UnixListenerStream};
use tonic::service::RoutesBuilder;
use tonic::transport::Server;
use tracing::{info, warn};

/// How a plugin process presents itself
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Name registered with the discovery catalog
    pub name: String,
    /// Host advertised for TCP; defaults to the first non-loopback IPv4
    pub bind_host: Option<String>,
    /// Bound on dialing the discovery catalog
    pub dial_timeout: Duration,
}

impl ServeOptions {
    /// Options for a plugin registered as `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bind_host: None,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    /// Advertise `host` instead of the detected address
    pub fn bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = Some(host.into());
        self
    }

    /// Set the discovery dial timeout
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }
}

/// A plugin server that has negotiated its transport
///
/// Each step of the lifecycle is a method, so embedders (and tests) can run
/// them individually; [`serve`] runs them all.
#[derive(Debug)]
pub struct PluginServer {
    options: ServeOptions,
    listener: PluginListener,
    handshake: Handshake,
}

impl PluginServer {
    /// Negotiate a listener for `config`
    pub async fn bind(config: &ServeConfig, options: ServeOptions) -> Result<Self> {
        let (listener, handshake) =
            negotiate(&config.transport, options.bind_host.as_deref()).await?;
        Ok(Self {
            options,
            listener,
            handshake,
        })
    }

    /// Handshake announcing the negotiated listener
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// The negotiated listener
    pub fn listener(&self) -> &PluginListener {
        &self.listener
    }

    /// Write the handshake line to `out`
    pub fn announce<W: Write>(&self, out: W) -> Result<()> {
        self.handshake.write_to(out)?;
        info!(
            name = %self.options.name,
            socket_type = %self.handshake.socket_type,
            address = %self.handshake.address,
            "Handshake sent"
        );
        Ok(())
    }

    /// Add this plugin to the catalog at `discovery_address`
    pub async fn register(&self, discovery_address: &str) -> Result<()> {
        let registration_err = |e: PluginError| PluginError::Registration {
            address: discovery_address.to_string(),
            message: e.to_string(),
        };

        let info: ServiceInfo = self.handshake.service_info();
        let mut client = DiscoveryClient::connect(discovery_address, self.options.dial_timeout)
            .await
            .map_err(registration_err)?;
        client
            .add(&self.options.name, &info)
            .await
            .map_err(registration_err)?;

        info!(
            name = %self.options.name,
            discovery = %discovery_address,
            "Registered with discovery server"
        );
        Ok(())
    }

    /// Register per `config`, applying its failure policy
    ///
    /// Without `PLUGIN_DISCOVERY_REQUIRED` a failed registration is logged
    /// and serving continues; the plugin stays reachable through the
    /// handshake address.
    pub async fn register_with_discovery(&self, config: &ServeConfig) -> Result<()> {
        let Some(address) = config.discovery_address.as_deref() else {
            return Ok(());
        };

        match self.register(address).await {
            Ok(()) => Ok(()),
            Err(e) if config.discovery_required => Err(e),
            Err(e) => {
                warn!(error = %e, "Discovery registration failed, continuing without it");
                Ok(())
            }
        }
    }

    /// Attach the plugin's services and serve until `shutdown` resolves
    pub async fn serve<P, F>(self, plugin: &P, shutdown: F) -> Result<()>
    where
        P: Plugin,
        F: Future<Output = ()> + Send,
    {
        let mut routes = RoutesBuilder::default();
        plugin.server(&mut routes)?;
        let router = Server::builder().add_routes(routes.routes());

        info!(
            name = %self.options.name,
            address = %self.handshake.address,
            "Plugin serving"
        );

        match self.listener {
            PluginListener::Tcp(listener) => {
                router
                    .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
                    .await?;
            }
            PluginListener::Unix { listener, guard } => {
                let _guard = guard;
                router
                    .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown)
                    .await?;
            }
        }

        info!(name = %self.options.name, "Plugin stopped");
        Ok(())
    }
}

/// Serve `plugin` as configured by the environment until SIGINT or SIGTERM
///
/// Intended as the body of a plugin binary's `main`. The handshake goes to
/// stdout, so the binary must not print anything else there.
pub async fn serve<P: Plugin>(plugin: P, options: ServeOptions) -> Result<()> {
    serve_with_shutdown(plugin, options, crate::shutdown::shutdown_signal()).await
}

/// Like [`serve`], stopping when `shutdown` resolves
pub async fn serve_with_shutdown<P, F>(
    plugin: P,
    options: ServeOptions,
    shutdown: F,
) -> Result<()>
where
    P: Plugin,
    F: Future<Output = ()> + Send,
{
    let config = ServeConfig::from_env()?;
    run(&plugin, &config, options, std::io::stdout(), shutdown).await
}

/// Full lifecycle with explicit configuration and handshake sink
pub async fn run<P, W, F>(
    plugin: &P,
    config: &ServeConfig,
    options: ServeOptions,
    handshake_out: W,
    shutdown: F,
) -> Result<()>
where
    P: Plugin,
    W: Write,
    F: Future<Output = ()> + Send,
{
    let server = PluginServer::bind(config, options).await?;
    server.announce(handshake_out)?;
    server.register_with_discovery(config).await?;
    server.serve(plugin, shutdown).await
}
