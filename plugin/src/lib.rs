//! tether-plugin - Run plugins as child processes and call them over gRPC
//!
//! A plugin is an ordinary executable that serves one or more gRPC services.
//! The host launches it, learns where it listens from a one-line handshake on
//! its stdout, and talks to it through a statically typed client.
//!
//! ```text
//!  host                                   plugin process
//!  ────                                   ──────────────
//!  load(plugin, options, catalog)
//!    │ spawn (PLUGIN_SOCKET_TYPE=unix) ──► serve(plugin, options)
//!    │                                      │ negotiate transport
//!    │ ◄──── {"socket_type":..,"address":..}│ write handshake
//!    │                                      │ register with catalog (optional)
//!    │ dial ──────────────────────────────► │ tonic server
//!    │ catalog.add(name, info)
//!    ▼
//!  LoadedPlugin<P::Client>
//! ```
//!
//! The [`discovery`] module exposes a catalog store over gRPC so plugins
//! running elsewhere can be found by name.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(missing_docs)]

pub mod config;
pub mod connect;
pub mod discovery;
pub mod error;
pub mod handshake;
pub mod load;
pub mod logging;
pub mod plugin;
pub mod serve;
pub mod shutdown;
pub mod transport;

/// Proto types generated from tether/catalog/v1/catalog.proto
pub mod proto {
    #![allow(missing_docs)]
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::derive_partial_eq_without_eq)]

    tonic::include_proto!("tether.catalog.v1");
}

pub use config::{PortRange, ServeConfig, TransportConfig};
pub use connect::{PluginAddress, connect};
pub use discovery::{CatalogService, DiscoveryClient, serve_catalog, serve_catalog_with_shutdown};
pub use error::{PluginError, Result};
pub use handshake::Handshake;
pub use load::{LoadOptions, LoadedPlugin, load};
pub use plugin::Plugin;
pub use serve::{PluginServer, ServeOptions, serve, serve_with_shutdown};
pub use shutdown::shutdown_signal;

pub use tether_core::{
    CatalogStore, MemoryCatalogStore, PayloadError, SerializedPayload, ServiceInfo, SocketKind,
    TypeRegistry, serialize,
};
