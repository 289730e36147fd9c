//! tether-core - Core types shared by tether hosts and plugins
//!
//! This crate provides the pieces that both sides of the process boundary
//! link against:
//!
//! - [`CatalogStore`] / [`MemoryCatalogStore`] - name → endpoint registry
//! - [`ServiceInfo`] / [`SocketKind`] - one resolvable plugin endpoint
//! - [`TypeRegistry`] - decoder table for application payload types
//! - [`SerializedPayload`] / [`serialize`] - self-describing value encoding
//! - [`proto::Payload`] - the wire shape every plugin RPC uses for such values
//!
//! # Why this crate exists
//!
//! Plugin crates (like `tether-greeter`) define their business payload types
//! and must register them identically in the host and in the plugin process.
//! Keeping the registry and wire types here lets a plugin's shared crate depend
//! on them without pulling in the process lifecycle code.
//!
//! ```text
//! tether-core ◄── tether-plugin ◄── catalog daemon
//!     ▲                 ▲
//!     └──────────── plugin shared crates (greeter, ...)
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(missing_docs)]

/// Name → endpoint registry
pub mod catalog;
mod error;
/// Payload encoding helpers
pub mod payload;
/// Decoder table for registered payload types
pub mod registry;

/// Proto types generated from tether/payload/v1/payload.proto
pub mod proto {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::derive_partial_eq_without_eq)]
    #![allow(missing_docs)]

    tonic::include_proto!("tether.payload.v1");
}

pub use catalog::{CatalogStore, MemoryCatalogStore, ServiceInfo, SocketKind};
pub use error::PayloadError;
pub use payload::{SerializedPayload, serialize, type_name_of};
pub use registry::TypeRegistry;
