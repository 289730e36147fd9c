//! Discovery catalog over gRPC
//!
//! - [`CatalogService`] exposes a [`CatalogStore`](tether_core::CatalogStore)
//!   as the `tether.catalog.v1.Catalog` service
//! - [`DiscoveryClient`] is what plugins use to self-register and what any
//!   process uses to resolve a name
//!
//! # Protocol Flow
//!
//! ```text
//! Plugin                          Catalog
//!   │                                │
//!   │──── Add(name, address, type) ──►│  store.add(name, info)
//!   │◄─────────── Empty ─────────────│
//!   │                                │
//! Caller                             │
//!   │──── Get(name) ─────────────────►│  store.get(name)
//!   │◄─── ServiceEntry / NOT_FOUND ───│
//! ```

mod client;
mod server;

pub use client::DiscoveryClient;
pub use server::{CatalogService, serve_catalog, serve_catalog_with_shutdown};

use crate::proto::SocketType;
use tether_core::SocketKind;

pub(crate) fn socket_type_for(kind: SocketKind) -> SocketType {
    match kind {
        SocketKind::Tcp => SocketType::Tcp,
        SocketKind::Unix => SocketType::Unix,
    }
}

pub(crate) fn socket_kind_for(raw: i32) -> Option<SocketKind> {
    match SocketType::try_from(raw).ok()? {
        SocketType::Tcp => Some(SocketKind::Tcp),
        SocketType::Unix => Some(SocketKind::Unix),
    }
}
