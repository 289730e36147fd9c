//! tether-catalog - discovery catalog daemon
//!
//! Serves the `tether.catalog.v1.Catalog` service over an in-memory store so
//! plugins started with `PLUGIN_DISCOVERY_ADDRESS` can publish where they
//! listen, and hosts can resolve them by name.
//!
//! # Configuration
//!
//! | Variable | Default |
//! |---|---|
//! | `TETHER_CATALOG_ADDR` | `0.0.0.0:50051` |
//! | `TETHER_LOG_FORMAT` | `pretty` |
//! | `RUST_LOG` | `info` |

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

use std::sync::Arc;
use tether_core::{CatalogStore, MemoryCatalogStore};
use tracing::info;

const TETHER_CATALOG_ADDR: &str = "TETHER_CATALOG_ADDR";
const DEFAULT_CATALOG_ADDR: &str = "0.0.0.0:50051";

fn catalog_addr() -> String {
    std::env::var(TETHER_CATALOG_ADDR)
        .ok()
        .map(|addr| addr.trim().to_string())
        .filter(|addr| !addr.is_empty())
        .unwrap_or_else(|| DEFAULT_CATALOG_ADDR.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tether_plugin::logging::init_tracing();

    let addr = catalog_addr();
    info!(address = %addr, version = env!("CARGO_PKG_VERSION"), "Starting tether catalog");

    let store: Arc<dyn CatalogStore> = Arc::new(MemoryCatalogStore::new());
    tether_plugin::serve_catalog(store.clone(), &addr).await?;

    info!(services = store.len(), "Tether catalog shutdown complete");
    Ok(())
}
