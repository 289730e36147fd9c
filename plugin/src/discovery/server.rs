//! Catalog gRPC server implementation
//!
//! Implements the Catalog service from catalog.proto on top of any
//! [`CatalogStore`]. The service keeps no state of its own.

use super::{socket_kind_for, socket_type_for};
use crate::error::{PluginError, Result};
use crate::proto::catalog_server::{Catalog, CatalogServer};
use crate::proto::{Empty, GetRequest, ServiceEntry};
use std::future::Future;
use std::sync::Arc;
use tether_core::{CatalogStore, ServiceInfo};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

/// gRPC adapter over a shared catalog store
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
}

impl CatalogService {
    /// Create a service backed by `store`
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// The backing store
    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    /// Wrap in the generated tonic server type
    pub fn into_server(self) -> CatalogServer<Self> {
        CatalogServer::new(self)
    }
}

#[tonic::async_trait]
impl Catalog for CatalogService {
    async fn add(
        &self,
        request: Request<ServiceEntry>,
    ) -> std::result::Result<Response<Empty>, Status> {
        let entry = request.into_inner();

        let socket_kind = socket_kind_for(entry.socket_type).ok_or_else(|| {
            warn!(
                name = %entry.name,
                socket_type = entry.socket_type,
                "Rejected invalid socket type"
            );
            Status::invalid_argument("invalid socket type")
        })?;

        let info = ServiceInfo::new(entry.address, socket_kind);
        if !self.store.add(&entry.name, info.clone()) {
            return Err(Status::internal(format!(
                "failed to add service {}",
                entry.name
            )));
        }

        info!(
            name = %entry.name,
            address = %info.address,
            socket_type = %info.socket_kind,
            "Registered service"
        );
        Ok(Response::new(Empty {}))
    }

    async fn get(
        &self,
        request: Request<GetRequest>,
    ) -> std::result::Result<Response<ServiceEntry>, Status> {
        let name = request.into_inner().name;

        let info = self.store.get(&name).ok_or_else(|| {
            debug!(name = %name, "Lookup for unknown service");
            Status::not_found(format!("service {name} not found"))
        })?;

        Ok(Response::new(ServiceEntry {
            name,
            address: info.address,
            socket_type: socket_type_for(info.socket_kind) as i32,
        }))
    }
}

/// Run a standalone catalog server on `address` until the process is
/// interrupted
pub async fn serve_catalog(store: Arc<dyn CatalogStore>, address: &str) -> Result<()> {
    serve_catalog_with_shutdown(store, address, crate::shutdown::shutdown_signal()).await
}

/// Run a standalone catalog server on `address` until `shutdown` resolves
///
/// `address` is `host:port`. The host may be a name, an IP literal
/// (bracketed for IPv6), or empty to listen on all interfaces (`:50051`).
pub async fn serve_catalog_with_shutdown<F>(
    store: Arc<dyn CatalogStore>,
    address: &str,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let (host, port) = split_host_port(address)?;
    let listener = TcpListener::bind((host, port)).await?;
    info!(address = %listener.local_addr()?, "Catalog server listening");

    tonic::transport::Server::builder()
        .add_service(CatalogService::new(store).into_server())
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;

    info!("Catalog server stopped");
    Ok(())
}

/// Split `host:port`, mapping an empty host to the unspecified address
fn split_host_port(address: &str) -> Result<(&str, u16)> {
    let invalid = |reason: String| {
        PluginError::Config(format!("invalid catalog address '{address}': {reason}"))
    };

    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port".to_string()))?;
    let port = port
        .parse::<u16>()
        .map_err(|e| invalid(format!("bad port '{port}': {e}")))?;

    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.contains(':') && !address.starts_with('[') {
        return Err(invalid("IPv6 hosts must be bracketed".to_string()));
    }

    Ok((if host.is_empty() { "0.0.0.0" } else { host }, port))
}
