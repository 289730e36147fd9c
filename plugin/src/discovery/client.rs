//! Typed client for the catalog service

use super::{socket_kind_for, socket_type_for};
use crate::connect::{PluginAddress, connect};
use crate::error::{PluginError, Result};
use crate::proto::catalog_client::CatalogClient;
use crate::proto::{GetRequest, ServiceEntry};
use std::time::Duration;
use tether_core::ServiceInfo;
use tonic::transport::Channel;

/// Catalog client that speaks [`ServiceInfo`] instead of proto messages
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    inner: CatalogClient<Channel>,
}

impl DiscoveryClient {
    /// Wrap an existing channel
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: CatalogClient::new(channel),
        }
    }

    /// Dial a catalog at `address` (`host:port`, `tcp://...` or a socket path)
    pub async fn connect(address: &str, timeout: Duration) -> Result<Self> {
        let target = PluginAddress::parse(address)?;
        let channel = connect(&target, timeout).await?;
        Ok(Self::new(channel))
    }

    /// Record `info` under `name`, overwriting any previous entry
    pub async fn add(&mut self, name: &str, info: &ServiceInfo) -> Result<()> {
        self.inner
            .add(ServiceEntry {
                name: name.to_string(),
                address: info.address.clone(),
                socket_type: socket_type_for(info.socket_kind) as i32,
            })
            .await?;
        Ok(())
    }

    /// Resolve `name`
    ///
    /// An unknown name comes back as [`PluginError::Grpc`] with
    /// `Code::NotFound`.
    pub async fn get(&mut self, name: &str) -> Result<ServiceInfo> {
        let entry = self
            .inner
            .get(GetRequest {
                name: name.to_string(),
            })
            .await?
            .into_inner();

        let socket_kind = socket_kind_for(entry.socket_type).ok_or_else(|| {
            PluginError::Config(format!(
                "catalog returned unknown socket type {} for {name}",
                entry.socket_type
            ))
        })?;
        Ok(ServiceInfo::new(entry.address, socket_kind))
    }
}
