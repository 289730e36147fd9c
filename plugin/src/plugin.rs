//! The contract between a plugin kind and the lifecycle code
//!
//! One implementation per plugin kind, shared by both processes: the host
//! uses [`Plugin::client`] to wrap the channel [`load`](fn@crate::load) opens,
//! and the plugin binary uses [`Plugin::server`] to attach its gRPC services
//! before [`serve`](fn@crate::serve) starts listening.

use crate::error::Result;
use tonic::service::RoutesBuilder;
use tonic::transport::Channel;

/// A plugin kind with a statically typed client
///
/// # Example
///
/// ```ignore
/// struct GreeterPlugin;
///
/// impl Plugin for GreeterPlugin {
///     type Client = GreeterClient;
///
///     fn client(&self, channel: Channel) -> GreeterClient {
///         GreeterClient::new(channel)
///     }
///
///     fn server(&self, routes: &mut RoutesBuilder) -> Result<()> {
///         routes.add_service(GreeterServer::new(GreeterService::default()));
///         Ok(())
///     }
/// }
/// ```
pub trait Plugin: Send + Sync {
    /// Handle the host calls the plugin through
    type Client: Send;

    /// Wrap an open channel in the typed client
    fn client(&self, channel: Channel) -> Self::Client;

    /// Register the plugin's gRPC services
    ///
    /// Only called inside the plugin process.
    fn server(&self, routes: &mut RoutesBuilder) -> Result<()>;
}
