//! Greeter Test Plugin
//!
//! A minimal plugin used by the end-to-end tests. It has two calls:
//!
//! - `Greet` takes a plain proto message
//! - `Describe` takes a registry-encoded [`Parcel`], exercising the payload
//!   codec across the process boundary
//!
//! Host and plugin both link this crate, so both sides call
//! [`register_types`] on their own [`TypeRegistry`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tether_core::{SerializedPayload, TypeRegistry, serialize};
use tether_plugin::Plugin;
use tonic::service::RoutesBuilder;
use tonic::transport::Channel;
use tonic::{Request, Response, Status};
use tracing::debug;

pub mod proto {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::derive_partial_eq_without_eq)]

    tonic::include_proto!("tether.greeter.v1");
}

use proto::greeter_client::GreeterClient as RawGreeterClient;
use proto::greeter_server::{Greeter, GreeterServer};
use proto::{DescribeReply, GreetReply, GreetRequest};

/// Application value sent to `Describe`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub label: String,
    pub weight_grams: u32,
    pub tags: Vec<String>,
    pub fragile: bool,
}

/// Register every payload type the greeter exchanges
pub fn register_types(registry: &TypeRegistry) {
    registry.register::<Parcel>();
}

/// Business logic behind the greeter service
pub trait Greet: Send + Sync + 'static {
    fn greet(&self, name: &str) -> String;
    fn describe(&self, parcel: &Parcel) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultGreeter;

impl Greet for DefaultGreeter {
    fn greet(&self, name: &str) -> String {
        format!("Hello, {name}!")
    }

    fn describe(&self, parcel: &Parcel) -> String {
        let handling = if parcel.fragile { "fragile" } else { "sturdy" };
        format!(
            "{} ({} g, {handling}) [{}]",
            parcel.label,
            parcel.weight_grams,
            parcel.tags.join(", ")
        )
    }
}

/// gRPC service wrapping a [`Greet`] implementation
pub struct GreeterService<G> {
    greeter: Arc<G>,
    registry: Arc<TypeRegistry>,
}

#[tonic::async_trait]
impl<G: Greet> Greeter for GreeterService<G> {
    async fn greet(&self, request: Request<GreetRequest>) -> Result<Response<GreetReply>, Status> {
        let name = request.into_inner().name;
        debug!(name = %name, "Greet");
        Ok(Response::new(GreetReply {
            message: self.greeter.greet(&name),
        }))
    }

    async fn describe(
        &self,
        request: Request<tether_core::proto::Payload>,
    ) -> Result<Response<DescribeReply>, Status> {
        let payload = SerializedPayload::from(request.into_inner());
        let parcel: Parcel = self.registry.deserialize_as(&payload)?;
        Ok(Response::new(DescribeReply {
            description: self.greeter.describe(&parcel),
        }))
    }
}

/// The greeter plugin kind
pub struct GreeterPlugin<G = DefaultGreeter> {
    greeter: Arc<G>,
    registry: Arc<TypeRegistry>,
}

impl GreeterPlugin<DefaultGreeter> {
    pub fn new() -> Self {
        Self::with_greeter(DefaultGreeter)
    }
}

impl Default for GreeterPlugin<DefaultGreeter> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: Greet> GreeterPlugin<G> {
    pub fn with_greeter(greeter: G) -> Self {
        let registry = TypeRegistry::new();
        register_types(&registry);
        Self {
            greeter: Arc::new(greeter),
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }
}

impl<G: Greet> Plugin for GreeterPlugin<G> {
    type Client = GreeterClient;

    fn client(&self, channel: Channel) -> GreeterClient {
        GreeterClient {
            inner: RawGreeterClient::new(channel),
        }
    }

    fn server(&self, routes: &mut RoutesBuilder) -> tether_plugin::Result<()> {
        routes.add_service(GreeterServer::new(GreeterService {
            greeter: Arc::clone(&self.greeter),
            registry: Arc::clone(&self.registry),
        }));
        Ok(())
    }
}

/// Host-side handle to a greeter plugin
#[derive(Debug, Clone)]
pub struct GreeterClient {
    inner: RawGreeterClient<Channel>,
}

impl GreeterClient {
    pub async fn greet(&mut self, name: &str) -> tether_plugin::Result<String> {
        let reply = self
            .inner
            .greet(GreetRequest {
                name: name.to_string(),
            })
            .await?;
        Ok(reply.into_inner().message)
    }

    pub async fn describe(&mut self, parcel: &Parcel) -> tether_plugin::Result<String> {
        let payload = serialize(parcel)?;
        self.describe_payload(payload).await
    }

    /// Send an already encoded payload
    pub async fn describe_payload(
        &mut self,
        payload: SerializedPayload,
    ) -> tether_plugin::Result<String> {
        let reply = self
            .inner
            .describe(tether_core::proto::Payload::from(payload))
            .await?;
        Ok(reply.into_inner().description)
    }
}
