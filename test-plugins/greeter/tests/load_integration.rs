//! End-to-end Plugin Tests
//!
//! Launch the compiled `greeter-plugin` binary through `load` and call it
//! over the socket it announces.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{CatalogStore, MemoryCatalogStore, SocketKind, TypeRegistry, serialize};
use tether_greeter::{GreeterPlugin, Parcel, register_types};
use tether_plugin::{CatalogService, LoadOptions, PluginAddress, PluginError, load};
use tokio::sync::oneshot;

// =============================================================================
// TEST INFRASTRUCTURE
// =============================================================================

const PLUGIN_BIN: &str = env!("CARGO_BIN_EXE_greeter-plugin");

fn greeter_options() -> LoadOptions {
    LoadOptions::new("greeter", PLUGIN_BIN).handshake_timeout(Duration::from_secs(20))
}

fn parcel() -> Parcel {
    Parcel {
        label: "teapot".to_string(),
        weight_grams: 850,
        tags: vec!["kitchen".to_string()],
        fragile: true,
    }
}

async fn start_catalog_server(
    store: Arc<MemoryCatalogStore>,
) -> (SocketAddr, oneshot::Sender<()>) {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(CatalogService::new(store).into_server())
            .serve_with_incoming_shutdown(
                tokio_stream::wrappers::TcpListenerStream::new(listener),
                async move {
                    shutdown_rx.await.ok();
                },
            )
            .await
            .ok();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown_tx)
}

// =============================================================================
// END-TO-END TESTS
// =============================================================================

#[tokio::test]
async fn test_load_plugin_over_unix_socket() {
    let catalog = MemoryCatalogStore::new();
    let mut plugin = load(&GreeterPlugin::new(), &greeter_options(), &catalog)
        .await
        .unwrap();

    assert!(plugin.process_id().is_some());
    assert!(matches!(plugin.address(), PluginAddress::Unix(_)));

    let entry = catalog.get("greeter").unwrap();
    assert_eq!(entry.socket_kind, SocketKind::Unix);
    assert!(PathBuf::from(&entry.address).exists());

    let reply = plugin.client_mut().greet("Ada").await.unwrap();
    assert_eq!(reply, "Hello, Ada!");

    plugin.kill().await.unwrap();
    assert_eq!(plugin.process_id(), None);
}

#[tokio::test]
async fn test_registered_payload_crosses_process_boundary() {
    let catalog = MemoryCatalogStore::new();
    let mut plugin = load(&GreeterPlugin::new(), &greeter_options(), &catalog)
        .await
        .unwrap();

    let description = plugin.client_mut().describe(&parcel()).await.unwrap();
    assert_eq!(description, "teapot (850 g, fragile) [kitchen]");

    // The host registry decodes the same bytes to an equal value.
    let host_registry = TypeRegistry::new();
    register_types(&host_registry);
    let payload = serialize(&parcel()).unwrap();
    let echoed: Parcel = host_registry.deserialize_as(&payload).unwrap();
    assert_eq!(echoed, parcel());

    plugin.kill().await.unwrap();
}

#[tokio::test]
async fn test_unregistered_payload_is_an_error() {
    #[derive(serde::Serialize)]
    struct Invoice {
        number: u64,
    }

    let catalog = MemoryCatalogStore::new();
    let mut plugin = load(&GreeterPlugin::new(), &greeter_options(), &catalog)
        .await
        .unwrap();

    let payload = serialize(&Invoice { number: 17 }).unwrap();
    let err = plugin.client_mut().describe_payload(payload).await.unwrap_err();
    match err {
        PluginError::Grpc(status) => {
            assert_eq!(status.code(), tonic::Code::FailedPrecondition);
            assert!(status.message().contains("Invoice"));
        }
        other => panic!("expected gRPC status, got {other:?}"),
    }

    plugin.kill().await.unwrap();
}

#[tokio::test]
async fn test_second_host_loads_by_catalog_address() {
    let catalog = MemoryCatalogStore::new();
    let mut owner = load(&GreeterPlugin::new(), &greeter_options(), &catalog)
        .await
        .unwrap();

    let entry = catalog.get("greeter").unwrap();
    let remote = LoadOptions::remote("greeter", entry.address.clone());
    let other_catalog = MemoryCatalogStore::new();
    let mut guest = load(&GreeterPlugin::new(), &remote, &other_catalog)
        .await
        .unwrap();

    assert_eq!(guest.process_id(), None);
    assert_eq!(guest.client_mut().greet("Grace").await.unwrap(), "Hello, Grace!");
    assert!(other_catalog.is_empty());

    owner.kill().await.unwrap();
}

#[tokio::test]
async fn test_plugin_self_registers_with_discovery() {
    let discovery = Arc::new(MemoryCatalogStore::new());
    let (discovery_addr, discovery_shutdown) = start_catalog_server(discovery.clone()).await;

    let catalog = MemoryCatalogStore::new();
    let options = greeter_options().discovery_address(discovery_addr.to_string());
    let mut plugin = load(&GreeterPlugin::new(), &options, &catalog).await.unwrap();

    // Registration runs in the child after the handshake; give it a moment.
    let mut registered = None;
    for _ in 0..100 {
        registered = discovery.get("greeter");
        if registered.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(registered, catalog.get("greeter"));

    plugin.kill().await.unwrap();
    discovery_shutdown.send(()).ok();
}

#[tokio::test]
async fn test_unreachable_discovery_does_not_stop_plugin() {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_addr = probe.local_addr().unwrap();
    drop(probe);

    let catalog = MemoryCatalogStore::new();
    let options = greeter_options().discovery_address(dead_addr.to_string());
    let mut plugin = load(&GreeterPlugin::new(), &options, &catalog).await.unwrap();

    assert_eq!(plugin.client_mut().greet("Linus").await.unwrap(), "Hello, Linus!");
    plugin.kill().await.unwrap();
}
