//! Greeter plugin binary
//!
//! Launched by a host through `tether_plugin::load`. Logs go to stderr; stdout
//! carries only the handshake line.

use tether_greeter::GreeterPlugin;
use tether_plugin::ServeOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tether_plugin::logging::init_tracing();

    tether_plugin::serve(GreeterPlugin::new(), ServeOptions::new("greeter")).await?;
    Ok(())
}
