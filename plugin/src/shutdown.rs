//! Process signal handling for plugin and catalog servers

use tokio::signal;
use tracing::info;

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
///
/// Used as the default shutdown future by [`serve`](fn@crate::serve) and
/// [`serve_catalog`](fn@crate::serve_catalog). Resolving it lets the server drain
/// and drop its listener, which removes a plugin's Unix socket file.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, stopping server"),
        _ = terminate => info!("Received SIGTERM, stopping server"),
    }
}
