//! Error types for the plugin lifecycle

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub use tether_core::PayloadError;

/// Result type alias for tether operations
pub type Result<T> = std::result::Result<T, PluginError>;

/// Main error type for loading, serving and calling plugins
#[derive(Error, Debug)]
pub enum PluginError {
    /// Invalid or missing configuration (env vars, options, addresses)
    #[error("configuration error: {0}")]
    Config(String),

    /// Every port in the configured range is taken
    #[error("no free TCP port in range {min}..{max}")]
    PortExhausted {
        /// First port tried
        min: u32,
        /// Exclusive end of the range
        max: u32,
    },

    /// Binding the Unix domain socket failed
    #[error("could not listen on unix socket {}: {source}", path.display())]
    SocketCreation {
        /// Socket path that could not be bound
        path: PathBuf,
        /// Underlying bind error
        #[source]
        source: std::io::Error,
    },

    /// The machine has no non-loopback IPv4 address to advertise
    #[error("unable to find a non-loopback IPv4 address")]
    NoLocalAddress,

    /// The plugin executable could not be started
    #[error("could not launch plugin {}: {source}", path.display())]
    Spawn {
        /// Executable that failed to start
        path: PathBuf,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// The handshake line was not valid JSON of the expected shape
    #[error("malformed plugin handshake: {0}")]
    HandshakeParse(String),

    /// The handshake parsed but carried no address
    #[error("plugin did not provide a valid address")]
    MissingAddress,

    /// The plugin closed stdout before writing a handshake
    #[error("plugin exited before sending a handshake")]
    HandshakeClosed,

    /// No handshake line arrived in time
    #[error("no plugin handshake within {0:?}")]
    HandshakeTimeout(Duration),

    /// Connecting to the plugin failed
    #[error("could not connect to plugin at {address}: {message}")]
    Dial {
        /// Address that was dialed
        address: String,
        /// Error chain from the transport
        message: String,
    },

    /// Connecting to the plugin did not finish in time
    #[error("timed out after {timeout:?} connecting to {address}")]
    DialTimeout {
        /// Address that was dialed
        address: String,
        /// Deadline that elapsed
        timeout: Duration,
    },

    /// The catalog store refused the loader's bookkeeping write
    #[error("could not add service '{0}' to catalog store")]
    CatalogAddFailed(String),

    /// Self-registration with the discovery service failed
    #[error("could not register plugin with discovery server at {address}: {message}")]
    Registration {
        /// Discovery service address
        address: String,
        /// Why the Add call failed
        message: String,
    },

    /// gRPC transport error
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// gRPC status returned by a remote call
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    /// Payload encoding or decoding failed
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PluginError> for tonic::Status {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::Config(msg) => tonic::Status::invalid_argument(msg),
            PluginError::Grpc(status) => status,
            PluginError::Payload(e) => e.into(),
            PluginError::PortExhausted { .. } => tonic::Status::resource_exhausted(err.to_string()),
            PluginError::Dial { .. }
            | PluginError::DialTimeout { .. }
            | PluginError::Transport(_)
            | PluginError::Registration { .. } => tonic::Status::unavailable(err.to_string()),
            other => tonic::Status::internal(other.to_string()),
        }
    }
}
