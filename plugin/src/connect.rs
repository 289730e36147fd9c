//! Dialing plugin endpoints
//!
//! Addresses come from two places: a handshake or catalog entry, and a
//! user-supplied remote address. Both are normalised into a
//! [`PluginAddress`] before dialing.
//!
//! | Form | Transport |
//! |---|---|
//! | `tcp://host:port`, `http://host:port`, `host:port` | TCP |
//! | `unix:///path/to.sock`, `/path/to.sock` | Unix domain socket |

use crate::error::{PluginError, Result};
use hyper_util::rt::TokioIo;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tether_core::{ServiceInfo, SocketKind};
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tracing::debug;

/// Default bound on establishing a connection
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// A dialable plugin endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginAddress {
    /// `host:port`
    Tcp(String),
    /// Socket path
    Unix(PathBuf),
}

impl PluginAddress {
    /// Parse an address in any of the accepted forms
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(PluginError::Config("plugin address is empty".to_string()));
        }

        if let Some(path) = address.strip_prefix("unix://") {
            return Self::unix(path);
        }
        if address.starts_with('/') {
            return Self::unix(address);
        }

        let authority = address
            .strip_prefix("tcp://")
            .or_else(|| address.strip_prefix("http://"))
            .unwrap_or(address);

        if authority.is_empty() || authority.contains("://") || !authority.contains(':') {
            return Err(PluginError::Config(format!(
                "'{address}' is not a valid plugin address (expected host:port or a socket path)"
            )));
        }
        Ok(PluginAddress::Tcp(authority.to_string()))
    }

    /// Address for a catalog or handshake record
    pub fn from_service_info(info: &ServiceInfo) -> Result<Self> {
        match info.socket_kind {
            SocketKind::Unix => {
                let path = info.address.strip_prefix("unix://").unwrap_or(&info.address);
                Self::unix(path)
            }
            SocketKind::Tcp => match Self::parse(&info.address)? {
                tcp @ PluginAddress::Tcp(_) => Ok(tcp),
                PluginAddress::Unix(_) => Err(PluginError::Config(format!(
                    "'{}' is registered as tcp but looks like a socket path",
                    info.address
                ))),
            },
        }
    }

    fn unix(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(PluginError::Config("unix socket path is empty".to_string()));
        }
        Ok(PluginAddress::Unix(PathBuf::from(path)))
    }

    /// Transport used to reach this address
    pub fn socket_kind(&self) -> SocketKind {
        match self {
            PluginAddress::Tcp(_) => SocketKind::Tcp,
            PluginAddress::Unix(_) => SocketKind::Unix,
        }
    }
}

impl fmt::Display for PluginAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginAddress::Tcp(authority) => write!(f, "tcp://{authority}"),
            PluginAddress::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Open a gRPC channel to `address` within `timeout`
pub async fn connect(address: &PluginAddress, timeout: Duration) -> Result<Channel> {
    let attempt = match address {
        PluginAddress::Tcp(authority) => {
            let endpoint = Endpoint::from_shared(format!("http://{authority}"))
                .map_err(|e| PluginError::Dial {
                    address: address.to_string(),
                    message: e.to_string(),
                })?
                .connect_timeout(timeout);
            tokio::time::timeout(timeout, endpoint.connect()).await
        }
        PluginAddress::Unix(path) => {
            let path = path.clone();
            // The URI is ignored by the connector but must parse.
            let endpoint = Endpoint::from_static("http://[::]:50051");
            let connecting = endpoint.connect_with_connector(tower::service_fn(move |_: Uri| {
                let path = path.clone();
                async move {
                    let stream = UnixStream::connect(path).await?;
                    Ok::<_, std::io::Error>(TokioIo::new(stream))
                }
            }));
            tokio::time::timeout(timeout, connecting).await
        }
    };

    let channel = attempt
        .map_err(|_| PluginError::DialTimeout {
            address: address.to_string(),
            timeout,
        })?
        .map_err(|e| PluginError::Dial {
            address: address.to_string(),
            message: error_chain(&e),
        })?;

    debug!(address = %address, "Connected to plugin");
    Ok(channel)
}

/// Render an error with its sources; tonic's top-level message is often
/// just "transport error".
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_forms() {
        for raw in ["tcp://10.0.0.5:10000", "http://10.0.0.5:10000", "10.0.0.5:10000"] {
            assert_eq!(
                PluginAddress::parse(raw).unwrap(),
                PluginAddress::Tcp("10.0.0.5:10000".to_string()),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_parse_unix_forms() {
        for raw in ["unix:///tmp/p.sock", "/tmp/p.sock"] {
            assert_eq!(
                PluginAddress::parse(raw).unwrap(),
                PluginAddress::Unix(PathBuf::from("/tmp/p.sock")),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_invalid() {
        for raw in ["", "   ", "localhost", "unix://", "ftp://h:1", "tcp://"] {
            assert!(PluginAddress::parse(raw).is_err(), "{raw:?} should fail");
        }
    }

    #[test]
    fn test_from_service_info() {
        let unix = ServiceInfo::unix("/tmp/tether-x.sock");
        assert_eq!(
            PluginAddress::from_service_info(&unix).unwrap(),
            PluginAddress::Unix(PathBuf::from("/tmp/tether-x.sock"))
        );

        let tcp = ServiceInfo::tcp("tcp://127.0.0.1:10001");
        assert_eq!(
            PluginAddress::from_service_info(&tcp).unwrap(),
            PluginAddress::Tcp("127.0.0.1:10001".to_string())
        );

        let wrong = ServiceInfo::tcp("/tmp/tether-x.sock");
        assert!(PluginAddress::from_service_info(&wrong).is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for address in [
            PluginAddress::Tcp("h:1".to_string()),
            PluginAddress::Unix(PathBuf::from("/tmp/a.sock")),
        ] {
            assert_eq!(PluginAddress::parse(&address.to_string()).unwrap(), address);
        }
    }

    #[tokio::test]
    async fn test_connect_missing_socket_fails() {
        let dir = tempfile::tempdir().unwrap();
        let address = PluginAddress::Unix(dir.path().join("nobody-home.sock"));

        let err = connect(&address, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, PluginError::Dial { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_connect_refused_tcp_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let address = PluginAddress::Tcp(format!("127.0.0.1:{port}"));
        let err = connect(&address, Duration::from_secs(2)).await.unwrap_err();
        assert!(
            matches!(err, PluginError::Dial { .. } | PluginError::DialTimeout { .. }),
            "got {err:?}"
        );
    }
}
