//! Error types for payload encoding

use thiserror::Error;

/// Error type for payload serialization and type lookup
///
/// Returned by [`serialize`](crate::serialize) and the
/// [`TypeRegistry`](crate::TypeRegistry) decode paths. Callers on the client
/// side of a plugin RPC should treat any of these as a failed call.
///
/// # Example
///
/// ```
/// use tether_core::{PayloadError, TypeRegistry};
///
/// let registry = TypeRegistry::new();
/// match registry.deserialize(&[0x80], "app::Missing") {
///     Err(PayloadError::UnregisteredType(name)) => assert_eq!(name, "app::Missing"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// The receiving registry has no entry for this type name
    ///
    /// Registries are per process. Both sides must register the same set
    /// of types at startup.
    #[error("type '{0}' is not registered")]
    UnregisteredType(String),

    /// The value could not be represented in the encoding
    #[error("failed to encode '{type_name}': {message}")]
    Encoding {
        /// Type being encoded
        type_name: String,
        /// Encoder message
        message: String,
    },

    /// The bytes were malformed or did not match the registered type
    #[error("failed to decode '{type_name}': {message}")]
    Decoding {
        /// Type being decoded
        type_name: String,
        /// Decoder message
        message: String,
    },

    /// The payload decoded fine but is not the type the caller asked for
    #[error("expected payload of type '{expected}', got '{actual}'")]
    TypeMismatch {
        /// Type the caller asked for
        expected: String,
        /// Type named in the payload
        actual: String,
    },
}

impl From<PayloadError> for tonic::Status {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::UnregisteredType(_) | PayloadError::TypeMismatch { .. } => {
                tonic::Status::failed_precondition(err.to_string())
            }
            PayloadError::Encoding { .. } => tonic::Status::internal(err.to_string()),
            PayloadError::Decoding { .. } => tonic::Status::invalid_argument(err.to_string()),
        }
    }
}
