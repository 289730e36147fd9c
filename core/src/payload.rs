//! Self-describing payload encoding
//!
//! Values travel inside plugin RPCs as `{serialized, type_name}`. The bytes
//! are MessagePack with field names included, so the receiver only needs the
//! registered type, not a shared schema version.

use crate::error::PayloadError;
use crate::proto;
use serde::Serialize;

/// One encoded value plus the name of its type
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SerializedPayload {
    /// MessagePack document (maps keyed by field name)
    pub bytes: Vec<u8>,
    /// Name the receiving [`TypeRegistry`](crate::TypeRegistry) looks up
    pub type_name: String,
}

impl SerializedPayload {
    /// Create a payload from raw parts
    pub fn new(bytes: Vec<u8>, type_name: impl Into<String>) -> Self {
        Self {
            bytes,
            type_name: type_name.into(),
        }
    }
}

impl From<SerializedPayload> for proto::Payload {
    fn from(payload: SerializedPayload) -> Self {
        proto::Payload {
            serialized: payload.bytes,
            type_name: payload.type_name,
        }
    }
}

impl From<proto::Payload> for SerializedPayload {
    fn from(payload: proto::Payload) -> Self {
        SerializedPayload {
            bytes: payload.serialized,
            type_name: payload.type_name,
        }
    }
}

/// Stable name of `T` with any reference indirection stripped
///
/// `type_name_of::<&&Order>()` and `type_name_of::<Order>()` are equal. The
/// name is the fully qualified Rust path, so host and plugin must link the
/// same crate that defines the type.
pub fn type_name_of<T: ?Sized>() -> &'static str {
    let mut name = std::any::type_name::<T>();
    while let Some(rest) = name.strip_prefix('&') {
        name = rest.strip_prefix("mut ").unwrap_or(rest);
    }
    name
}

/// Encode `value` and tag it with its type name
///
/// Registration is not required to encode; only the receiver must have the
/// type registered.
pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<SerializedPayload, PayloadError> {
    let type_name = type_name_of::<T>();
    let bytes = rmp_serde::to_vec_named(value).map_err(|e| PayloadError::Encoding {
        type_name: type_name.to_string(),
        message: e.to_string(),
    })?;

    Ok(SerializedPayload {
        bytes,
        type_name: type_name.to_string(),
    })
}
