//! Type registry for payload decoding
//!
//! Maps type names to a decoder that produces a fresh value of that type.
//! Registration is explicit: build one registry at startup, register every
//! payload type the process may receive, then share it by reference with the
//! code that decodes RPC payloads.
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use tether_core::{TypeRegistry, serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Order { id: u32 }
//!
//! let registry = TypeRegistry::new();
//! registry.register::<Order>();
//!
//! let payload = serialize(&Order { id: 9 }).unwrap();
//! let order: Order = registry.deserialize_as(&payload).unwrap();
//! assert_eq!(order, Order { id: 9 });
//! ```

use crate::error::PayloadError;
use crate::payload::{SerializedPayload, type_name_of};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use tracing::debug;

/// Decoded value whose concrete type is known only to the registry
pub type DynPayload = Box<dyn Any + Send + Sync>;

type DecodeFn = fn(&[u8]) -> Result<DynPayload, rmp_serde::decode::Error>;

#[derive(Clone, Copy)]
struct RegisteredType {
    type_id: TypeId,
    decode: DecodeFn,
}

fn decode_boxed<T>(bytes: &[u8]) -> Result<DynPayload, rmp_serde::decode::Error>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    Ok(Box::new(rmp_serde::from_slice::<T>(bytes)?))
}

/// Registry of payload types this process can decode
///
/// Registration takes the write lock; lookups during decoding share the read
/// lock, so decoding on many tasks does not serialize.
pub struct TypeRegistry {
    types: RwLock<HashMap<String, RegisteredType>>,
}

impl TypeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
        }
    }

    /// Register `T` and return the name it was registered under
    ///
    /// Registering the same type again replaces the entry with an
    /// equivalent one.
    pub fn register<T>(&self) -> &'static str
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let name = type_name_of::<T>();
        let entry = RegisteredType {
            type_id: TypeId::of::<T>(),
            decode: decode_boxed::<T>,
        };

        if self.types.write().insert(name.to_string(), entry).is_some() {
            debug!(type_name = %name, "Re-registered payload type");
        } else {
            debug!(type_name = %name, "Registered payload type");
        }
        name
    }

    /// Register the type of `sample`
    ///
    /// Convenience for call sites that have a value at hand; the value
    /// itself is not stored.
    pub fn register_value<T>(&self, _sample: &T) -> &'static str
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.register::<T>()
    }

    /// Check if a type name is registered
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.types.read().contains_key(type_name)
    }

    /// Get all registered type names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered types
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// Whether no types are registered
    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }

    /// Decode `bytes` as the type registered under `type_name`
    ///
    /// Fails with [`PayloadError::UnregisteredType`] before looking at the
    /// bytes when the name is unknown.
    pub fn deserialize(&self, bytes: &[u8], type_name: &str) -> Result<DynPayload, PayloadError> {
        let entry = self
            .types
            .read()
            .get(type_name)
            .copied()
            .ok_or_else(|| PayloadError::UnregisteredType(type_name.to_string()))?;

        (entry.decode)(bytes).map_err(|e| PayloadError::Decoding {
            type_name: type_name.to_string(),
            message: e.to_string(),
        })
    }

    /// Decode a [`SerializedPayload`] into a dynamic value
    pub fn decode(&self, payload: &SerializedPayload) -> Result<DynPayload, PayloadError> {
        self.deserialize(&payload.bytes, &payload.type_name)
    }

    /// Decode a payload and narrow it to `T`
    ///
    /// Fails with [`PayloadError::TypeMismatch`] if the payload names a
    /// different type, even when that type is registered.
    pub fn deserialize_as<T: Send + Sync + 'static>(
        &self,
        payload: &SerializedPayload,
    ) -> Result<T, PayloadError> {
        let expected = type_name_of::<T>();
        let mismatch = || PayloadError::TypeMismatch {
            expected: expected.to_string(),
            actual: payload.type_name.clone(),
        };

        if payload.type_name != expected {
            return Err(mismatch());
        }

        let registered_id = self
            .types
            .read()
            .get(expected)
            .map(|entry| entry.type_id);
        if registered_id.is_some_and(|id| id != TypeId::of::<T>()) {
            return Err(mismatch());
        }

        let value = self.decode(payload)?;
        value.downcast::<T>().map(|boxed| *boxed).map_err(|_| mismatch())
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.names())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::payload::serialize;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u32,
        item: String,
        tags: Vec<String>,
        notes: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Inventory {
        counts: BTreeMap<String, i64>,
        ratio: f64,
        flags: (bool, bool),
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Receipt {
        total_cents: u64,
    }

    fn sample_order() -> Order {
        Order {
            id: 42,
            item: "lamp".to_string(),
            tags: vec!["fragile".to_string(), "gift".to_string()],
            notes: None,
        }
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = TypeRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_register_returns_type_name() {
        let registry = TypeRegistry::new();
        let name = registry.register::<Order>();
        assert_eq!(name, type_name_of::<Order>());
        assert!(registry.is_registered(name));
    }

    #[test]
    fn test_register_value_uses_value_type() {
        let registry = TypeRegistry::new();
        let name = registry.register_value(&sample_order());
        assert_eq!(name, type_name_of::<Order>());
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = TypeRegistry::new();
        registry.register::<Order>();
        registry.register::<Order>();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_round_trip_struct() {
        let registry = TypeRegistry::new();
        registry.register::<Order>();

        let order = sample_order();
        let payload = serialize(&order).unwrap();
        let decoded: Order = registry.deserialize_as(&payload).unwrap();
        assert_eq!(decoded, order);
    }

    #[test]
    fn test_round_trip_nested_values() {
        let registry = TypeRegistry::new();
        registry.register::<Inventory>();

        let mut counts = BTreeMap::new();
        counts.insert("bolts".to_string(), -3);
        counts.insert("nuts".to_string(), 120);
        let inventory = Inventory {
            counts,
            ratio: 0.25,
            flags: (true, false),
        };

        let payload = serialize(&inventory).unwrap();
        let decoded = registry.decode(&payload).unwrap();
        let decoded = decoded.downcast_ref::<Inventory>().unwrap();
        assert_eq!(decoded, &inventory);
    }

    #[test]
    fn test_unregistered_type_fails_regardless_of_bytes() {
        let registry = TypeRegistry::new();
        registry.register::<Order>();

        let valid = serialize(&sample_order()).unwrap();
        let cases: [&[u8]; 3] = [valid.bytes.as_slice(), &[], &[0xff, 0x00]];
        for bytes in cases {
            let err = registry.deserialize(bytes, "app::Unknown").unwrap_err();
            assert_eq!(err, PayloadError::UnregisteredType("app::Unknown".into()));
        }
    }

    #[test]
    fn test_malformed_bytes_fail_decoding() {
        let registry = TypeRegistry::new();
        let name = registry.register::<Order>();

        let err = registry.deserialize(&[0xc1, 0x00, 0x13], name).unwrap_err();
        assert!(matches!(err, PayloadError::Decoding { .. }));
    }

    #[test]
    fn test_mismatched_shape_fails_decoding() {
        let registry = TypeRegistry::new();
        registry.register::<Order>();

        // Receipt bytes under the Order name: field names don't line up.
        let receipt = serialize(&Receipt { total_cents: 999 }).unwrap();
        let err = registry
            .deserialize(&receipt.bytes, type_name_of::<Order>())
            .unwrap_err();
        assert!(matches!(err, PayloadError::Decoding { .. }));
    }

    #[test]
    fn test_deserialize_as_wrong_type() {
        let registry = TypeRegistry::new();
        registry.register::<Order>();
        registry.register::<Receipt>();

        let payload = serialize(&sample_order()).unwrap();
        let err = registry.deserialize_as::<Receipt>(&payload).unwrap_err();
        assert!(matches!(err, PayloadError::TypeMismatch { .. }));
    }

    #[test]
    fn test_concurrent_decode() {
        let registry = Arc::new(TypeRegistry::new());
        registry.register::<Order>();
        let payload = serialize(&sample_order()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let payload = payload.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let order: Order = registry.deserialize_as(&payload).unwrap();
                        assert_eq!(order.id, 42);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_registries_are_independent() {
        let sender = TypeRegistry::new();
        let receiver = TypeRegistry::new();
        sender.register::<Order>();

        let payload = serialize(&sample_order()).unwrap();
        assert!(sender.decode(&payload).is_ok());
        assert!(matches!(
            receiver.decode(&payload),
            Err(PayloadError::UnregisteredType(_))
        ));
    }
}
