//! The `KeyBroker` capability set the vault's Key Manager consumes.

use crate::error::KeyBrokerError;
use async_trait::async_trait;
use zeroize::Zeroizing;

/// External broker for KEK-wrapped data-encryption-key material.
///
/// Implementations address key material by an opaque `key_id` (the vault
/// mints these as `key_<merchant>_v<n>`; the broker does not interpret the
/// string beyond using it as a lookup path). Returned material is wrapped
/// in `Zeroizing` so it is scrubbed from memory once the caller drops it.
#[async_trait]
pub trait KeyBroker: Send + Sync {
    /// Create new DEK material under `key_id` and return the KEK-wrapped bytes.
    ///
    /// Errors if material already exists under this id.
    async fn create(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>, KeyBrokerError>;

    /// Fetch the KEK-wrapped DEK material stored under `key_id`.
    ///
    /// Returns [`KeyBrokerError::KeyNotFound`] if no material exists.
    async fn fetch(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>, KeyBrokerError>;

    /// Permanently destroy the material stored under `key_id`.
    ///
    /// Idempotent: destroying an already-absent key id is not an error.
    async fn destroy(&self, key_id: &str) -> Result<(), KeyBrokerError>;
}
