//! Encryption key metadata — one row per DEK.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a DEK, modeled as a closed tagged variant rather than
/// a bare `is_active` boolean plus implicit "rotated" string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyState {
    /// Currently the merchant's live key.
    Active,
    /// Superseded by a newer version; still usable for decrypt.
    Rotated,
    /// Revoked; no longer addressable for encrypt or decrypt.
    Revoked,
}

impl KeyState {
    /// Whether this key may still be fetched for decrypt.
    #[must_use]
    pub const fn can_decrypt(&self) -> bool {
        !matches!(self, Self::Revoked)
    }
}

/// Metadata for one DEK. The key material itself lives in the key broker
/// (production) or the in-process cache (development); this row never holds
/// raw key bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMetadata {
    /// Unique key id, `key_<merchant_id>_v<version>`.
    pub key_id: String,
    /// Monotonically increasing version within a merchant.
    pub version: u32,
    /// Owning merchant.
    pub merchant_id: String,
    /// Algorithm tag, always `AES-256-GCM` in this implementation.
    pub algorithm: String,
    /// Always `card_data` for vault DEKs.
    pub purpose: String,
    /// Current lifecycle state.
    pub state: KeyState,
    /// Number of records encrypted under this key.
    pub encrypted_records: u64,
    /// When the key was created.
    pub created_at: DateTime<Utc>,
    /// When this key was rotated out, if it was.
    pub rotated_at: Option<DateTime<Utc>>,
    /// When this key was revoked, if it was.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Who created the key.
    pub created_by: String,
    /// Who revoked the key, if revoked.
    pub revoked_by: Option<String>,
    /// Last time this key was used to encrypt or decrypt.
    pub last_used_at: Option<DateTime<Utc>>,
}

impl KeyMetadata {
    /// Construct metadata for a freshly created key.
    #[must_use]
    pub fn new(merchant_id: &str, version: u32, created_by: &str) -> Self {
        let key_id = derive_key_id(merchant_id, version);
        Self {
            key_id,
            version,
            merchant_id: merchant_id.to_string(),
            algorithm: "AES-256-GCM".to_string(),
            purpose: "card_data".to_string(),
            state: KeyState::Active,
            encrypted_records: 0,
            created_at: Utc::now(),
            rotated_at: None,
            revoked_at: None,
            created_by: created_by.to_string(),
            revoked_by: None,
            last_used_at: None,
        }
    }
}

/// Derive the conventional key id for a merchant's DEK version.
#[must_use]
pub fn derive_key_id(merchant_id: &str, version: u32) -> String {
    format!("key_{merchant_id}_v{version}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_id_format() {
        assert_eq!(derive_key_id("merchant_abc", 3), "key_merchant_abc_v3");
    }

    #[test]
    fn new_key_is_active() {
        let meta = KeyMetadata::new("merchant_abc", 1, "system");
        assert_eq!(meta.state, KeyState::Active);
        assert_eq!(meta.encrypted_records, 0);
    }

    #[test]
    fn revoked_key_cannot_decrypt() {
        assert!(!KeyState::Revoked.can_decrypt());
        assert!(KeyState::Active.can_decrypt());
        assert!(KeyState::Rotated.can_decrypt());
    }
}
