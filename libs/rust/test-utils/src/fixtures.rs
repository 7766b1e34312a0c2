//! Test fixtures with sample vault data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sample card submission, as the HTTP tokenize endpoint would receive it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleCard {
    /// Full PAN (test fixtures only ever use well-known test BINs).
    pub pan: String,
    /// Expiry in `MM/YY`.
    pub expiry: String,
    /// Cardholder name.
    pub cardholder_name: String,
}

impl SampleCard {
    /// A Visa test card.
    #[must_use]
    pub fn visa() -> Self {
        Self {
            pan: "4111111111111111".to_string(),
            expiry: "12/29".to_string(),
            cardholder_name: "Jane Doe".to_string(),
        }
    }

    /// A Mastercard test card.
    #[must_use]
    pub fn mastercard() -> Self {
        Self {
            pan: "5500000000000004".to_string(),
            expiry: "06/28".to_string(),
            cardholder_name: "John Roe".to_string(),
        }
    }

    /// An Amex test card (15 digits).
    #[must_use]
    pub fn amex() -> Self {
        Self {
            pan: "340000000000009".to_string(),
            expiry: "03/27".to_string(),
            cardholder_name: "Pat Lee".to_string(),
        }
    }
}

/// A sample vault record, as stored after tokenization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleVaultRecord {
    /// Opaque token.
    pub token: String,
    /// Owning merchant.
    pub merchant_id: String,
    /// Deterministic fingerprint of PAN + expiry.
    pub fingerprint: String,
    /// Record status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl SampleVaultRecord {
    /// An active record for a given merchant.
    #[must_use]
    pub fn active(merchant_id: &str) -> Self {
        Self {
            token: "tok_abc123def456ghi789jkl0".to_string(),
            merchant_id: merchant_id.to_string(),
            fingerprint: "f".repeat(64),
            status: "active".to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A sample DEK broker auth response for tests against [`crate::mocks::MockKeyBroker`].
#[derive(Debug, Clone)]
pub struct SampleDekMaterial {
    /// Key id.
    pub key_id: String,
    /// Raw (unwrapped, test-only) key bytes.
    pub material: Vec<u8>,
}

impl SampleDekMaterial {
    /// A 32-byte AES-256 key under a merchant's first key version.
    #[must_use]
    pub fn for_merchant(merchant_id: &str) -> Self {
        Self {
            key_id: format!("key_{merchant_id}_v1"),
            material: vec![0x42; 32],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_card_fixtures() {
        assert_eq!(SampleCard::visa().pan.len(), 16);
        assert_eq!(SampleCard::amex().pan.len(), 15);
    }

    #[test]
    fn test_sample_vault_record() {
        let record = SampleVaultRecord::active("merchant_abc123");
        assert_eq!(record.merchant_id, "merchant_abc123");
        assert_eq!(record.status, "active");
    }

    #[test]
    fn test_sample_dek_material() {
        let dek = SampleDekMaterial::for_merchant("merchant_abc123");
        assert_eq!(dek.key_id, "key_merchant_abc123_v1");
        assert_eq!(dek.material.len(), 32);
    }

    #[test]
    fn test_vault_record_serialization() {
        let record = SampleVaultRecord::active("merchant_xyz");
        let json = serde_json::to_string(&record).unwrap();
        let parsed: SampleVaultRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, parsed);
    }
}
