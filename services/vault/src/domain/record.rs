//! Card Vault Record — one per stored card-per-merchant-per-lifetime.

use crate::domain::card::{Brand, CardType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of record lifecycle states. `Revoked` and `Used` are
/// terminal; `Active` is the only state from which a transition is legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultStatus {
    /// Live and usable.
    Active,
    /// Past its absolute expiry or card expiry.
    Expired,
    /// Explicitly revoked by the owning merchant.
    Revoked,
    /// Single-use token consumed by one detokenize.
    Used,
}

impl VaultStatus {
    /// Terminal states never transition further.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked | Self::Used | Self::Expired)
    }
}

/// One stored card, encrypted at rest. Ciphertexts are base64
/// nonce∥ciphertext∥tag blobs produced by [`crate::crypto::engine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRecord {
    /// Surrogate id.
    pub id: String,
    /// Stable opaque token, `tok_<env>_<64 hex>`.
    pub token: String,
    /// Owning merchant.
    pub merchant_id: String,

    /// Base64 AEAD ciphertext of the PAN.
    pub pan_ciphertext: String,
    /// Base64 AEAD ciphertext of the cardholder name, if present.
    pub cardholder_name_ciphertext: Option<String>,
    /// Base64 AEAD ciphertext of the expiry month.
    pub exp_month_ciphertext: String,
    /// Base64 AEAD ciphertext of the expiry year.
    pub exp_year_ciphertext: String,

    /// DEK id used for this record's ciphertexts.
    pub key_id: String,
    /// DEK version used for this record's ciphertexts.
    pub key_version: u32,

    /// Last 4 digits, plaintext (non-sensitive).
    pub last4: String,
    /// First 6 digits, plaintext (non-sensitive).
    pub first6: String,
    /// Card brand.
    pub brand: Brand,
    /// Card type.
    pub card_type: CardType,
    /// Expiry month as an integer, for expiry checks without decryption.
    pub exp_month: u32,
    /// Expiry year as an integer.
    pub exp_year: u32,

    /// Deterministic fingerprint over PAN + expiry.
    pub fingerprint: String,

    /// Current lifecycle state.
    pub status: VaultStatus,
    /// Whether this token is consumed after one detokenize.
    pub is_single_use: bool,
    /// Optional absolute expiry, independent of the card's own expiry.
    pub absolute_expires_at: Option<DateTime<Utc>>,
    /// Number of successful detokenize operations against this record.
    pub usage_count: u64,
    /// Timestamp of the first successful detokenize.
    pub first_used_at: Option<DateTime<Utc>>,
    /// Timestamp of the most recent successful detokenize.
    pub last_used_at: Option<DateTime<Utc>>,

    /// Actor id that created this record.
    pub created_by: String,
    /// Actor id that revoked this record, if revoked.
    pub revoked_by: Option<String>,
    /// Revocation timestamp, if revoked.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Revocation reason, if revoked.
    pub revocation_reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete timestamp; records are never hard-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl VaultRecord {
    /// Whether the record is currently usable for detokenize: active status,
    /// not past its absolute expiry, and the card itself hasn't expired.
    #[must_use]
    pub fn is_currently_valid(&self, now: DateTime<Utc>) -> bool {
        if self.status != VaultStatus::Active {
            return false;
        }
        if let Some(expiry) = self.absolute_expires_at {
            if now >= expiry {
                return false;
            }
        }
        let current_year = now.format("%Y").to_string().parse::<u32>().unwrap_or(0);
        let current_month = now.format("%m").to_string().parse::<u32>().unwrap_or(0);
        if self.exp_year < current_year
            || (self.exp_year == current_year && self.exp_month < current_month)
        {
            return false;
        }
        if self.is_single_use && self.usage_count > 0 {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_record() -> VaultRecord {
        let now = Utc::now();
        VaultRecord {
            id: "id1".into(),
            token: "tok_test_abc".into(),
            merchant_id: "merchant_m1".into(),
            pan_ciphertext: "ct".into(),
            cardholder_name_ciphertext: None,
            exp_month_ciphertext: "ct".into(),
            exp_year_ciphertext: "ct".into(),
            key_id: "key_merchant_m1_v1".into(),
            key_version: 1,
            last4: "4242".into(),
            first6: "424242".into(),
            brand: Brand::Visa,
            card_type: CardType::Credit,
            exp_month: 12,
            exp_year: 2099,
            fingerprint: "f".repeat(64),
            status: VaultStatus::Active,
            is_single_use: false,
            absolute_expires_at: None,
            usage_count: 0,
            first_used_at: None,
            last_used_at: None,
            created_by: "actor1".into(),
            revoked_by: None,
            revoked_at: None,
            revocation_reason: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn active_unexpired_record_is_valid() {
        assert!(base_record().is_currently_valid(Utc::now()));
    }

    #[test]
    fn revoked_record_is_invalid() {
        let mut r = base_record();
        r.status = VaultStatus::Revoked;
        assert!(!r.is_currently_valid(Utc::now()));
    }

    #[test]
    fn single_use_exhausted_is_invalid() {
        let mut r = base_record();
        r.is_single_use = true;
        r.usage_count = 1;
        assert!(!r.is_currently_valid(Utc::now()));
    }

    #[test]
    fn past_absolute_expiry_is_invalid() {
        let mut r = base_record();
        r.absolute_expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(!r.is_currently_valid(Utc::now()));
    }

    #[test]
    fn terminal_states_never_transition() {
        assert!(VaultStatus::Revoked.is_terminal());
        assert!(VaultStatus::Used.is_terminal());
        assert!(!VaultStatus::Active.is_terminal());
    }
}
