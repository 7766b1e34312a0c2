//! Card Vault Store: encrypted record CRUD, fingerprint dedup, read-through
//! cache.

use crate::domain::record::{VaultRecord, VaultStatus};
use crate::error::VaultError;
use async_trait::async_trait;
use chrono::Utc;
use rust_common::CacheClient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The Card Vault Store's capability set. A trait at the seam, matching the
/// teacher's `CryptoClient`/`SecretProvider` style, so a Postgres-backed
/// implementation can be swapped in without touching the service layer.
#[async_trait]
pub trait VaultStore: Send + Sync {
    /// Persist a new record and warm the token cache.
    async fn create(&self, record: VaultRecord) -> Result<(), VaultError>;
    /// Look up by token, `NotFound` (not `AccessDenied`) if absent.
    async fn find_by_token(&self, token: &str) -> Result<VaultRecord, VaultError>;
    /// Look up the unique active record for `(merchant_id, fingerprint)`.
    async fn find_by_fingerprint(
        &self,
        merchant_id: &str,
        fingerprint: &str,
    ) -> Result<Option<VaultRecord>, VaultError>;
    /// Look up by surrogate id.
    async fn find_by_id(&self, id: &str) -> Result<VaultRecord, VaultError>;
    /// Operator tooling: all records for a merchant sharing a last4.
    async fn find_by_merchant_and_last4(
        &self,
        merchant_id: &str,
        last4: &str,
    ) -> Result<Vec<VaultRecord>, VaultError>;
    /// Persist a full record update and invalidate the token cache.
    async fn update(&self, record: VaultRecord) -> Result<(), VaultError>;
    /// Transition a record's status, invalidating the cache.
    async fn update_status(&self, token: &str, new_status: VaultStatus) -> Result<(), VaultError>;
    /// Atomic usage increment plus `last_used_at = now`.
    async fn increment_usage(&self, token: &str) -> Result<(), VaultError>;
    /// Set `first_used_at` only if unset; idempotent.
    async fn set_first_used(&self, token: &str) -> Result<(), VaultError>;
    /// Revoke: status -> revoked, audit fields stamped.
    async fn revoke(&self, token: &str, revoked_by: &str, reason: &str) -> Result<(), VaultError>;
    /// Active records past their absolute expiry, bounded by `limit`.
    async fn find_expired(&self, limit: usize) -> Result<Vec<VaultRecord>, VaultError>;
    /// Bulk-transition records to `Expired`.
    async fn mark_expired(&self, ids: &[String]) -> Result<(), VaultError>;
    /// Count of (non-deleted) records owned by a merchant, for quotas.
    async fn count_by_merchant(&self, merchant_id: &str) -> Result<usize, VaultError>;
}

/// In-process implementation: a `Mutex`-guarded index enforcing the
/// single-process uniqueness invariants, plus a [`CacheClient`]-backed
/// read-through token cache. Reads tolerate a stale cache — the
/// Tokenization Service re-validates status/expiry before use.
pub struct CachedVaultStore {
    records: Mutex<HashMap<String, VaultRecord>>,
    token_index: Mutex<HashMap<String, String>>,
    fingerprint_index: Mutex<HashMap<(String, String), String>>,
    cache: Arc<CacheClient>,
}

impl CachedVaultStore {
    /// Construct a new store over a shared [`CacheClient`].
    #[must_use]
    pub fn new(cache: Arc<CacheClient>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            token_index: Mutex::new(HashMap::new()),
            fingerprint_index: Mutex::new(HashMap::new()),
            cache,
        }
    }

    fn cache_key(token: &str) -> String {
        format!("vault_record:{token}")
    }

    async fn warm_cache(&self, record: &VaultRecord) {
        if let Ok(bytes) = serde_json::to_vec(record) {
            let _ = self.cache.set(&Self::cache_key(&record.token), &bytes, None).await;
        }
    }

    async fn invalidate_cache(&self, token: &str) {
        let _ = self.cache.delete(&Self::cache_key(token)).await;
    }

    fn fingerprint_key(merchant_id: &str, fingerprint: &str) -> (String, String) {
        (merchant_id.to_string(), fingerprint.to_string())
    }
}

#[async_trait]
impl VaultStore for CachedVaultStore {
    async fn create(&self, record: VaultRecord) -> Result<(), VaultError> {
        let mut records = self.records.lock().await;
        let mut tokens = self.token_index.lock().await;
        if tokens.contains_key(&record.token) {
            return Err(VaultError::InternalError);
        }

        tokens.insert(record.token.clone(), record.id.clone());
        if record.status == VaultStatus::Active {
            self.fingerprint_index
                .lock()
                .await
                .insert(Self::fingerprint_key(&record.merchant_id, &record.fingerprint), record.id.clone());
        }
        records.insert(record.id.clone(), record.clone());
        drop(records);
        drop(tokens);

        self.warm_cache(&record).await;
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<VaultRecord, VaultError> {
        if let Ok(Some(bytes)) = self.cache.get(&Self::cache_key(token)).await {
            if let Ok(record) = serde_json::from_slice::<VaultRecord>(&bytes) {
                return Ok(record);
            }
        }

        let tokens = self.token_index.lock().await;
        let id = tokens.get(token).cloned().ok_or(VaultError::TokenNotFound)?;
        drop(tokens);
        let records = self.records.lock().await;
        let record = records.get(&id).cloned().ok_or(VaultError::TokenNotFound)?;
        drop(records);
        self.warm_cache(&record).await;
        Ok(record)
    }

    async fn find_by_fingerprint(
        &self,
        merchant_id: &str,
        fingerprint: &str,
    ) -> Result<Option<VaultRecord>, VaultError> {
        let index = self.fingerprint_index.lock().await;
        let Some(id) = index.get(&Self::fingerprint_key(merchant_id, fingerprint)).cloned() else {
            return Ok(None);
        };
        drop(index);
        let records = self.records.lock().await;
        Ok(records.get(&id).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<VaultRecord, VaultError> {
        self.records
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or(VaultError::TokenNotFound)
    }

    async fn find_by_merchant_and_last4(
        &self,
        merchant_id: &str,
        last4: &str,
    ) -> Result<Vec<VaultRecord>, VaultError> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .filter(|r| r.merchant_id == merchant_id && r.last4 == last4)
            .cloned()
            .collect())
    }

    async fn update(&self, record: VaultRecord) -> Result<(), VaultError> {
        let mut records = self.records.lock().await;
        records.insert(record.id.clone(), record.clone());
        drop(records);
        self.invalidate_cache(&record.token).await;
        Ok(())
    }

    async fn update_status(&self, token: &str, new_status: VaultStatus) -> Result<(), VaultError> {
        let id = self
            .token_index
            .lock()
            .await
            .get(token)
            .cloned()
            .ok_or(VaultError::TokenNotFound)?;

        let mut records = self.records.lock().await;
        let record = records.get_mut(&id).ok_or(VaultError::TokenNotFound)?;
        record.status = new_status;
        record.updated_at = Utc::now();
        if new_status != VaultStatus::Active {
            let key = Self::fingerprint_key(&record.merchant_id, &record.fingerprint);
            drop(records);
            self.fingerprint_index.lock().await.remove(&key);
        } else {
            drop(records);
        }
        self.invalidate_cache(token).await;
        Ok(())
    }

    async fn increment_usage(&self, token: &str) -> Result<(), VaultError> {
        let id = self
            .token_index
            .lock()
            .await
            .get(token)
            .cloned()
            .ok_or(VaultError::TokenNotFound)?;

        let mut records = self.records.lock().await;
        let record = records.get_mut(&id).ok_or(VaultError::TokenNotFound)?;
        record.usage_count += 1;
        record.last_used_at = Some(Utc::now());
        record.updated_at = Utc::now();
        drop(records);
        self.invalidate_cache(token).await;
        Ok(())
    }

    async fn set_first_used(&self, token: &str) -> Result<(), VaultError> {
        let id = self
            .token_index
            .lock()
            .await
            .get(token)
            .cloned()
            .ok_or(VaultError::TokenNotFound)?;

        let mut records = self.records.lock().await;
        let record = records.get_mut(&id).ok_or(VaultError::TokenNotFound)?;
        if record.first_used_at.is_none() {
            record.first_used_at = Some(Utc::now());
        }
        drop(records);
        self.invalidate_cache(token).await;
        Ok(())
    }

    async fn revoke(&self, token: &str, revoked_by: &str, reason: &str) -> Result<(), VaultError> {
        let id = self
            .token_index
            .lock()
            .await
            .get(token)
            .cloned()
            .ok_or(VaultError::TokenNotFound)?;

        let mut records = self.records.lock().await;
        let record = records.get_mut(&id).ok_or(VaultError::TokenNotFound)?;
        record.status = VaultStatus::Revoked;
        record.revoked_by = Some(revoked_by.to_string());
        record.revoked_at = Some(Utc::now());
        record.revocation_reason = Some(reason.to_string());
        record.updated_at = Utc::now();
        let key = Self::fingerprint_key(&record.merchant_id, &record.fingerprint);
        drop(records);
        self.fingerprint_index.lock().await.remove(&key);
        self.invalidate_cache(token).await;
        Ok(())
    }

    async fn find_expired(&self, limit: usize) -> Result<Vec<VaultRecord>, VaultError> {
        let now = Utc::now();
        let records = self.records.lock().await;
        Ok(records
            .values()
            .filter(|r| r.status == VaultStatus::Active)
            .filter(|r| r.absolute_expires_at.is_some_and(|exp| exp <= now))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_expired(&self, ids: &[String]) -> Result<(), VaultError> {
        let mut records = self.records.lock().await;
        for id in ids {
            if let Some(record) = records.get_mut(id) {
                record.status = VaultStatus::Expired;
                record.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn count_by_merchant(&self, merchant_id: &str) -> Result<usize, VaultError> {
        let records = self.records.lock().await;
        Ok(records.values().filter(|r| r.merchant_id == merchant_id && r.deleted_at.is_none()).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::card::{Brand, CardType};
    use rust_common::CacheClientConfig;

    async fn store() -> CachedVaultStore {
        let cache = Arc::new(CacheClient::new(CacheClientConfig::default()).await.unwrap());
        CachedVaultStore::new(cache)
    }

    fn sample_record(id: &str, token: &str, merchant_id: &str, fingerprint: &str) -> VaultRecord {
        let now = Utc::now();
        VaultRecord {
            id: id.to_string(),
            token: token.to_string(),
            merchant_id: merchant_id.to_string(),
            pan_ciphertext: "ct".into(),
            cardholder_name_ciphertext: None,
            exp_month_ciphertext: "ct".into(),
            exp_year_ciphertext: "ct".into(),
            key_id: "key_m1_v1".into(),
            key_version: 1,
            last4: "4242".into(),
            first6: "424242".into(),
            brand: Brand::Visa,
            card_type: CardType::Credit,
            exp_month: 12,
            exp_year: 2099,
            fingerprint: fingerprint.to_string(),
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

    #[tokio::test]
    async fn create_and_find_by_token() {
        let store = store().await;
        let record = sample_record("id1", "tok_test_a", "merchant_m1", "f1");
        store.create(record.clone()).await.unwrap();

        let found = store.find_by_token("tok_test_a").await.unwrap();
        assert_eq!(found.id, "id1");
    }

    #[tokio::test]
    async fn find_unknown_token_is_not_found() {
        let store = store().await;
        let err = store.find_by_token("tok_test_missing").await.unwrap_err();
        assert!(matches!(err, VaultError::TokenNotFound));
    }

    #[tokio::test]
    async fn find_by_fingerprint_returns_active_only() {
        let store = store().await;
        let record = sample_record("id1", "tok_test_a", "merchant_m1", "fp1");
        store.create(record).await.unwrap();

        let found = store.find_by_fingerprint("merchant_m1", "fp1").await.unwrap();
        assert!(found.is_some());

        store.revoke("tok_test_a", "admin", "lost card").await.unwrap();
        let found = store.find_by_fingerprint("merchant_m1", "fp1").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn revoke_then_new_tokenize_gets_fresh_fingerprint_slot() {
        let store = store().await;
        let record = sample_record("id1", "tok_test_a", "merchant_m1", "fp1");
        store.create(record).await.unwrap();
        store.revoke("tok_test_a", "admin", "lost card").await.unwrap();

        let record2 = sample_record("id2", "tok_test_b", "merchant_m1", "fp1");
        store.create(record2).await.unwrap();

        let found = store.find_by_fingerprint("merchant_m1", "fp1").await.unwrap();
        assert_eq!(found.unwrap().id, "id2");
    }

    #[tokio::test]
    async fn increment_usage_and_set_first_used() {
        let store = store().await;
        let record = sample_record("id1", "tok_test_a", "merchant_m1", "fp1");
        store.create(record).await.unwrap();

        store.set_first_used("tok_test_a").await.unwrap();
        store.increment_usage("tok_test_a").await.unwrap();

        let found = store.find_by_token("tok_test_a").await.unwrap();
        assert_eq!(found.usage_count, 1);
        assert!(found.first_used_at.is_some());
    }

    #[tokio::test]
    async fn cross_merchant_isolation_on_fingerprint() {
        let store = store().await;
        store.create(sample_record("id1", "tok_test_a", "merchant_m1", "fp1")).await.unwrap();
        store.create(sample_record("id2", "tok_test_b", "merchant_m2", "fp1")).await.unwrap();

        let m1 = store.find_by_fingerprint("merchant_m1", "fp1").await.unwrap().unwrap();
        let m2 = store.find_by_fingerprint("merchant_m2", "fp1").await.unwrap().unwrap();
        assert_ne!(m1.id, m2.id);
    }

    #[tokio::test]
    async fn count_by_merchant() {
        let store = store().await;
        store.create(sample_record("id1", "tok_test_a", "merchant_m1", "fp1")).await.unwrap();
        store.create(sample_record("id2", "tok_test_b", "merchant_m1", "fp2")).await.unwrap();
        store.create(sample_record("id3", "tok_test_c", "merchant_m2", "fp3")).await.unwrap();

        assert_eq!(store.count_by_merchant("merchant_m1").await.unwrap(), 2);
    }
}
