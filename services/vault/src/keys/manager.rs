//! Key Manager: per-merchant DEK lifecycle over an external key broker.
//!
//! DEK material lives in the key broker (production) or an in-process map
//! (development, logged as unsafe at startup). Metadata — id, version,
//! state, usage counters — always lives in-process, mirroring the shape
//! `CryptoClientCore` uses for its metadata cache, but keyed by key id
//! rather than by a remote-fetched descriptor.

use crate::domain::key::{derive_key_id, KeyMetadata, KeyState};
use crate::error::VaultError;
use chrono::{DateTime, Utc};
use key_broker::KeyBroker;
use rust_common::CircuitBreaker;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use zeroize::Zeroizing;

/// Aggregate key statistics for one merchant, per spec §4.2 `statistics`.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyStatistics {
    /// Total keys ever created for this merchant.
    pub total: usize,
    /// Keys currently active (0 or 1).
    pub active: usize,
    /// Keys rotated out but still decryptable.
    pub rotated: usize,
    /// Keys revoked and no longer decryptable.
    pub revoked: usize,
    /// Age of the oldest key, in days.
    pub oldest_age_days: i64,
    /// Timestamp of the most recent rotation, if any.
    pub last_rotation: Option<DateTime<Utc>>,
}

struct MerchantState {
    metadata: HashMap<String, KeyMetadata>,
    active_key_id: Option<String>,
}

impl MerchantState {
    fn new() -> Self {
        Self {
            metadata: HashMap::new(),
            active_key_id: None,
        }
    }

    fn next_version(&self) -> u32 {
        self.metadata.values().map(|m| m.version).max().unwrap_or(0) + 1
    }
}

/// Key Manager, backed by a pluggable [`KeyBroker`] for DEK material.
pub struct KeyManager {
    broker: Arc<dyn KeyBroker>,
    /// Per-merchant metadata and active-key pointer, guarded so two
    /// concurrent `get_or_create_key` calls for the same merchant serialize.
    merchants: Mutex<HashMap<String, MerchantState>>,
    /// Development-mode-only DEK material, held in-process and zeroized on
    /// eviction/drop.
    local_material: Mutex<HashMap<String, Zeroizing<Vec<u8>>>>,
    dek_cache: Mutex<HashMap<String, Zeroizing<Vec<u8>>>>,
    circuit_breaker: Arc<CircuitBreaker>,
    production_mode: bool,
    rotation_max_age_days: i64,
    rotation_max_records: u64,
}

impl KeyManager {
    /// Construct a new manager. `production_mode = false` enables local DEK
    /// generation and MUST be logged as unsafe, per spec §4.2.
    #[must_use]
    pub fn new(
        broker: Arc<dyn KeyBroker>,
        circuit_breaker: Arc<CircuitBreaker>,
        production_mode: bool,
        rotation_max_age_days: i64,
        rotation_max_records: u64,
    ) -> Self {
        if !production_mode {
            warn!("Key Manager running with production_mode=false: DEKs are generated locally and held in memory, not backed by the key broker");
        }
        Self {
            broker,
            merchants: Mutex::new(HashMap::new()),
            local_material: Mutex::new(HashMap::new()),
            dek_cache: Mutex::new(HashMap::new()),
            circuit_breaker,
            production_mode,
            rotation_max_age_days,
            rotation_max_records,
        }
    }

    /// Supply a valid DEK for `merchant_id`, creating one if none is active
    /// or the active one is invalid.
    ///
    /// # Errors
    /// Returns `KeyBrokerUnavailable` if the broker's circuit is open or the
    /// broker call fails.
    #[instrument(skip(self), fields(merchant_id))]
    pub async fn get_or_create_key(&self, merchant_id: &str) -> Result<(Zeroizing<Vec<u8>>, String), VaultError> {
        let mut merchants = self.merchants.lock().await;
        let state = merchants.entry(merchant_id.to_string()).or_insert_with(MerchantState::new);

        if let Some(active_id) = state.active_key_id.clone() {
            if let Some(meta) = state.metadata.get(&active_id) {
                if meta.state == KeyState::Active {
                    drop(merchants);
                    let material = self.fetch_material(&active_id).await?;
                    return Ok((material, active_id));
                }
            }
        }

        self.create_key_locked(merchant_id, state, "system").await
    }

    /// Fetch the DEK named by `key_id`, usable for decrypt even if rotated,
    /// but never if revoked.
    ///
    /// # Errors
    /// Returns `KeyRevoked` if the key has been revoked, `KeyBrokerUnavailable`
    /// on broker failure.
    #[instrument(skip(self))]
    pub async fn get_key_by_id(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        {
            let merchants = self.merchants.lock().await;
            for state in merchants.values() {
                if let Some(meta) = state.metadata.get(key_id) {
                    if meta.state == KeyState::Revoked {
                        return Err(VaultError::KeyRevoked);
                    }
                }
            }
        }
        self.fetch_material(key_id).await
    }

    /// Allocate a new DEK for `merchant_id`, persist its metadata, and cache
    /// the material.
    ///
    /// # Errors
    /// Returns `KeyBrokerUnavailable` on broker failure.
    pub async fn create_key(&self, merchant_id: &str) -> Result<(Zeroizing<Vec<u8>>, String), VaultError> {
        let mut merchants = self.merchants.lock().await;
        let state = merchants.entry(merchant_id.to_string()).or_insert_with(MerchantState::new);
        self.create_key_locked(merchant_id, state, "system").await
    }

    async fn create_key_locked(
        &self,
        merchant_id: &str,
        state: &mut MerchantState,
        created_by: &str,
    ) -> Result<(Zeroizing<Vec<u8>>, String), VaultError> {
        let version = state.next_version();
        let key_id = derive_key_id(merchant_id, version);

        let material = self.broker_create(&key_id).await?;

        let meta = KeyMetadata::new(merchant_id, version, created_by);
        state.metadata.insert(key_id.clone(), meta);
        state.active_key_id = Some(key_id.clone());

        self.dek_cache.lock().await.insert(key_id.clone(), material.clone());
        Ok((material, key_id))
    }

    /// Mark the active key as rotated and create a new one. Existing vault
    /// records keep their original key reference — this never re-encrypts.
    ///
    /// # Errors
    /// Returns `KeyBrokerUnavailable` on broker failure, or propagates a
    /// not-found condition if there is no active key to rotate.
    #[instrument(skip(self))]
    pub async fn rotate(&self, merchant_id: &str, rotated_by: &str) -> Result<String, VaultError> {
        let mut merchants = self.merchants.lock().await;
        let state = merchants.entry(merchant_id.to_string()).or_insert_with(MerchantState::new);

        if let Some(active_id) = state.active_key_id.clone() {
            if let Some(meta) = state.metadata.get_mut(&active_id) {
                meta.state = KeyState::Rotated;
                meta.rotated_at = Some(Utc::now());
            }
        }

        let (_, new_key_id) = self.create_key_locked(merchant_id, state, rotated_by).await?;
        Ok(new_key_id)
    }

    /// Revoke `key_id`: deactivate, stamp audit fields, evict from cache.
    /// Subsequent detokenize attempts using it fail with `KeyRevoked`.
    #[instrument(skip(self))]
    pub async fn revoke(&self, key_id: &str, revoked_by: &str) -> Result<(), VaultError> {
        let mut merchants = self.merchants.lock().await;
        let mut found = false;
        for state in merchants.values_mut() {
            if let Some(meta) = state.metadata.get_mut(key_id) {
                meta.state = KeyState::Revoked;
                meta.revoked_at = Some(Utc::now());
                meta.revoked_by = Some(revoked_by.to_string());
                if state.active_key_id.as_deref() == Some(key_id) {
                    state.active_key_id = None;
                }
                found = true;
            }
        }
        drop(merchants);
        self.dek_cache.lock().await.remove(key_id);
        if found {
            Ok(())
        } else {
            Err(VaultError::TokenNotFound)
        }
    }

    /// Whether `merchant_id`'s active key is due for rotation by age or
    /// usage-cap policy.
    pub async fn rotation_needed(&self, merchant_id: &str) -> (bool, Option<&'static str>) {
        let merchants = self.merchants.lock().await;
        let Some(state) = merchants.get(merchant_id) else {
            return (false, None);
        };
        let Some(active_id) = &state.active_key_id else {
            return (false, None);
        };
        let Some(meta) = state.metadata.get(active_id) else {
            return (false, None);
        };

        let age_days = (Utc::now() - meta.created_at).num_days();
        if age_days > self.rotation_max_age_days {
            return (true, Some("max_age_exceeded"));
        }
        if meta.encrypted_records > self.rotation_max_records {
            return (true, Some("max_records_exceeded"));
        }
        (false, None)
    }

    /// Record one more encrypted record against `key_id`'s usage counter.
    pub async fn record_encryption(&self, key_id: &str) {
        let mut merchants = self.merchants.lock().await;
        for state in merchants.values_mut() {
            if let Some(meta) = state.metadata.get_mut(key_id) {
                meta.encrypted_records += 1;
                meta.last_used_at = Some(Utc::now());
            }
        }
    }

    /// Aggregate statistics for `merchant_id`, per spec §4.2.
    pub async fn statistics(&self, merchant_id: &str) -> KeyStatistics {
        let merchants = self.merchants.lock().await;
        let Some(state) = merchants.get(merchant_id) else {
            return KeyStatistics {
                total: 0,
                active: 0,
                rotated: 0,
                revoked: 0,
                oldest_age_days: 0,
                last_rotation: None,
            };
        };

        let total = state.metadata.len();
        let active = state.metadata.values().filter(|m| m.state == KeyState::Active).count();
        let rotated = state.metadata.values().filter(|m| m.state == KeyState::Rotated).count();
        let revoked = state.metadata.values().filter(|m| m.state == KeyState::Revoked).count();
        let oldest_age_days = state
            .metadata
            .values()
            .map(|m| (Utc::now() - m.created_at).num_days())
            .max()
            .unwrap_or(0);
        let last_rotation = state.metadata.values().filter_map(|m| m.rotated_at).max();

        KeyStatistics {
            total,
            active,
            rotated,
            revoked,
            oldest_age_days,
            last_rotation,
        }
    }

    async fn broker_create(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        if !self.production_mode {
            let mut local = self.local_material.lock().await;
            let material = crate::crypto::CryptoEngine::generate_dek();
            local.insert(key_id.to_string(), material.clone());
            return Ok(material);
        }

        if !self.circuit_breaker.allow_request().await {
            return Err(VaultError::KeyBrokerUnavailable);
        }
        match self.broker.create(key_id).await {
            Ok(material) => {
                self.circuit_breaker.record_success().await;
                Ok(material)
            }
            Err(e) => {
                self.circuit_breaker.record_failure().await;
                warn!(error = %e, key_id, "key broker create failed");
                Err(VaultError::KeyBrokerUnavailable)
            }
        }
    }

    async fn fetch_material(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        if let Some(cached) = self.dek_cache.lock().await.get(key_id) {
            return Ok(cached.clone());
        }

        if !self.production_mode {
            return self
                .local_material
                .lock()
                .await
                .get(key_id)
                .cloned()
                .ok_or(VaultError::TokenNotFound);
        }

        if !self.circuit_breaker.allow_request().await {
            return Err(VaultError::KeyBrokerUnavailable);
        }
        match self.broker.fetch(key_id).await {
            Ok(material) => {
                self.circuit_breaker.record_success().await;
                self.dek_cache.lock().await.insert(key_id.to_string(), material.clone());
                Ok(material)
            }
            Err(e) => {
                self.circuit_breaker.record_failure().await;
                warn!(error = %e, key_id, "key broker fetch failed");
                Err(VaultError::KeyBrokerUnavailable)
            }
        }
    }
}

/// Default broker-retry backoff; unused directly but documents the spec's
/// "bounded timeout inherited from the request context" for broker calls.
pub const BROKER_CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use key_broker::KeyBrokerError;
    use rust_common::CircuitBreakerConfig;
    use tokio::sync::RwLock as TokioRwLock;

    struct FakeBroker {
        material: TokioRwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
    }

    impl FakeBroker {
        fn new() -> Self {
            Self {
                material: TokioRwLock::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl KeyBroker for FakeBroker {
        async fn create(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>, KeyBrokerError> {
            let material = Zeroizing::new(vec![0x11; 32]);
            self.material.write().await.insert(key_id.to_string(), material.clone());
            Ok(material)
        }

        async fn fetch(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>, KeyBrokerError> {
            self.material
                .read()
                .await
                .get(key_id)
                .cloned()
                .ok_or_else(|| KeyBrokerError::KeyNotFound(key_id.to_string()))
        }

        async fn destroy(&self, key_id: &str) -> Result<(), KeyBrokerError> {
            self.material.write().await.remove(key_id);
            Ok(())
        }
    }

    fn manager() -> KeyManager {
        KeyManager::new(
            Arc::new(FakeBroker::new()),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            true,
            90,
            1_000_000,
        )
    }

    #[tokio::test]
    async fn creates_key_when_none_active() {
        let mgr = manager();
        let (material, key_id) = mgr.get_or_create_key("merchant_m1").await.unwrap();
        assert_eq!(material.len(), 32);
        assert_eq!(key_id, "key_merchant_m1_v1");
    }

    #[tokio::test]
    async fn repeated_calls_return_consistent_key() {
        let mgr = manager();
        let (_, first) = mgr.get_or_create_key("merchant_m1").await.unwrap();
        let (_, second) = mgr.get_or_create_key("merchant_m1").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn rotation_creates_new_version_and_rotates_old() {
        let mgr = manager();
        let (_, v1) = mgr.get_or_create_key("merchant_m1").await.unwrap();
        let v2 = mgr.rotate("merchant_m1", "admin").await.unwrap();
        assert_ne!(v1, v2);
        assert_eq!(v2, "key_merchant_m1_v2");

        // old key still fetchable (rotated, not revoked)
        let material = mgr.get_key_by_id(&v1).await.unwrap();
        assert_eq!(material.len(), 32);
    }

    #[tokio::test]
    async fn revoked_key_cannot_be_fetched() {
        let mgr = manager();
        let (_, key_id) = mgr.get_or_create_key("merchant_m1").await.unwrap();
        mgr.revoke(&key_id, "admin").await.unwrap();

        let err = mgr.get_key_by_id(&key_id).await.unwrap_err();
        assert!(matches!(err, VaultError::KeyRevoked));
    }

    #[tokio::test]
    async fn revoked_key_not_returned_by_get_or_create() {
        let mgr = manager();
        let (_, key_id) = mgr.get_or_create_key("merchant_m1").await.unwrap();
        mgr.revoke(&key_id, "admin").await.unwrap();

        let (_, new_key) = mgr.get_or_create_key("merchant_m1").await.unwrap();
        assert_ne!(new_key, key_id);
    }

    #[tokio::test]
    async fn rotation_needed_respects_record_cap() {
        let mgr = KeyManager::new(
            Arc::new(FakeBroker::new()),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            true,
            90,
            2,
        );
        let (_, key_id) = mgr.get_or_create_key("merchant_m1").await.unwrap();
        for _ in 0..3 {
            mgr.record_encryption(&key_id).await;
        }
        let (needed, reason) = mgr.rotation_needed("merchant_m1").await;
        assert!(needed);
        assert_eq!(reason, Some("max_records_exceeded"));
    }

    #[tokio::test]
    async fn development_mode_generates_local_material() {
        let mgr = KeyManager::new(
            Arc::new(FakeBroker::new()),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            false,
            90,
            1_000_000,
        );
        let (material, key_id) = mgr.get_or_create_key("merchant_m1").await.unwrap();
        assert_eq!(material.len(), 32);
        let refetched = mgr.get_key_by_id(&key_id).await.unwrap();
        assert_eq!(refetched.as_slice(), material.as_slice());
    }

    #[tokio::test]
    async fn statistics_reflect_lifecycle() {
        let mgr = manager();
        let (_, v1) = mgr.get_or_create_key("merchant_m1").await.unwrap();
        mgr.rotate("merchant_m1", "admin").await.unwrap();
        let stats = mgr.statistics("merchant_m1").await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.rotated, 1);
        assert!(stats.last_rotation.is_some());
        let _ = v1;
    }
}
