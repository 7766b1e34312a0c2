//! Property tests over the Tokenization Service's core invariants:
//! deduplication, revocation idempotence, and Luhn enforcement.

use async_trait::async_trait;
use key_broker::{KeyBroker, KeyBrokerError};
use proptest::prelude::*;
use rust_common::{
    CacheClient, CacheClientConfig, CircuitBreaker, CircuitBreakerConfig, LoggingClient,
    LoggingClientConfig,
};
use std::collections::HashMap;
use std::sync::Arc;
use test_utils::{invalid_luhn_pan_strategy, merchant_id_strategy, pan_strategy};
use tokio::sync::RwLock;
use vault_service::config::TokenEnvironment;
use vault_service::crypto::CryptoEngine;
use vault_service::domain::Brand;
use vault_service::keys::KeyManager;
use vault_service::service::{AuditLogger, TokenizationService, TokenizeInput};
use vault_service::storage::{CachedVaultStore, VaultStore};

struct FakeBroker {
    material: RwLock<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl KeyBroker for FakeBroker {
    async fn create(&self, key_id: &str) -> Result<Vec<u8>, KeyBrokerError> {
        let material = CryptoEngine::generate_dek().to_vec();
        self.material.write().await.insert(key_id.to_string(), material.clone());
        Ok(material)
    }

    async fn fetch(&self, key_id: &str) -> Result<Vec<u8>, KeyBrokerError> {
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

async fn test_service() -> TokenizationService {
    let cache = Arc::new(CacheClient::new(CacheClientConfig::default()).await.unwrap());
    let store: Arc<dyn VaultStore> = Arc::new(CachedVaultStore::new(cache));
    let keys = Arc::new(KeyManager::new(
        Arc::new(FakeBroker { material: RwLock::new(HashMap::new()) }),
        Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
        true,
        90,
        1_000_000,
    ));
    let logging = Arc::new(LoggingClient::new(LoggingClientConfig::default()).await.unwrap());
    let audit = Arc::new(AuditLogger::new(logging));
    TokenizationService::new(keys, store, audit, TokenEnvironment::Test, false)
}

fn supported_pan_strategy() -> impl Strategy<Value = String> {
    pan_strategy().prop_filter("must be a recognized brand", |pan| Brand::detect(pan).is_supported())
}

fn tokenize_input(merchant_id: String, card_number: String) -> TokenizeInput {
    TokenizeInput {
        merchant_id,
        card_number,
        cardholder_name: "JANE DOE".to_string(),
        exp_month: 12,
        exp_year: 2035,
        cvv: "123".to_string(),
        is_single_use: false,
        expires_in_seconds: None,
        request_id: "req_prop".to_string(),
        actor_id: "actor_prop".to_string(),
        ip: "127.0.0.1".to_string(),
        user_agent: "proptest".to_string(),
    }
}

proptest! {
    /// Tokenizing the same card for the same merchant twice returns the same
    /// token and flags the second call as a dedup hit, not a new record.
    #[test]
    fn tokenizing_same_card_twice_deduplicates(
        merchant_id in merchant_id_strategy(),
        card_number in supported_pan_strategy(),
    ) {
        tokio::runtime::Runtime::new().unwrap().block_on(async {
            let service = test_service().await;
            let first = service.tokenize(tokenize_input(merchant_id.clone(), card_number.clone())).await.unwrap();
            let second = service.tokenize(tokenize_input(merchant_id, card_number)).await.unwrap();

            prop_assert_eq!(first.token.clone(), second.token);
            prop_assert!(first.is_new_token);
            prop_assert!(!second.is_new_token);
            Ok(())
        })?;
    }

    /// The same card tokenized for two distinct merchants never collides on
    /// a token, even though the fingerprint alone is merchant-agnostic.
    #[test]
    fn tokenizing_same_card_for_different_merchants_never_collides(
        merchant_a in merchant_id_strategy(),
        merchant_b in merchant_id_strategy(),
        card_number in supported_pan_strategy(),
    ) {
        prop_assume!(merchant_a != merchant_b);
        tokio::runtime::Runtime::new().unwrap().block_on(async {
            let service = test_service().await;
            let a = service.tokenize(tokenize_input(merchant_a, card_number.clone())).await.unwrap();
            let b = service.tokenize(tokenize_input(merchant_b, card_number)).await.unwrap();

            prop_assert_ne!(a.token, b.token);
            prop_assert!(a.is_new_token);
            prop_assert!(b.is_new_token);
            Ok(())
        })?;
    }

    /// A PAN that fails the Luhn checksum is always rejected before any
    /// record is created, regardless of merchant or card metadata.
    #[test]
    fn luhn_invalid_pans_are_always_rejected(
        merchant_id in merchant_id_strategy(),
        card_number in invalid_luhn_pan_strategy(),
    ) {
        tokio::runtime::Runtime::new().unwrap().block_on(async {
            let service = test_service().await;
            let result = service.tokenize(tokenize_input(merchant_id, card_number)).await;
            prop_assert!(result.is_err());
            Ok(())
        })?;
    }

    /// Revoking a token is idempotent: a second revoke on an already-revoked
    /// token succeeds without error and the token stays revoked.
    #[test]
    fn revoking_twice_is_idempotent(
        merchant_id in merchant_id_strategy(),
        card_number in supported_pan_strategy(),
    ) {
        tokio::runtime::Runtime::new().unwrap().block_on(async {
            let service = test_service().await;
            let out = service.tokenize(tokenize_input(merchant_id.clone(), card_number)).await.unwrap();

            service.revoke_token(&out.token, &merchant_id, "actor_prop", "fraud", "req_revoke_1").await.unwrap();
            service.revoke_token(&out.token, &merchant_id, "actor_prop", "fraud", "req_revoke_2").await.unwrap();

            let status = service.validate_token(&out.token, &merchant_id, "actor_prop", "req_validate_1").await.unwrap();
            prop_assert!(!status.valid);
            Ok(())
        })?;
    }

    /// Validating a token scoped to a different merchant is indistinguishable
    /// from validating one that doesn't exist at all.
    #[test]
    fn validate_denies_cross_merchant_access(
        owner in merchant_id_strategy(),
        intruder in merchant_id_strategy(),
        card_number in supported_pan_strategy(),
    ) {
        prop_assume!(owner != intruder);
        tokio::runtime::Runtime::new().unwrap().block_on(async {
            let service = test_service().await;
            let out = service.tokenize(tokenize_input(owner, card_number)).await.unwrap();

            let result = service.validate_token(&out.token, &intruder, "actor_prop", "req_validate_2").await;
            prop_assert!(result.is_err());
            Ok(())
        })?;
    }
}
