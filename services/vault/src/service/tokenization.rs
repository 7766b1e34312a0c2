//! Tokenization Service: orchestrates Tokenize, Detokenize, ValidateToken,
//! and RevokeToken over the Crypto Engine, Key Manager, and Vault Store.

use crate::config::TokenEnvironment;
use crate::crypto::CryptoEngine;
use crate::domain::card::{Brand, CardType, SanitizedCard};
use crate::domain::{bin_info, VaultRecord, VaultStatus};
use crate::error::VaultError;
use crate::keys::{KeyManager, KeyStatistics};
use crate::service::audit::{AuditAction, AuditEvent, AuditLogger};
use crate::storage::VaultStore;
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Fields required to tokenize a new card.
#[derive(Debug, Clone)]
pub struct TokenizeInput {
    /// Owning merchant.
    pub merchant_id: String,
    /// Raw card number, possibly containing whitespace/dashes.
    pub card_number: String,
    /// Cardholder name as submitted.
    pub cardholder_name: String,
    /// Expiry month, 1-12.
    pub exp_month: u32,
    /// Expiry year, four digits.
    pub exp_year: u32,
    /// 3-digit CVV, validated but never persisted.
    pub cvv: String,
    /// Whether the resulting token is consumed after one detokenize.
    pub is_single_use: bool,
    /// Optional absolute expiry, in seconds from now.
    pub expires_in_seconds: Option<u64>,
    /// Caller-correlated request id.
    pub request_id: String,
    /// Actor performing the request (user id, API key id).
    pub actor_id: String,
    /// Caller IP address.
    pub ip: String,
    /// Caller user agent.
    pub user_agent: String,
}

/// Result of a tokenize call.
#[derive(Debug, Clone)]
pub struct TokenizeOutput {
    /// The opaque token string.
    pub token: String,
    /// Detected brand.
    pub brand: Brand,
    /// Resolved card type.
    pub card_type: CardType,
    /// Last 4 digits.
    pub last4: String,
    /// Expiry month.
    pub exp_month: u32,
    /// Expiry year.
    pub exp_year: u32,
    /// Deterministic dedup fingerprint.
    pub fingerprint: String,
    /// Whether a new record was created, vs. a dedup hit.
    pub is_new_token: bool,
}

/// Caller-declared purpose of a detokenize call, for the usage-log trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageType {
    /// A payment capture/authorization.
    Payment,
    /// A zero-amount verification.
    Verification,
    /// A recurring/subscription charge.
    Recurring,
}

impl UsageType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Verification => "verification",
            Self::Recurring => "recurring",
        }
    }
}

/// Fields required to detokenize a card (internal callers only).
#[derive(Debug, Clone)]
pub struct DetokenizeInput {
    /// The token to reverse.
    pub token: String,
    /// Caller's merchant id; must match the record's owner.
    pub merchant_id: String,
    /// Optional correlated transaction id.
    pub transaction_id: Option<String>,
    /// Declared purpose of this detokenize.
    pub usage_type: UsageType,
    /// Transaction amount, minor units.
    pub amount: Option<i64>,
    /// Transaction currency, ISO 4217.
    pub currency: Option<String>,
    /// Caller IP address.
    pub ip: String,
    /// Caller user agent.
    pub user_agent: String,
    /// Caller-correlated request id.
    pub request_id: String,
    /// Actor performing the request (internal service name).
    pub actor_id: String,
}

/// Plaintext card data, returned only to authorized internal callers.
#[derive(Debug, Clone)]
pub struct DetokenizeOutput {
    /// Full PAN, digits only.
    pub card_number: String,
    /// Cardholder name, if one was stored.
    pub cardholder_name: Option<String>,
    /// Expiry month.
    pub exp_month: u32,
    /// Expiry year.
    pub exp_year: u32,
    /// Card brand.
    pub brand: Brand,
    /// Last 4 digits.
    pub last4: String,
}

/// Non-sensitive token metadata returned by `validate_token`.
#[derive(Debug, Clone)]
pub struct ValidateOutput {
    /// Whether the token is currently usable.
    pub valid: bool,
    /// Card brand.
    pub brand: Brand,
    /// Card type.
    pub card_type: CardType,
    /// Last 4 digits.
    pub last4: String,
    /// Expiry month.
    pub exp_month: u32,
    /// Expiry year.
    pub exp_year: u32,
    /// Current lifecycle status.
    pub status: VaultStatus,
    /// Number of successful detokenizes against this record.
    pub usage_count: u64,
    /// Whether this is a single-use token.
    pub is_single_use: bool,
}

/// Orchestrates the four card-lifecycle operations over the Crypto Engine,
/// Key Manager, and Vault Store.
pub struct TokenizationService {
    crypto: CryptoEngine,
    keys: Arc<KeyManager>,
    store: Arc<dyn VaultStore>,
    audit: Arc<AuditLogger>,
    token_environment: TokenEnvironment,
    skip_luhn_validation: bool,
}

impl TokenizationService {
    /// Construct a new service over its collaborators.
    #[must_use]
    pub fn new(
        keys: Arc<KeyManager>,
        store: Arc<dyn VaultStore>,
        audit: Arc<AuditLogger>,
        token_environment: TokenEnvironment,
        skip_luhn_validation: bool,
    ) -> Self {
        Self {
            crypto: CryptoEngine::new(),
            keys,
            store,
            audit,
            token_environment,
            skip_luhn_validation,
        }
    }

    /// Tokenize a new card, or return the existing active record for the
    /// same `(merchant_id, fingerprint)` without re-encrypting.
    ///
    /// # Errors
    /// Propagates card validation errors and infrastructure failures.
    #[instrument(skip(self, input), fields(merchant_id = %input.merchant_id))]
    pub async fn tokenize(&self, input: TokenizeInput) -> Result<TokenizeOutput, VaultError> {
        let card = SanitizedCard::parse(
            &input.card_number,
            &input.cardholder_name,
            input.exp_month,
            input.exp_year,
            &input.cvv,
            self.skip_luhn_validation,
        );
        let card = match card {
            Ok(card) => card,
            Err(err) => {
                self.audit_tokenize(&input, None, false).await;
                return Err(err);
            }
        };

        let fingerprint = CryptoEngine::fingerprint(&card.pan, card.exp_month, card.exp_year);

        if let Some(existing) = self.store.find_by_fingerprint(&input.merchant_id, &fingerprint).await? {
            if existing.is_currently_valid(Utc::now()) {
                self.audit_tokenize(&input, Some(&existing.id), true).await;
                return Ok(TokenizeOutput {
                    token: existing.token,
                    brand: existing.brand,
                    card_type: existing.card_type,
                    last4: existing.last4,
                    exp_month: existing.exp_month,
                    exp_year: existing.exp_year,
                    fingerprint: existing.fingerprint,
                    is_new_token: false,
                });
            }
        }

        let (dek, key_id) = self.keys.get_or_create_key(&input.merchant_id).await?;
        let encrypted = self.crypto.encrypt_card(&card, &dek)?;
        let card_type = bin_info(&card.bin());

        let now = Utc::now();
        let absolute_expires_at = input.expires_in_seconds.map(|secs| now + chrono::Duration::seconds(secs as i64));

        let record = VaultRecord {
            id: Uuid::new_v4().to_string(),
            token: generate_token(self.token_environment),
            merchant_id: input.merchant_id.clone(),
            pan_ciphertext: encrypted.pan,
            cardholder_name_ciphertext: encrypted.cardholder_name,
            exp_month_ciphertext: encrypted.exp_month,
            exp_year_ciphertext: encrypted.exp_year,
            key_id: key_id.clone(),
            key_version: key_version_of(&key_id),
            last4: card.last4(),
            first6: card.bin(),
            brand: card.brand,
            card_type,
            exp_month: card.exp_month,
            exp_year: card.exp_year,
            fingerprint: fingerprint.clone(),
            status: VaultStatus::Active,
            is_single_use: input.is_single_use,
            absolute_expires_at,
            usage_count: 0,
            first_used_at: None,
            last_used_at: None,
            created_by: input.actor_id.clone(),
            revoked_by: None,
            revoked_at: None,
            revocation_reason: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.store.create(record.clone()).await?;
        self.keys.record_encryption(&key_id).await;
        self.audit_tokenize(&input, Some(&record.id), true).await;

        Ok(TokenizeOutput {
            token: record.token,
            brand: record.brand,
            card_type: record.card_type,
            last4: record.last4,
            exp_month: record.exp_month,
            exp_year: record.exp_year,
            fingerprint: record.fingerprint,
            is_new_token: true,
        })
    }

    async fn audit_tokenize(&self, input: &TokenizeInput, record_id: Option<&str>, success: bool) {
        let mut event = AuditEvent::new(input.request_id.clone(), AuditAction::Tokenize, input.actor_id.clone(), input.merchant_id.clone())
            .with_network(input.ip.clone(), input.user_agent.clone());
        if let Some(id) = record_id {
            event = event.with_token_id(id);
        }
        if !success {
            event = event.failed();
        }
        self.audit.record(event).await;
    }

    /// Reverse a token to its plaintext card data. Internal callers only.
    ///
    /// # Errors
    /// Returns `TokenNotFound`, `AccessDenied`, or `TokenInvalid` per spec
    /// §4.4; never discloses which cause applied for the latter two.
    #[instrument(skip(self, input), fields(merchant_id = %input.merchant_id))]
    pub async fn detokenize(&self, input: DetokenizeInput) -> Result<DetokenizeOutput, VaultError> {
        let result = self.detokenize_inner(&input).await;
        self.audit_detokenize(&input, &result).await;
        result
    }

    async fn detokenize_inner(&self, input: &DetokenizeInput) -> Result<DetokenizeOutput, VaultError> {
        let record = self.store.find_by_token(&input.token).await?;

        if record.merchant_id != input.merchant_id {
            self.audit_access_denied(input, &record.id).await;
            return Err(VaultError::AccessDenied);
        }

        if !record.is_currently_valid(Utc::now()) {
            return Err(VaultError::TokenInvalid);
        }

        let dek = match self.keys.get_key_by_id(&record.key_id).await {
            Ok(dek) => dek,
            Err(VaultError::KeyRevoked) => return Err(VaultError::TokenInvalid),
            Err(err) => return Err(err),
        };

        let pan = self.crypto.decrypt(&record.pan_ciphertext, &dek)?;
        let cardholder_name = record
            .cardholder_name_ciphertext
            .as_ref()
            .map(|ct| self.crypto.decrypt(ct, &dek))
            .transpose()?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

        self.store.set_first_used(&input.token).await?;
        self.store.increment_usage(&input.token).await?;
        if record.is_single_use {
            self.store.update_status(&input.token, VaultStatus::Used).await?;
        }

        Ok(DetokenizeOutput {
            card_number: String::from_utf8_lossy(&pan).into_owned(),
            cardholder_name,
            exp_month: record.exp_month,
            exp_year: record.exp_year,
            brand: record.brand,
            last4: record.last4,
        })
    }

    async fn audit_access_denied(&self, input: &DetokenizeInput, token_id: &str) {
        let event = AuditEvent::new(input.request_id.clone(), AuditAction::AccessDenied, input.actor_id.clone(), input.merchant_id.clone())
            .with_network(input.ip.clone(), input.user_agent.clone())
            .with_token_id(token_id)
            .failed();
        self.audit.record(event).await;
    }

    async fn audit_detokenize(&self, input: &DetokenizeInput, result: &Result<DetokenizeOutput, VaultError>) {
        let mut event = AuditEvent::new(input.request_id.clone(), AuditAction::Detokenize, input.actor_id.clone(), input.merchant_id.clone())
            .with_network(input.ip.clone(), input.user_agent.clone())
            .with_extra("usage_type", input.usage_type.as_str());
        if let Some(transaction_id) = &input.transaction_id {
            event = event.with_extra("transaction_id", transaction_id.clone());
        }
        if let Some(amount) = input.amount {
            event = event.with_extra("amount", amount.to_string());
        }
        if let Some(currency) = &input.currency {
            event = event.with_extra("currency", currency.clone());
        }
        if result.is_err() {
            event = event.failed();
        }
        self.audit.record(event).await;
    }

    /// Return a token's non-sensitive metadata and current validity. Read
    /// the record from the vault and nothing else, but still audited per
    /// spec: a token read is itself a sensitive operation.
    ///
    /// # Errors
    /// Returns `TokenNotFound` or `AccessDenied`.
    pub async fn validate_token(
        &self,
        token: &str,
        merchant_id: &str,
        actor_id: &str,
        request_id: &str,
    ) -> Result<ValidateOutput, VaultError> {
        let record = self.store.find_by_token(token).await?;
        if record.merchant_id != merchant_id {
            return Err(VaultError::AccessDenied);
        }

        let event = AuditEvent::new(request_id.to_string(), AuditAction::ValidateToken, actor_id.to_string(), merchant_id.to_string())
            .with_token_id(record.id.clone());
        self.audit.record(event).await;

        Ok(ValidateOutput {
            valid: record.is_currently_valid(Utc::now()),
            brand: record.brand,
            card_type: record.card_type,
            last4: record.last4,
            exp_month: record.exp_month,
            exp_year: record.exp_year,
            status: record.status,
            usage_count: record.usage_count,
            is_single_use: record.is_single_use,
        })
    }

    /// Revoke a token. Idempotent: revoking an already-revoked token
    /// succeeds without changing its terminal state.
    ///
    /// # Errors
    /// Returns `TokenNotFound` or `AccessDenied`.
    pub async fn revoke_token(
        &self,
        token: &str,
        merchant_id: &str,
        revoked_by: &str,
        reason: &str,
        request_id: &str,
    ) -> Result<(), VaultError> {
        let record = self.store.find_by_token(token).await?;
        if record.merchant_id != merchant_id {
            return Err(VaultError::AccessDenied);
        }

        if record.status != VaultStatus::Revoked {
            self.store.revoke(token, revoked_by, reason).await?;
        }

        let event = AuditEvent::new(request_id.to_string(), AuditAction::RevokeToken, revoked_by.to_string(), merchant_id.to_string())
            .with_token_id(record.id);
        self.audit.record(event).await;
        Ok(())
    }

    /// Delegate key rotation to the Key Manager.
    ///
    /// # Errors
    /// Propagates `KeyBrokerUnavailable`.
    pub async fn rotate_key(&self, merchant_id: &str, rotated_by: &str, request_id: &str) -> Result<String, VaultError> {
        let new_key_id = self.keys.rotate(merchant_id, rotated_by).await?;
        let event = AuditEvent::new(request_id.to_string(), AuditAction::KeyRotate, rotated_by.to_string(), merchant_id.to_string());
        self.audit.record(event).await;
        Ok(new_key_id)
    }

    /// Delegate key statistics to the Key Manager.
    pub async fn key_statistics(&self, merchant_id: &str) -> KeyStatistics {
        self.keys.statistics(merchant_id).await
    }
}

/// Mint a fresh opaque token, `tok_<env>_<64 hex>`.
fn generate_token(env: TokenEnvironment) -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("tok_{}_{}", env.as_str(), hex::encode(bytes))
}

/// Extract the trailing `_v<N>` version suffix from a derived key id.
fn key_version_of(key_id: &str) -> u32 {
    key_id.rsplit('v').next().and_then(|s| s.parse().ok()).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CachedVaultStore;
    use async_trait::async_trait;
    use key_broker::{KeyBroker, KeyBrokerError};
    use rust_common::{CacheClient, CacheClientConfig, CircuitBreaker, CircuitBreakerConfig, LoggingClient, LoggingClientConfig};
    use std::collections::HashMap;
    use tokio::sync::RwLock as TokioRwLock;
    use zeroize::Zeroizing;

    struct FakeBroker {
        material: TokioRwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
    }

    impl FakeBroker {
        fn new() -> Self {
            Self { material: TokioRwLock::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl KeyBroker for FakeBroker {
        async fn create(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>, KeyBrokerError> {
            let material = CryptoEngine::generate_dek();
            self.material.write().await.insert(key_id.to_string(), material.clone());
            Ok(material)
        }

        async fn fetch(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>, KeyBrokerError> {
            self.material.read().await.get(key_id).cloned().ok_or_else(|| KeyBrokerError::KeyNotFound(key_id.to_string()))
        }

        async fn destroy(&self, key_id: &str) -> Result<(), KeyBrokerError> {
            self.material.write().await.remove(key_id);
            Ok(())
        }
    }

    async fn service() -> TokenizationService {
        let cache = Arc::new(CacheClient::new(CacheClientConfig::default()).await.unwrap());
        let store: Arc<dyn VaultStore> = Arc::new(CachedVaultStore::new(cache));
        let keys = Arc::new(KeyManager::new(
            Arc::new(FakeBroker::new()),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            true,
            90,
            1_000_000,
        ));
        let logging = Arc::new(LoggingClient::new(LoggingClientConfig::default()).await.unwrap());
        let audit = Arc::new(AuditLogger::new(logging));
        TokenizationService::new(keys, store, audit, TokenEnvironment::Test, false)
    }

    fn tokenize_input(merchant_id: &str) -> TokenizeInput {
        TokenizeInput {
            merchant_id: merchant_id.to_string(),
            card_number: "4242424242424242".to_string(),
            cardholder_name: "JOHN DOE".to_string(),
            exp_month: 12,
            exp_year: 2030,
            cvv: "123".to_string(),
            is_single_use: false,
            expires_in_seconds: None,
            request_id: "req-1".to_string(),
            actor_id: "actor-1".to_string(),
            ip: "127.0.0.1".to_string(),
            user_agent: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn new_card_tokenize_succeeds() {
        let svc = service().await;
        let out = svc.tokenize(tokenize_input("merchant_m1")).await.unwrap();
        assert!(out.is_new_token);
        assert_eq!(out.brand, Brand::Visa);
        assert_eq!(out.last4, "4242");
        assert!(out.token.starts_with("tok_test_"));
    }

    #[tokio::test]
    async fn repeat_tokenize_dedups_to_same_token() {
        let svc = service().await;
        let first = svc.tokenize(tokenize_input("merchant_m1")).await.unwrap();
        let second = svc.tokenize(tokenize_input("merchant_m1")).await.unwrap();
        assert_eq!(first.token, second.token);
        assert!(!second.is_new_token);
    }

    #[tokio::test]
    async fn cross_merchant_tokens_differ() {
        let svc = service().await;
        let m1 = svc.tokenize(tokenize_input("merchant_m1")).await.unwrap();
        let m2 = svc.tokenize(tokenize_input("merchant_m2")).await.unwrap();
        assert_ne!(m1.token, m2.token);
    }

    #[tokio::test]
    async fn detokenize_round_trips_card_data() {
        let svc = service().await;
        let tokenized = svc.tokenize(tokenize_input("merchant_m1")).await.unwrap();

        let out = svc
            .detokenize(DetokenizeInput {
                token: tokenized.token,
                merchant_id: "merchant_m1".to_string(),
                transaction_id: Some("txn-1".to_string()),
                usage_type: UsageType::Payment,
                amount: Some(1000),
                currency: Some("USD".to_string()),
                ip: "127.0.0.1".to_string(),
                user_agent: "test".to_string(),
                request_id: "req-2".to_string(),
                actor_id: "settlement-engine".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(out.card_number, "4242424242424242");
        assert_eq!(out.cardholder_name, Some("JOHN DOE".to_string()));
        assert_eq!(out.exp_month, 12);
        assert_eq!(out.exp_year, 2030);
    }

    #[tokio::test]
    async fn cross_merchant_detokenize_is_access_denied() {
        let svc = service().await;
        let tokenized = svc.tokenize(tokenize_input("merchant_m1")).await.unwrap();

        let err = svc
            .detokenize(DetokenizeInput {
                token: tokenized.token,
                merchant_id: "merchant_m2".to_string(),
                transaction_id: None,
                usage_type: UsageType::Payment,
                amount: None,
                currency: None,
                ip: "127.0.0.1".to_string(),
                user_agent: "test".to_string(),
                request_id: "req-3".to_string(),
                actor_id: "settlement-engine".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, VaultError::AccessDenied));
    }

    #[tokio::test]
    async fn single_use_token_is_invalid_after_one_detokenize() {
        let svc = service().await;
        let mut input = tokenize_input("merchant_m1");
        input.is_single_use = true;
        let tokenized = svc.tokenize(input).await.unwrap();

        let detok_input = || DetokenizeInput {
            token: tokenized.token.clone(),
            merchant_id: "merchant_m1".to_string(),
            transaction_id: None,
            usage_type: UsageType::Payment,
            amount: None,
            currency: None,
            ip: "127.0.0.1".to_string(),
            user_agent: "test".to_string(),
            request_id: "req-4".to_string(),
            actor_id: "settlement-engine".to_string(),
        };

        svc.detokenize(detok_input()).await.unwrap();
        let err = svc.detokenize(detok_input()).await.unwrap_err();
        assert!(matches!(err, VaultError::TokenInvalid));

        let validated = svc.validate_token(&tokenized.token, "merchant_m1", "test-actor", "req-validate-1").await.unwrap();
        assert_eq!(validated.status, VaultStatus::Used);
        assert_eq!(validated.usage_count, 1);
    }

    #[tokio::test]
    async fn revoke_then_retokenize_issues_a_new_token() {
        let svc = service().await;
        let first = svc.tokenize(tokenize_input("merchant_m1")).await.unwrap();
        svc.revoke_token(&first.token, "merchant_m1", "admin", "lost card", "req-5").await.unwrap();

        let err = svc
            .detokenize(DetokenizeInput {
                token: first.token.clone(),
                merchant_id: "merchant_m1".to_string(),
                transaction_id: None,
                usage_type: UsageType::Payment,
                amount: None,
                currency: None,
                ip: "127.0.0.1".to_string(),
                user_agent: "test".to_string(),
                request_id: "req-6".to_string(),
                actor_id: "settlement-engine".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::TokenInvalid));

        let second = svc.tokenize(tokenize_input("merchant_m1")).await.unwrap();
        assert!(second.is_new_token);
        assert_ne!(second.token, first.token);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let svc = service().await;
        let tokenized = svc.tokenize(tokenize_input("merchant_m1")).await.unwrap();
        svc.revoke_token(&tokenized.token, "merchant_m1", "admin", "lost card", "req-7").await.unwrap();
        svc.revoke_token(&tokenized.token, "merchant_m1", "admin", "lost card again", "req-8").await.unwrap();

        let validated = svc.validate_token(&tokenized.token, "merchant_m1", "test-actor", "req-validate-2").await.unwrap();
        assert_eq!(validated.status, VaultStatus::Revoked);
    }

    #[tokio::test]
    async fn validate_token_has_no_side_effects() {
        let svc = service().await;
        let tokenized = svc.tokenize(tokenize_input("merchant_m1")).await.unwrap();

        svc.validate_token(&tokenized.token, "merchant_m1", "test-actor", "req-validate-3").await.unwrap();
        svc.validate_token(&tokenized.token, "merchant_m1", "test-actor", "req-validate-4").await.unwrap();
        let validated = svc.validate_token(&tokenized.token, "merchant_m1", "test-actor", "req-validate-5").await.unwrap();

        assert_eq!(validated.usage_count, 0);
    }
}
