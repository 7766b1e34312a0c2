//! Transport-facing wrapper around [`crate::storage::IdempotencyStore`]:
//! carries the body hash across the check/execute/store sequence so
//! handlers don't re-derive it.

use crate::error::VaultError;
use crate::storage::{IdempotencyOutcome, IdempotencyStore};

/// Per-request idempotency guard. Construct with [`IdempotencyGuard::check`]
/// before running a handler; call [`IdempotencyGuard::store`] after, only
/// when the handler produced a 2xx response.
pub struct IdempotencyGuard {
    merchant_id: String,
    key: String,
    body_hash: String,
}

/// What the caller should do after checking the guard.
pub enum GuardDecision {
    /// No prior record. Run the handler, then call `store` on 2xx.
    Run(IdempotencyGuard),
    /// A prior record with a matching body matched; replay its response
    /// verbatim without running the handler.
    Replay {
        /// Cached response status.
        status: u16,
        /// Cached response bytes.
        bytes: Vec<u8>,
    },
}

impl IdempotencyGuard {
    /// Validate the key, hash the body, and check for a prior record.
    ///
    /// # Errors
    /// Returns `InvalidIdempotencyKey` on malformed keys, or
    /// `IdempotencyKeyConflict` if the key was seen before with a different
    /// body.
    pub async fn check(
        store: &IdempotencyStore,
        merchant_id: &str,
        key: &str,
        body: &[u8],
    ) -> Result<GuardDecision, VaultError> {
        IdempotencyStore::validate_key(key)?;
        let body_hash = IdempotencyStore::canonical_hash(body);

        match store.check(merchant_id, key, &body_hash).await? {
            IdempotencyOutcome::Proceed => Ok(GuardDecision::Run(Self {
                merchant_id: merchant_id.to_string(),
                key: key.to_string(),
                body_hash,
            })),
            IdempotencyOutcome::Replay { status, bytes } => Ok(GuardDecision::Replay { status, bytes }),
            IdempotencyOutcome::Conflict => Err(VaultError::IdempotencyKeyConflict),
        }
    }

    /// Persist the handler's response. Callers MUST only call this for 2xx
    /// responses — non-2xx outcomes are never cached per spec §4.5.
    pub async fn store(
        self,
        store: &IdempotencyStore,
        response_bytes: Vec<u8>,
        response_status: u16,
        endpoint: &str,
        method: &str,
        ip: &str,
        user_agent: &str,
    ) -> Result<(), VaultError> {
        store
            .store(
                &self.merchant_id,
                &self.key,
                &self.body_hash,
                response_bytes,
                response_status,
                endpoint,
                method,
                ip,
                user_agent,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_common::CacheClientConfig;
    use std::sync::Arc;
    use std::time::Duration;

    async fn store() -> IdempotencyStore {
        let cache = Arc::new(rust_common::CacheClient::new(CacheClientConfig::default()).await.unwrap());
        IdempotencyStore::new(cache, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn first_request_runs_then_second_replays() {
        let store = store().await;
        let key = "k-0000000000000001";
        let body = br#"{"amount":100}"#;

        let decision = IdempotencyGuard::check(&store, "merchant_m1", key, body).await.unwrap();
        let guard = match decision {
            GuardDecision::Run(g) => g,
            GuardDecision::Replay { .. } => panic!("expected Run"),
        };
        guard
            .store(&store, b"ok".to_vec(), 200, "/v1/tokenize", "POST", "127.0.0.1", "test")
            .await
            .unwrap();

        let decision = IdempotencyGuard::check(&store, "merchant_m1", key, body).await.unwrap();
        match decision {
            GuardDecision::Replay { status, bytes } => {
                assert_eq!(status, 200);
                assert_eq!(bytes, b"ok");
            }
            GuardDecision::Run(_) => panic!("expected Replay"),
        }
    }

    #[tokio::test]
    async fn short_key_is_rejected_before_hashing() {
        let store = store().await;
        let err = IdempotencyGuard::check(&store, "merchant_m1", "short", b"{}").await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidIdempotencyKey));
    }
}
