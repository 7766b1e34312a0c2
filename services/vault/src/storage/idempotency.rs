//! Idempotency Layer: key+body-hash binding with cached response replay.

use crate::error::VaultError;
use rust_common::CacheClient;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// A persisted idempotency record (24h TTL by default).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    request_hash: String,
    response_bytes: Vec<u8>,
    response_status: u16,
    endpoint: String,
    method: String,
    ip: String,
    user_agent: String,
}

/// Result of checking an idempotency key against a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyOutcome {
    /// No prior record; caller should execute the handler.
    Proceed,
    /// Prior record with a matching body hash; replay verbatim.
    Replay {
        /// Cached response status.
        status: u16,
        /// Cached response bytes.
        bytes: Vec<u8>,
    },
    /// Prior record with a mismatching body hash.
    Conflict,
}

/// TTL-backed idempotency store over `CacheClient`.
pub struct IdempotencyStore {
    cache: Arc<CacheClient>,
    ttl: Duration,
}

impl IdempotencyStore {
    /// Construct a new store with the configured TTL (spec default 24h).
    #[must_use]
    pub fn new(cache: Arc<CacheClient>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Validate key shape: non-empty, 16-255 characters.
    ///
    /// # Errors
    /// Returns `InvalidIdempotencyKey` outside that range.
    pub fn validate_key(key: &str) -> Result<(), VaultError> {
        if key.len() < 16 || key.len() > 255 {
            return Err(VaultError::InvalidIdempotencyKey);
        }
        Ok(())
    }

    /// Canonicalize and hash a JSON request body: parse, re-serialize with
    /// sorted structure, then SHA-256 the result.
    #[must_use]
    pub fn canonical_hash(body: &[u8]) -> String {
        let canonical = serde_json::from_slice::<serde_json::Value>(body)
            .map(|v| serde_json::to_vec(&sort_value(v)).unwrap_or_default())
            .unwrap_or_else(|_| body.to_vec());
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }

    fn cache_key(merchant_id: &str, key: &str) -> String {
        format!("idempotency:{merchant_id}:{key}")
    }

    /// Check whether `(merchant_id, key)` has a prior record and whether it
    /// matches `body_hash`.
    pub async fn check(
        &self,
        merchant_id: &str,
        key: &str,
        body_hash: &str,
    ) -> Result<IdempotencyOutcome, VaultError> {
        let bytes = self
            .cache
            .get(&Self::cache_key(merchant_id, key))
            .await
            .map_err(VaultError::Platform)?;

        let Some(bytes) = bytes else {
            return Ok(IdempotencyOutcome::Proceed);
        };

        let stored: StoredRecord = match serde_json::from_slice(&bytes) {
            Ok(r) => r,
            Err(_) => return Ok(IdempotencyOutcome::Proceed),
        };

        if stored.request_hash == body_hash {
            Ok(IdempotencyOutcome::Replay {
                status: stored.response_status,
                bytes: stored.response_bytes,
            })
        } else {
            Ok(IdempotencyOutcome::Conflict)
        }
    }

    /// Persist a response after a successful (2xx) handler completion.
    /// Non-2xx responses MUST NOT be cached — callers check that before
    /// calling this.
    #[allow(clippy::too_many_arguments)]
    pub async fn store(
        &self,
        merchant_id: &str,
        key: &str,
        body_hash: &str,
        response_bytes: Vec<u8>,
        response_status: u16,
        endpoint: &str,
        method: &str,
        ip: &str,
        user_agent: &str,
    ) -> Result<(), VaultError> {
        let record = StoredRecord {
            request_hash: body_hash.to_string(),
            response_bytes,
            response_status,
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
        };
        let bytes = serde_json::to_vec(&record).map_err(|e| VaultError::Platform(e.into()))?;
        self.cache
            .set(&Self::cache_key(merchant_id, key), &bytes, Some(self.ttl))
            .await
            .map_err(VaultError::Platform)
    }
}

fn sort_value(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted: Vec<(String, serde_json::Value)> =
                map.into_iter().map(|(k, v)| (k, sort_value(v))).collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(sort_value).collect())
        }
        other => other,
    }
}
