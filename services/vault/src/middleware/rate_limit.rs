//! Transport-facing wrapper around [`crate::storage::RateLimiter`]: turns a
//! decision into the header set HTTP/gRPC responses attach, and the error
//! a denied request returns.

use crate::error::VaultError;
use crate::storage::RateLimiter;

/// `X-RateLimit-*` header values for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// The limit applied to this window.
    pub limit: u32,
    /// Remaining requests in the window.
    pub remaining: u32,
}

/// Check the limiter for `merchant_id`. On success, returns the header
/// values to attach to the eventual response.
///
/// # Errors
/// Returns `RateLimited { retry_after_secs }` once either window is
/// exceeded.
pub async fn enforce(limiter: &RateLimiter, merchant_id: &str) -> Result<RateLimitHeaders, VaultError> {
    let decision = limiter.check(merchant_id).await;
    if decision.allowed {
        Ok(RateLimitHeaders { limit: decision.limit, remaining: decision.remaining })
    } else {
        Err(VaultError::RateLimited { retry_after_secs: decision.retry_after_secs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_common::CacheClientConfig;
    use std::sync::Arc;

    #[tokio::test]
    async fn under_cap_returns_headers() {
        let cache = Arc::new(rust_common::CacheClient::new(CacheClientConfig::default()).await.unwrap());
        let limiter = RateLimiter::new(cache, 50, 5000);
        let headers = enforce(&limiter, "merchant_m1").await.unwrap();
        assert_eq!(headers.limit, 50);
    }

    #[tokio::test]
    async fn over_cap_returns_rate_limited() {
        let cache = Arc::new(rust_common::CacheClient::new(CacheClientConfig::default()).await.unwrap());
        let limiter = RateLimiter::new(cache, 1, 5000);
        enforce(&limiter, "merchant_m2").await.unwrap();
        let err = enforce(&limiter, "merchant_m2").await.unwrap_err();
        assert!(matches!(err, VaultError::RateLimited { .. }));
    }
}
