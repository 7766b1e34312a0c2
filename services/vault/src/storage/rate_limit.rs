//! Rate Limiter: per-second and per-hour TTL-backed request counters.
//!
//! Each merchant gets two independent windows. Both are fixed windows keyed
//! by the wall-clock bucket (`unix_secs` and `unix_secs / 3600`) rather than
//! a sliding window — the counter itself carries the TTL so there is no
//! background sweep anywhere in this process.

use rust_common::CacheClient;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Outcome of a rate-limit check, carrying the header values the transport
/// layer reports back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request is allowed to proceed.
    pub allowed: bool,
    /// The limit that was checked against (the tighter of the two windows).
    pub limit: u32,
    /// Remaining requests in the current window, after this one.
    pub remaining: u32,
    /// Seconds until the caller should retry, set only when denied.
    pub retry_after_secs: u64,
}

/// TTL-backed per-merchant rate limiter. Fails open: if the backing cache is
/// unreachable the request is allowed through rather than rejected, since an
/// infra outage should not itself become a denial-of-service on merchants.
pub struct RateLimiter {
    cache: Arc<CacheClient>,
    per_second: u32,
    per_hour: u32,
}

impl RateLimiter {
    /// Construct a limiter with the configured per-second and per-hour caps.
    #[must_use]
    pub fn new(cache: Arc<CacheClient>, per_second: u32, per_hour: u32) -> Self {
        Self { cache, per_second, per_hour }
    }

    /// Check and record one request for `merchant_id`. Increments both
    /// windows unconditionally so the counters stay accurate even when the
    /// request is ultimately denied by one window but not the other.
    pub async fn check(&self, merchant_id: &str) -> RateLimitDecision {
        let now = now_secs();
        let second_bucket = now;
        let hour_bucket = now / 3600;

        let second_count = self
            .increment(&format!("ratelimit:sec:{merchant_id}:{second_bucket}"), Duration::from_secs(2))
            .await;
        let hour_count = self
            .increment(&format!("ratelimit:hour:{merchant_id}:{hour_bucket}"), Duration::from_secs(3700))
            .await;

        let second_exceeded = second_count > self.per_second;
        let hour_exceeded = hour_count > self.per_hour;

        if hour_exceeded {
            let next_hour_start = (hour_bucket + 1) * 3600;
            RateLimitDecision {
                allowed: false,
                limit: self.per_hour,
                remaining: 0,
                retry_after_secs: next_hour_start.saturating_sub(now),
            }
        } else if second_exceeded {
            RateLimitDecision {
                allowed: false,
                limit: self.per_second,
                remaining: 0,
                retry_after_secs: 1,
            }
        } else {
            RateLimitDecision {
                allowed: true,
                limit: self.per_second,
                remaining: self.per_second.saturating_sub(second_count),
                retry_after_secs: 0,
            }
        }
    }

    /// Increment a counter, fetching-then-storing since `CacheClient` has no
    /// atomic increment primitive. Fails open (returns 0, i.e. "not yet
    /// seen") on any cache error, but logs it — a silent fail-open hides a
    /// cache outage from anyone watching rate-limit metrics.
    async fn increment(&self, key: &str, ttl: Duration) -> u32 {
        let current = match self.cache.get(key).await {
            Ok(Some(bytes)) => parse_count(&bytes),
            Ok(None) => 0,
            Err(e) => {
                warn!(error = %e, key, "rate limit cache read failed, failing open");
                return 0;
            }
        };
        let next = current + 1;
        let _ = self.cache.set(key, &next.to_le_bytes(), Some(ttl)).await;
        next
    }
}

fn parse_count(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    let len = bytes.len().min(4);
    buf[..len].copy_from_slice(&bytes[..len]);
    u32::from_le_bytes(buf)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_common::CacheClientConfig;

    async fn limiter(per_second: u32, per_hour: u32) -> RateLimiter {
        let cache = Arc::new(CacheClient::new(CacheClientConfig::default()).await.unwrap());
        RateLimiter::new(cache, per_second, per_hour)
    }

    #[tokio::test]
    async fn allows_requests_under_the_cap() {
        let limiter = limiter(50, 5000).await;
        for _ in 0..10 {
            let decision = limiter.check("merchant_a").await;
            assert!(decision.allowed);
        }
    }

    #[tokio::test]
    async fn denies_once_per_second_cap_exceeded() {
        let limiter = limiter(3, 5000).await;
        let mut last = None;
        for _ in 0..5 {
            last = Some(limiter.check("merchant_b").await);
        }
        let decision = last.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after_secs, 1);
    }

    #[tokio::test]
    async fn merchants_have_independent_counters() {
        let limiter = limiter(2, 5000).await;
        for _ in 0..2 {
            assert!(limiter.check("merchant_c").await.allowed);
        }
        assert!(!limiter.check("merchant_c").await.allowed);
        assert!(limiter.check("merchant_d").await.allowed);
    }

    #[tokio::test]
    async fn hour_cap_reports_longer_retry_after() {
        let limiter = limiter(1000, 2).await;
        limiter.check("merchant_e").await;
        let decision = limiter.check("merchant_e").await;
        assert!(!decision.allowed);
        assert!(decision.retry_after_secs > 1);
    }
}
