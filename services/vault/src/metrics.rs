//! Prometheus metrics for the Tokenization Vault.
//!
//! Provides counters and histograms for the four card-lifecycle operations,
//! key broker calls, and cache operations.

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

/// Tokenize calls counter, labeled by outcome.
pub static TOKENIZE_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vault_tokenize_requests_total",
        "Total number of tokenize requests",
        &["status"]
    )
    .expect("Failed to register tokenize_requests metric")
});

/// Detokenize calls counter, labeled by outcome.
pub static DETOKENIZE_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vault_detokenize_requests_total",
        "Total number of detokenize requests",
        &["status"]
    )
    .expect("Failed to register detokenize_requests metric")
});

/// Token revocations counter.
pub static TOKENS_REVOKED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vault_tokens_revoked_total",
        "Total number of token revocations",
        &["status"]
    )
    .expect("Failed to register tokens_revoked metric")
});

/// Cross-tenant access attempts, always a security-relevant signal.
pub static ACCESS_DENIED_EVENTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vault_access_denied_total",
        "Total number of cross-merchant access attempts",
        &["operation"]
    )
    .expect("Failed to register access_denied metric")
});

/// Requests rejected by the rate limiter.
pub static RATE_LIMITED_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vault_rate_limited_requests_total",
        "Total number of requests rejected by the rate limiter",
        &["window"]
    )
    .expect("Failed to register rate_limited_requests metric")
});

/// Idempotency replay vs. fresh-execution counter.
pub static IDEMPOTENCY_OUTCOMES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vault_idempotency_outcomes_total",
        "Total number of idempotency check outcomes",
        &["outcome"]
    )
    .expect("Failed to register idempotency_outcomes metric")
});

/// Key broker operation counter.
pub static KEY_BROKER_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vault_key_broker_operations_total",
        "Total number of key broker operations",
        &["operation", "status"]
    )
    .expect("Failed to register key_broker_operations metric")
});

/// Request handler latency histogram.
pub static REQUEST_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "vault_request_latency_seconds",
        "Request handler latency in seconds",
        &["operation", "transport"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register request_latency metric")
});

/// Record a tokenize outcome.
pub fn record_tokenize(status: &str) {
    TOKENIZE_REQUESTS.with_label_values(&[status]).inc();
}

/// Record a detokenize outcome.
pub fn record_detokenize(status: &str) {
    DETOKENIZE_REQUESTS.with_label_values(&[status]).inc();
}

/// Record a revoke outcome.
pub fn record_revoke(status: &str) {
    TOKENS_REVOKED.with_label_values(&[status]).inc();
}

/// Record a cross-merchant access-denied event for `operation`.
pub fn record_access_denied(operation: &str) {
    ACCESS_DENIED_EVENTS.with_label_values(&[operation]).inc();
}

/// Record a rate-limit rejection in `window` (`"second"` or `"hour"`).
pub fn record_rate_limited(window: &str) {
    RATE_LIMITED_REQUESTS.with_label_values(&[window]).inc();
}

/// Record an idempotency outcome (`"proceed"`, `"replay"`, or `"conflict"`).
pub fn record_idempotency_outcome(outcome: &str) {
    IDEMPOTENCY_OUTCOMES.with_label_values(&[outcome]).inc();
}

/// Record a key broker operation.
pub fn record_key_broker_operation(operation: &str, status: &str) {
    KEY_BROKER_OPERATIONS.with_label_values(&[operation, status]).inc();
}

/// Record request handler latency.
pub fn record_request_latency(operation: &str, transport: &str, duration_secs: f64) {
    REQUEST_LATENCY.with_label_values(&[operation, transport]).observe(duration_secs);
}
