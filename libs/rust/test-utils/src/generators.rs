//! Shared proptest generators for the Tokenization Vault's Rust libraries.

use proptest::prelude::*;
use std::time::Duration;

/// Generate syntactically valid (Luhn-passing) PANs of realistic lengths.
pub fn pan_strategy() -> impl Strategy<Value = String> {
    (13u8..=19).prop_flat_map(|len| {
        proptest::collection::vec(0u8..10, (len - 1) as usize).prop_map(move |mut digits| {
            let sum: u32 = digits
                .iter()
                .rev()
                .enumerate()
                .map(|(i, &d)| {
                    let mut d = u32::from(d);
                    if i % 2 == 0 {
                        d *= 2;
                        if d > 9 {
                            d -= 9;
                        }
                    }
                    d
                })
                .sum();
            let check = (10 - (sum % 10)) % 10;
            digits.push(check as u8);
            digits.iter().map(|d| char::from(b'0' + d)).collect()
        })
    })
}

/// Generate PANs that deliberately fail the Luhn check, for negative tests.
pub fn invalid_luhn_pan_strategy() -> impl Strategy<Value = String> {
    "[1-9][0-9]{12,18}".prop_filter("must fail luhn", |s| !luhn_ok(s))
}

fn luhn_ok(pan: &str) -> bool {
    let digits: Vec<u32> = pan.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != pan.len() {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            let mut d = d;
            if i % 2 == 1 {
                d *= 2;
                if d > 9 {
                    d -= 9;
                }
            }
            d
        })
        .sum();
    sum % 10 == 0
}

/// Generate merchant ids (`merchant_<alnum>`).
pub fn merchant_id_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{6,16}".prop_map(|s| format!("merchant_{s}"))
}

/// Generate key ids matching the broker's expected shape.
pub fn key_id_strategy() -> impl Strategy<Value = String> {
    (merchant_id_strategy(), 1u32..20).prop_map(|(merchant, v)| format!("key_{merchant}_v{v}"))
}

/// Generate opaque token strings (`tok_<random>`).
pub fn token_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9]{24,32}".prop_map(|s| format!("tok_{s}"))
}

/// Generate idempotency keys.
pub fn idempotency_key_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9-]{16,64}"
}

/// Generate plausible card expiry (`MM/YY`) values.
pub fn expiry_strategy() -> impl Strategy<Value = String> {
    (1u8..=12, 24u8..=35).prop_map(|(mm, yy)| format!("{mm:02}/{yy:02}"))
}

/// Generate TTL values (1 minute to 24 hours).
pub fn ttl_strategy() -> impl Strategy<Value = Duration> {
    (60u64..86400).prop_map(Duration::from_secs)
}

/// Generate short TTL values for testing (1ms to 100ms).
pub fn short_ttl_strategy() -> impl Strategy<Value = Duration> {
    (1u64..100).prop_map(Duration::from_millis)
}

/// Generate valid correlation/request IDs.
pub fn correlation_id_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9-]{8,36}"
}

/// Generate valid cache keys.
pub fn cache_key_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9:_-]{5,50}"
}

/// Generate valid HTTP status codes used across the vault's API surface.
pub fn http_status_code_strategy() -> impl Strategy<Value = u16> {
    prop_oneof![
        Just(200u16),
        Just(201u16),
        Just(204u16),
        Just(400u16),
        Just(401u16),
        Just(403u16),
        Just(404u16),
        Just(409u16),
        Just(422u16),
        Just(429u16),
        Just(500u16),
        Just(503u16),
    ]
}

/// Generate valid log levels.
pub fn log_level_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("DEBUG".to_string()),
        Just("INFO".to_string()),
        Just("WARN".to_string()),
        Just("ERROR".to_string()),
    ]
}
