//! Centralized configuration for the Tokenization Vault.
//!
//! All configuration is loaded from environment variables and validated at
//! startup; every field named in the external interface's configuration
//! section has a typed default here.

use crate::error::VaultError;
use rust_common::{CacheClientConfig, CircuitBreakerConfig, LoggingClientConfig};
use std::env;
use std::time::Duration;

/// Token prefix environment; selects `tok_live_` vs `tok_test_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEnvironment {
    /// Production tokens.
    Live,
    /// Test/sandbox tokens.
    Test,
}

impl TokenEnvironment {
    fn from_str(s: &str) -> Result<Self, VaultError> {
        match s.to_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "test" => Ok(Self::Test),
            other => Err(VaultError::Config(format!("invalid TOKEN_ENVIRONMENT: {other}"))),
        }
    }

    /// The literal prefix segment used in minted token strings.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Test => "test",
        }
    }
}

/// Vault service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to.
    pub host: String,
    /// Public HTTP port.
    pub http_port: u16,
    /// Internal gRPC port.
    pub grpc_port: u16,

    /// `tok_live_` vs `tok_test_`.
    pub token_environment: TokenEnvironment,

    /// DEK rotation advice threshold, in days.
    pub dek_rotation_max_age_days: i64,
    /// DEK rotation advice threshold, by encrypted-record count.
    pub dek_rotation_max_records: u64,

    /// Vault-record read-through cache TTL.
    pub token_cache_ttl: Duration,
    /// Idempotency record TTL.
    pub idempotency_ttl: Duration,

    /// Per-second rate limit per caller.
    pub rate_limit_per_second: u32,
    /// Per-hour rate limit per caller.
    pub rate_limit_per_hour: u32,

    /// Test-only: bypass the Luhn checksum.
    pub skip_luhn_validation: bool,
    /// Disables local DEK generation when true.
    pub production_mode: bool,

    /// Address of the external KEK/DEK broker.
    pub key_broker_endpoint: String,

    /// Shared secret allowlist for the internal-service auth credential form.
    pub internal_service_secret: String,
    /// Names permitted to authenticate as an internal service.
    pub internal_service_allowlist: Vec<String>,

    /// Cache client configuration (vault-record and DEK caches).
    pub cache: CacheClientConfig,
    /// Logging client configuration (audit trail).
    pub logging: LoggingClientConfig,
    /// Circuit breaker configuration for the key broker and cache.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Encryption key for cached data (32 bytes for AES-256), not the card DEKs.
    pub cache_encryption_key: [u8; 32],
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns `VaultError::Config` if any variable is present but malformed.
    pub fn from_env() -> Result<Self, VaultError> {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let http_port = parse_env("HTTP_PORT", 8443)?;
        let grpc_port = parse_env("GRPC_PORT", 50061)?;

        let token_environment = TokenEnvironment::from_str(
            &env::var("TOKEN_ENVIRONMENT").unwrap_or_else(|_| "test".to_string()),
        )?;

        let dek_rotation_max_age_days = parse_env("DEK_ROTATION_MAX_AGE_DAYS", 90)?;
        let dek_rotation_max_records = parse_env("DEK_ROTATION_MAX_RECORDS", 1_000_000)?;

        let token_cache_ttl = Duration::from_secs(parse_env("TOKEN_CACHE_TTL_SECONDS", 900)?);
        let idempotency_ttl = Duration::from_secs(parse_env("IDEMPOTENCY_TTL_HOURS", 24)? * 3600);

        let rate_limit_per_second = parse_env("RATE_LIMIT_PER_SECOND", 50)?;
        let rate_limit_per_hour = parse_env("RATE_LIMIT_PER_HOUR", 5_000)?;

        let skip_luhn_validation = parse_env("SKIP_LUHN_VALIDATION", false)?;
        let production_mode = parse_env("PRODUCTION_MODE", true)?;

        let key_broker_endpoint = env::var("KEY_BROKER_ENDPOINT")
            .unwrap_or_else(|_| "https://key-broker.vault.svc:8200".to_string());

        let internal_service_secret =
            env::var("INTERNAL_SERVICE_SECRET").unwrap_or_else(|_| "dev-only-internal-secret".to_string());
        let internal_service_allowlist = env::var("INTERNAL_SERVICE_ALLOWLIST")
            .unwrap_or_else(|_| "settlement-engine,api-gateway".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if production_mode
            && env::var("INTERNAL_SERVICE_SECRET").is_err()
        {
            tracing::warn!("INTERNAL_SERVICE_SECRET not set in production_mode; using an insecure default");
        }

        let cache_address =
            env::var("CACHE_SERVICE_ADDRESS").unwrap_or_else(|_| "http://localhost:50051".to_string());
        let logging_address =
            env::var("LOGGING_SERVICE_ADDRESS").unwrap_or_else(|_| "http://localhost:5001".to_string());

        let cache_encryption_key = parse_encryption_key()?;

        let cache = CacheClientConfig::default()
            .with_address(cache_address)
            .with_namespace("vault")
            .with_default_ttl(token_cache_ttl)
            .with_encryption_key(cache_encryption_key);

        let logging = LoggingClientConfig::default()
            .with_address(logging_address)
            .with_service_id("vault-service");

        let circuit_breaker = CircuitBreakerConfig::default()
            .with_failure_threshold(parse_env("CB_FAILURE_THRESHOLD", 5)?)
            .with_success_threshold(parse_env("CB_SUCCESS_THRESHOLD", 2)?)
            .with_timeout(Duration::from_secs(parse_env("CB_TIMEOUT", 30)?));

        if !production_mode {
            tracing::warn!("production_mode=false: Key Manager will generate DEKs locally instead of using the key broker");
        }

        Ok(Self {
            host,
            http_port,
            grpc_port,
            token_environment,
            dek_rotation_max_age_days,
            dek_rotation_max_records,
            token_cache_ttl,
            idempotency_ttl,
            rate_limit_per_second,
            rate_limit_per_hour,
            skip_luhn_validation,
            production_mode,
            key_broker_endpoint,
            internal_service_secret,
            internal_service_allowlist,
            cache,
            logging,
            circuit_breaker,
            cache_encryption_key,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, VaultError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| VaultError::Config(format!("invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn parse_encryption_key() -> Result<[u8; 32], VaultError> {
    match env::var("CACHE_ENCRYPTION_KEY") {
        Ok(key) => {
            let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &key)
                .map_err(|e| VaultError::Config(format!("invalid CACHE_ENCRYPTION_KEY: {e}")))?;
            if bytes.len() != 32 {
                return Err(VaultError::Config(format!(
                    "CACHE_ENCRYPTION_KEY must be 32 bytes, got {}",
                    bytes.len()
                )));
            }
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&bytes);
            Ok(arr)
        }
        Err(_) => {
            use rand::RngCore;
            let mut key = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut key);
            Ok(key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_environment_parsing() {
        assert_eq!(TokenEnvironment::from_str("live").unwrap().as_str(), "live");
        assert_eq!(TokenEnvironment::from_str("TEST").unwrap().as_str(), "test");
        assert!(TokenEnvironment::from_str("staging").is_err());
    }

    #[test]
    fn config_from_env_defaults() {
        for var in [
            "HOST",
            "HTTP_PORT",
            "TOKEN_ENVIRONMENT",
            "RATE_LIMIT_PER_SECOND",
            "PRODUCTION_MODE",
        ] {
            env::remove_var(var);
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.http_port, 8443);
        assert_eq!(config.rate_limit_per_second, 50);
        assert_eq!(config.rate_limit_per_hour, 5_000);
        assert!(config.production_mode);
        assert_eq!(config.idempotency_ttl, Duration::from_secs(24 * 3600));
    }
}
