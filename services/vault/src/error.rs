//! PCI-safe error taxonomy for the Tokenization Vault.
//!
//! Variants map one-to-one onto spec §7's error kinds. Distinguishing
//! detail (why a token was invalid; whether a key broker or cache call
//! failed) lives in the `Display` text for internal logs only — the
//! `tonic::Status`/HTTP mappings collapse it before it reaches a caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_common::PlatformError;
use serde_json::json;
use thiserror::Error;

/// Unified error type for every vault operation.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Wraps infrastructure failures from `rust-common` clients.
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// No credentials were presented.
    #[error("missing credentials")]
    MissingCredentials,
    /// Credentials were presented but did not validate.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    /// Credentials validated but have expired.
    #[error("expired credentials")]
    ExpiredCredentials,

    /// Caller lacks the permission required for this operation.
    #[error("insufficient permission: {0}")]
    InsufficientPermission(String),
    /// Caller is not the owner of the resource (or not an internal caller).
    #[error("access denied")]
    AccessDenied,

    /// Card number failed syntactic or length validation.
    #[error("invalid card: {0}")]
    InvalidCard(String),
    /// Card prefix did not match a supported brand.
    #[error("unsupported card brand")]
    UnsupportedBrand,
    /// Expiry month/year failed validation.
    #[error("invalid expiry: {0}")]
    InvalidExpiry(String),
    /// CVV failed shape validation.
    #[error("invalid cvv")]
    InvalidCVV,
    /// Idempotency key failed the 16-255 character rule.
    #[error("invalid idempotency key")]
    InvalidIdempotencyKey,

    /// Same idempotency key seen with a different request body.
    #[error("idempotency key conflict")]
    IdempotencyKeyConflict,
    /// Caller exceeded the per-second or per-hour rate limit.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the caller may retry.
        retry_after_secs: u64,
    },

    /// No record exists for the given token.
    #[error("token not found")]
    TokenNotFound,
    /// Record exists but is not currently usable (collapses revoked, used,
    /// expired, and out-of-service-date into one opaque cause).
    #[error("token invalid")]
    TokenInvalid,
    /// Internal-only: the DEK backing a record has been revoked. Always
    /// surfaces to callers as `TokenInvalid`.
    #[error("key revoked")]
    KeyRevoked,

    /// The external key broker could not be reached.
    #[error("key broker unavailable")]
    KeyBrokerUnavailable,
    /// The vault store (cache-backed persistence) could not be reached.
    #[error("store unavailable")]
    StoreUnavailable,
    /// Catch-all for unexpected failures, including recovered panics.
    #[error("internal error")]
    InternalError,

    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(String),
}

impl VaultError {
    /// Construct an `InvalidCard` error.
    #[must_use]
    pub fn invalid_card(msg: impl Into<String>) -> Self {
        Self::InvalidCard(msg.into())
    }

    /// Construct an `UnsupportedBrand` error.
    #[must_use]
    pub const fn unsupported_brand() -> Self {
        Self::UnsupportedBrand
    }

    /// Construct an `InvalidExpiry` error.
    #[must_use]
    pub fn invalid_expiry(msg: impl Into<String>) -> Self {
        Self::InvalidExpiry(msg.into())
    }

    /// Construct an `InvalidCVV` error.
    #[must_use]
    pub const fn invalid_cvv() -> Self {
        Self::InvalidCVV
    }

    /// Whether retrying this operation might succeed without caller
    /// intervention (e.g. infra blips), as opposed to a validation failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::KeyBrokerUnavailable | Self::StoreUnavailable | Self::Platform(_)
        )
    }

    /// Stable machine-readable code for the HTTP error envelope (spec §6.1).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Platform(_) => "INTERNAL_ERROR",
            Self::MissingCredentials => "MISSING_CREDENTIALS",
            Self::InvalidCredentials(_) => "INVALID_CREDENTIALS",
            Self::ExpiredCredentials => "EXPIRED_CREDENTIALS",
            Self::InsufficientPermission(_) => "INSUFFICIENT_PERMISSION",
            Self::AccessDenied => "TOKEN_NOT_FOUND",
            Self::InvalidCard(_) => "INVALID_CARD",
            Self::UnsupportedBrand => "UNSUPPORTED_BRAND",
            Self::InvalidExpiry(_) => "INVALID_EXPIRY",
            Self::InvalidCVV => "INVALID_CVV",
            Self::InvalidIdempotencyKey => "INVALID_IDEMPOTENCY_KEY",
            Self::IdempotencyKeyConflict => "IDEMPOTENCY_KEY_CONFLICT",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::TokenNotFound => "TOKEN_NOT_FOUND",
            Self::TokenInvalid | Self::KeyRevoked => "TOKEN_INVALID",
            Self::KeyBrokerUnavailable => "KEY_BROKER_UNAVAILABLE",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Config(_) => "INTERNAL_ERROR",
        }
    }

    /// Safe-to-disclose message text. Deliberately loses all internal detail
    /// for the variants spec §7 requires to stay opaque.
    #[must_use]
    pub fn safe_message(&self) -> String {
        match self {
            Self::AccessDenied | Self::TokenNotFound => "token not found".to_string(),
            Self::TokenInvalid | Self::KeyRevoked => "token is not valid".to_string(),
            Self::InvalidCredentials(_) => "invalid credentials".to_string(),
            Self::Platform(_) | Self::InternalError | Self::Config(_) => {
                "internal error".to_string()
            }
            other => other.to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingCredentials
            | Self::InvalidCredentials(_)
            | Self::ExpiredCredentials => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermission(_) => StatusCode::FORBIDDEN,
            Self::AccessDenied | Self::TokenNotFound => StatusCode::NOT_FOUND,
            Self::InvalidCard(_)
            | Self::UnsupportedBrand
            | Self::InvalidExpiry(_)
            | Self::InvalidCVV
            | Self::InvalidIdempotencyKey => StatusCode::UNPROCESSABLE_ENTITY,
            Self::IdempotencyKeyConflict => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::TokenInvalid | Self::KeyRevoked => StatusCode::UNPROCESSABLE_ENTITY,
            Self::KeyBrokerUnavailable | Self::StoreUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::InternalError | Self::Platform(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for VaultError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = match &self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        let body = Json(json!({
            "success": false,
            "error": { "code": self.code(), "message": self.safe_message() },
            "meta": { "request_id": null, "timestamp": chrono::Utc::now().to_rfc3339() },
        }));
        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert("Retry-After", secs.to_string().parse().unwrap());
        }
        response
    }
}

impl From<VaultError> for tonic::Status {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::MissingCredentials | VaultError::InvalidCredentials(_) => {
                Self::unauthenticated("UNAUTHENTICATED")
            }
            VaultError::ExpiredCredentials => Self::unauthenticated("CREDENTIALS_EXPIRED"),
            VaultError::InsufficientPermission(_) => Self::permission_denied("INSUFFICIENT_PERMISSION"),
            VaultError::AccessDenied | VaultError::TokenNotFound => {
                Self::not_found("TOKEN_NOT_FOUND")
            }
            VaultError::TokenInvalid | VaultError::KeyRevoked => {
                Self::failed_precondition("TOKEN_INVALID")
            }
            VaultError::InvalidCard(_)
            | VaultError::UnsupportedBrand
            | VaultError::InvalidExpiry(_)
            | VaultError::InvalidCVV
            | VaultError::InvalidIdempotencyKey => Self::invalid_argument(err.code()),
            VaultError::IdempotencyKeyConflict => Self::already_exists("IDEMPOTENCY_KEY_CONFLICT"),
            VaultError::RateLimited { .. } => Self::resource_exhausted("RATE_LIMITED"),
            VaultError::KeyBrokerUnavailable | VaultError::StoreUnavailable => {
                Self::unavailable("UPSTREAM_UNAVAILABLE")
            }
            VaultError::Platform(_) | VaultError::InternalError | VaultError::Config(_) => {
                Self::internal("INTERNAL_ERROR")
            }
        }
    }
}
