//! Cross-cutting request concerns: authentication, rate limiting, and
//! idempotency, each wired in front of the Tokenization Service.

pub mod auth;
pub mod idempotency;
pub mod rate_limit;

pub use auth::{ApiKeyIdentity, AuthBackend, AuthContext, JwtIdentity, LocalAuthBackend};
pub use idempotency::IdempotencyGuard;
pub use rate_limit::RateLimitHeaders;

use crate::error::VaultError;
use axum::http::HeaderMap;
use std::sync::Arc;

/// Resolve one of the three credential forms from request headers.
///
/// Precedence: internal-service headers, then `Authorization: Bearer`, then
/// `X-API-Key`. At most one form should be present on a well-formed request;
/// if more than one is, the first in this order wins.
///
/// # Errors
/// Returns `MissingCredentials` if no recognized header is present, or
/// whatever the matched backend call returns.
pub async fn extract_auth_context(
    headers: &HeaderMap,
    backend: &Arc<dyn AuthBackend>,
    internal_secret: &str,
    internal_allowlist: &[String],
) -> Result<AuthContext, VaultError> {
    let service_name = header_str(headers, "x-internal-service");
    let internal_secret_header = header_str(headers, "x-internal-secret");
    if service_name.is_some() || internal_secret_header.is_some() {
        return auth::validate_internal_service(
            service_name.as_deref(),
            internal_secret_header.as_deref(),
            internal_secret,
            internal_allowlist,
        );
    }

    if let Some(bearer) = header_str(headers, "authorization") {
        let token = bearer.strip_prefix("Bearer ").unwrap_or(&bearer);
        let identity = backend.validate_jwt(token).await?;
        return Ok(AuthContext::Jwt(identity));
    }

    if let Some(api_key) = header_str(headers, "x-api-key") {
        let identity = backend.validate_api_key(&api_key).await?;
        return Ok(AuthContext::ApiKey(identity));
    }

    Err(VaultError::MissingCredentials)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}
