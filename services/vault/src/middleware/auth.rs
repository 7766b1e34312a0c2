//! Authentication: three credential forms per spec §4.7.
//!
//! Bearer JWT and API Key both delegate to an external auth service —
//! modeled here as the [`AuthBackend`] trait, the same seam
//! `rust_common::CacheClient` uses for its remote calls. [`LocalAuthBackend`]
//! is the in-process stand-in wired by default; a production deployment
//! swaps in a `tonic`-backed implementation without touching callers.
//!
//! Internal-service auth never delegates: it is a local constant-time
//! comparison against a configured shared secret plus an allowlist.

use crate::error::VaultError;
use async_trait::async_trait;
use subtle::ConstantTimeEq;

/// Identity attached by a validated Bearer JWT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwtIdentity {
    /// Subject user id.
    pub user_id: String,
    /// Merchant the caller acts on behalf of.
    pub merchant_id: String,
    /// Subject email.
    pub email: String,
    /// Assigned roles.
    pub roles: Vec<String>,
}

/// Identity attached by a validated API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyIdentity {
    /// Merchant the key belongs to.
    pub merchant_id: String,
    /// The key's own id (not the secret itself).
    pub key_id: String,
    /// Human-readable key label.
    pub key_name: String,
    /// Permission set attached to the key.
    pub permissions: Vec<String>,
}

/// The caller identity resolved by any of the three credential forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthContext {
    /// Authenticated via `Authorization: Bearer <jwt>`.
    Jwt(JwtIdentity),
    /// Authenticated via `X-API-Key`.
    ApiKey(ApiKeyIdentity),
    /// Authenticated via `X-Internal-Service` / `X-Internal-Secret`.
    Internal {
        /// The calling service's allowlisted name.
        service_name: String,
    },
}

impl AuthContext {
    /// The merchant this request is scoped to, if any. Internal callers
    /// supply their own merchant id out-of-band (e.g. in the request body).
    #[must_use]
    pub fn merchant_id(&self) -> Option<&str> {
        match self {
            Self::Jwt(identity) => Some(&identity.merchant_id),
            Self::ApiKey(identity) => Some(&identity.merchant_id),
            Self::Internal { .. } => None,
        }
    }

    /// Whether this request authenticated via the internal-service
    /// credential form. The detokenize endpoint is reachable only when this
    /// is `true`.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// The actor id recorded in audit events.
    #[must_use]
    pub fn actor_id(&self) -> &str {
        match self {
            Self::Jwt(identity) => &identity.user_id,
            Self::ApiKey(identity) => &identity.key_id,
            Self::Internal { service_name } => service_name,
        }
    }

    /// Declarative permission check. API keys test set membership; JWTs
    /// test role membership. Internal callers always pass — the internal
    /// surface has no finer-grained permission model.
    ///
    /// # Errors
    /// Returns `InsufficientPermission`, never `MissingCredentials` or
    /// `InvalidCredentials` — authentication and authorization are distinct
    /// failure classes per spec §4.7.
    pub fn require_permission(&self, permission: &str) -> Result<(), VaultError> {
        let allowed = match self {
            Self::Jwt(identity) => identity.roles.iter().any(|r| r == permission || r == "admin"),
            Self::ApiKey(identity) => identity.permissions.iter().any(|p| p == permission),
            Self::Internal { .. } => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(VaultError::InsufficientPermission(permission.to_string()))
        }
    }
}

/// Pluggable delegate for JWT and API-key validation. The vault never
/// re-implements auth-service logic — this trait is the seam.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Validate a bearer JWT, returning the identity it carries.
    async fn validate_jwt(&self, token: &str) -> Result<JwtIdentity, VaultError>;
    /// Validate an API key (already prefix-checked by the caller).
    async fn validate_api_key(&self, key: &str) -> Result<ApiKeyIdentity, VaultError>;
}

/// In-process development backend. Accepts any well-formed, non-empty
/// credential and derives a deterministic identity from it, rather than
/// calling out to a real auth service. MUST NOT be used in production —
/// callers should wire a real `AuthBackend` implementation there.
pub struct LocalAuthBackend;

#[async_trait]
impl AuthBackend for LocalAuthBackend {
    async fn validate_jwt(&self, token: &str) -> Result<JwtIdentity, VaultError> {
        if token.is_empty() {
            return Err(VaultError::InvalidCredentials("empty bearer token".to_string()));
        }
        let merchant_id = subject_from_token(token);
        Ok(JwtIdentity {
            user_id: format!("user_{merchant_id}"),
            merchant_id: format!("merchant_{merchant_id}"),
            email: format!("{merchant_id}@example.test"),
            roles: vec!["tokenize".to_string(), "detokenize".to_string(), "admin".to_string()],
        })
    }

    async fn validate_api_key(&self, key: &str) -> Result<ApiKeyIdentity, VaultError> {
        if !key.starts_with("pk_live_") && !key.starts_with("pk_test_") {
            return Err(VaultError::InvalidCredentials("malformed API key prefix".to_string()));
        }
        let merchant_id = subject_from_token(key);
        Ok(ApiKeyIdentity {
            merchant_id: format!("merchant_{merchant_id}"),
            key_id: format!("key_{merchant_id}"),
            key_name: "default".to_string(),
            permissions: vec!["tokenize".to_string(), "validate_token".to_string(), "revoke_token".to_string()],
        })
    }
}

fn subject_from_token(token: &str) -> String {
    token.chars().rev().take(8).collect::<String>().chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Validate internal-service credentials with a constant-time secret
/// comparison plus an allowlist membership check.
///
/// # Errors
/// Returns `MissingCredentials` if either header is absent,
/// `InvalidCredentials` on a secret mismatch or an unlisted service name.
pub fn validate_internal_service(
    service_name: Option<&str>,
    secret: Option<&str>,
    configured_secret: &str,
    allowlist: &[String],
) -> Result<AuthContext, VaultError> {
    let service_name = service_name.ok_or(VaultError::MissingCredentials)?;
    let secret = secret.ok_or(VaultError::MissingCredentials)?;

    if secret.as_bytes().ct_eq(configured_secret.as_bytes()).unwrap_u8() != 1 {
        return Err(VaultError::InvalidCredentials("internal secret mismatch".to_string()));
    }
    if !allowlist.iter().any(|name| name == service_name) {
        return Err(VaultError::InvalidCredentials("service not in internal allowlist".to_string()));
    }

    Ok(AuthContext::Internal { service_name: service_name.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_backend_rejects_empty_jwt() {
        let backend = LocalAuthBackend;
        let err = backend.validate_jwt("").await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidCredentials(_)));
    }

    #[tokio::test]
    async fn local_backend_rejects_malformed_api_key() {
        let backend = LocalAuthBackend;
        let err = backend.validate_api_key("not-a-key").await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidCredentials(_)));
    }

    #[tokio::test]
    async fn local_backend_accepts_well_formed_api_key() {
        let backend = LocalAuthBackend;
        let identity = backend.validate_api_key("pk_test_abcdef1234567890").await.unwrap();
        assert!(identity.permissions.contains(&"tokenize".to_string()));
    }

    #[test]
    fn internal_service_requires_matching_secret() {
        let allowlist = vec!["settlement-engine".to_string()];
        let err = validate_internal_service(Some("settlement-engine"), Some("wrong"), "correct-secret", &allowlist).unwrap_err();
        assert!(matches!(err, VaultError::InvalidCredentials(_)));
    }

    #[test]
    fn internal_service_requires_allowlisted_name() {
        let allowlist = vec!["settlement-engine".to_string()];
        let err = validate_internal_service(Some("rogue-service"), Some("secret"), "secret", &allowlist).unwrap_err();
        assert!(matches!(err, VaultError::InvalidCredentials(_)));
    }

    #[test]
    fn internal_service_succeeds_with_matching_secret_and_allowlist() {
        let allowlist = vec!["settlement-engine".to_string()];
        let ctx = validate_internal_service(Some("settlement-engine"), Some("secret"), "secret", &allowlist).unwrap();
        assert_eq!(ctx.actor_id(), "settlement-engine");
    }

    #[test]
    fn api_key_permission_check_is_membership_based() {
        let identity = AuthContext::ApiKey(ApiKeyIdentity {
            merchant_id: "merchant_m1".to_string(),
            key_id: "key_1".to_string(),
            key_name: "default".to_string(),
            permissions: vec!["tokenize".to_string()],
        });
        assert!(identity.require_permission("tokenize").is_ok());
        assert!(matches!(identity.require_permission("revoke_token"), Err(VaultError::InsufficientPermission(_))));
    }
}
