//! Router assembly: binds every handler to its path and method, and layers
//! on panic recovery and request tracing.

use super::{handlers, AppState};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Build the public + internal HTTP router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/tokenize", post(handlers::tokenize))
        .route("/v1/tokens/:token/validate", get(handlers::validate_token))
        .route(
            "/v1/tokens/:token",
            get(handlers::get_token).delete(handlers::revoke_token),
        )
        .route("/v1/keys/statistics", get(handlers::key_statistics))
        .route("/v1/keys/rotate", post(handlers::rotate_key))
        .route("/internal/v1/detokenize", post(handlers::detokenize))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::LocalAuthBackend;
    use crate::service::TokenizationService;
    use crate::storage::{CachedVaultStore, IdempotencyStore, RateLimiter, VaultStore};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use key_broker::{KeyBroker, KeyBrokerError};
    use rust_common::{
        CacheClient, CacheClientConfig, CircuitBreaker, CircuitBreakerConfig, LoggingClient,
        LoggingClientConfig,
    };
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::sync::RwLock as TokioRwLock;
    use tower::util::ServiceExt;
    use zeroize::Zeroizing;

    struct FakeBroker {
        material: TokioRwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
    }

    #[async_trait]
    impl KeyBroker for FakeBroker {
        async fn create(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>, KeyBrokerError> {
            let material = crate::crypto::CryptoEngine::generate_dek();
            self.material.write().await.insert(key_id.to_string(), material.clone());
            Ok(material)
        }

        async fn fetch(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>, KeyBrokerError> {
            self.material
                .read()
                .await
                .get(key_id)
                .cloned()
                .ok_or_else(|| KeyBrokerError::KeyNotFound(key_id.to_string()))
        }

        async fn destroy(&self, key_id: &str) -> Result<(), KeyBrokerError> {
            self.material.write().await.remove(key_id);
            Ok(())
        }
    }

    async fn test_state() -> Arc<AppState> {
        let cache = Arc::new(CacheClient::new(CacheClientConfig::default()).await.unwrap());
        let store: Arc<dyn VaultStore> = Arc::new(CachedVaultStore::new(cache.clone()));
        let keys = Arc::new(crate::keys::KeyManager::new(
            Arc::new(FakeBroker { material: TokioRwLock::new(HashMap::new()) }),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            true,
            90,
            1_000_000,
        ));
        let logging = Arc::new(LoggingClient::new(LoggingClientConfig::default()).await.unwrap());
        let audit = Arc::new(crate::service::AuditLogger::new(logging));
        let service = Arc::new(TokenizationService::new(
            keys,
            store,
            audit,
            crate::config::TokenEnvironment::Test,
            false,
        ));

        Arc::new(AppState {
            service,
            auth_backend: Arc::new(LocalAuthBackend),
            rate_limiter: Arc::new(RateLimiter::new(cache.clone(), 50, 5_000)),
            idempotency: Arc::new(IdempotencyStore::new(cache, Duration::from_secs(3600))),
            internal_service_secret: "secret".to_string(),
            internal_service_allowlist: vec!["settlement-engine".to_string()],
        })
    }

    fn with_peer_addr(mut request: Request<Body>) -> Request<Body> {
        let addr: SocketAddr = ([127, 0, 0, 1], 1234).into();
        request.extensions_mut().insert(axum::extract::ConnectInfo(addr));
        request
    }

    #[tokio::test]
    async fn tokenize_without_credentials_is_unauthorized() {
        let app = router(test_state().await);
        let response = app
            .oneshot(with_peer_addr(
                Request::builder()
                    .method("POST")
                    .uri("/v1/tokenize")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"card_number":"4242424242424242","cardholder_name":"JOHN DOE","exp_month":12,"exp_year":2030,"cvv":"123"}"#))
                    .unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn tokenize_with_api_key_succeeds() {
        let app = router(test_state().await);
        let response = app
            .oneshot(with_peer_addr(
                Request::builder()
                    .method("POST")
                    .uri("/v1/tokenize")
                    .header("content-type", "application/json")
                    .header("x-api-key", "pk_test_abcdef1234567890")
                    .body(Body::from(r#"{"card_number":"4242424242424242","cardholder_name":"JOHN DOE","exp_month":12,"exp_year":2030,"cvv":"123"}"#))
                    .unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn detokenize_requires_internal_credentials() {
        let app = router(test_state().await);
        let response = app
            .oneshot(with_peer_addr(
                Request::builder()
                    .method("POST")
                    .uri("/internal/v1/detokenize")
                    .header("content-type", "application/json")
                    .header("x-api-key", "pk_test_abcdef1234567890")
                    .body(Body::from(r#"{"token":"tok_test_x","merchant_id":"merchant_m1","usage_type":"payment"}"#))
                    .unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
