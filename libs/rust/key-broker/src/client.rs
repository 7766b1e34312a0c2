//! HTTP client for the external KEK/DEK broker.

use crate::{
    config::KeyBrokerConfig,
    error::{KeyBrokerError, KeyBrokerResult},
    provider::KeyBroker,
    secrets::{AuthResponse, CreateDekRequest, DekMaterialResponse},
};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Broker client with Kubernetes service-account auth and automatic token renewal.
pub struct KeyBrokerClient {
    config: KeyBrokerConfig,
    http: Client,
    token: Arc<RwLock<Option<String>>>,
    token_expiry: Arc<RwLock<Option<std::time::Instant>>>,
}

impl KeyBrokerClient {
    pub fn new(config: KeyBrokerConfig) -> KeyBrokerResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(KeyBrokerError::Http)?;

        Ok(Self {
            config,
            http,
            token: Arc::new(RwLock::new(None)),
            token_expiry: Arc::new(RwLock::new(None)),
        })
    }

    /// Authenticate with the Kubernetes auth method.
    pub async fn authenticate(&self) -> KeyBrokerResult<()> {
        let jwt = tokio::fs::read_to_string(&self.config.token_path)
            .await
            .map_err(|e| KeyBrokerError::AuthenticationFailed(e.to_string()))?;

        let url = format!("{}/v1/auth/kubernetes/login", self.config.addr);
        let body = serde_json::json!({
            "role": self.config.role,
            "jwt": jwt.trim(),
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| KeyBrokerError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(KeyBrokerError::AuthenticationFailed(format!(
                "status {}: {}",
                status, text
            )));
        }

        let auth_response: AuthResponse = response.json().await?;
        let ttl = Duration::from_secs(auth_response.auth.lease_duration);
        let expiry = std::time::Instant::now() + ttl;

        *self.token.write().await = Some(auth_response.auth.client_token);
        *self.token_expiry.write().await = Some(expiry);

        info!("authenticated with key broker, token valid for {:?}", ttl);
        Ok(())
    }

    async fn get_token(&self) -> KeyBrokerResult<String> {
        let needs_auth = {
            let token = self.token.read().await;
            let expiry = self.token_expiry.read().await;

            match (&*token, &*expiry) {
                (Some(_), Some(exp)) => {
                    let remaining = exp.saturating_duration_since(std::time::Instant::now());
                    remaining.as_secs_f64() < self.config.timeout.as_secs_f64().max(1.0)
                        * self.config.renewal_threshold
                }
                _ => true,
            }
        };

        if needs_auth {
            self.authenticate().await?;
        }

        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| KeyBrokerError::AuthenticationFailed("no token available".to_string()))
    }

    async fn transit_request(
        &self,
        method: reqwest::Method,
        key_id: &str,
        body: Option<serde_json::Value>,
    ) -> KeyBrokerResult<DekMaterialResponse> {
        let token = self.get_token().await?;
        let url = format!("{}/v1/transit/keys/{}", self.config.addr, key_id);

        let mut request = self
            .http
            .request(method, &url)
            .header("X-Broker-Token", token);
        if let Some(b) = body {
            request = request.json(&b);
        }

        let response = request
            .send()
            .await
            .map_err(|e| KeyBrokerError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(KeyBrokerError::KeyNotFound(key_id.to_string()));
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(KeyBrokerError::PermissionDenied(key_id.to_string()));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(KeyBrokerError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KeyBrokerError::Unavailable(format!(
                "status {}: {}",
                status, text
            )));
        }

        response.json().await.map_err(KeyBrokerError::from)
    }
}

#[async_trait]
impl KeyBroker for KeyBrokerClient {
    async fn create(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>, KeyBrokerError> {
        debug!("creating DEK material under key id {}", key_id);
        let body = serde_json::to_value(CreateDekRequest { bytes: 32 })?;
        let response = self
            .transit_request(reqwest::Method::POST, key_id, Some(body))
            .await?;
        base64::engine::general_purpose::STANDARD
            .decode(response.data.ciphertext)
            .map(Zeroizing::new)
            .map_err(|e| KeyBrokerError::Encoding(e.to_string()))
    }

    async fn fetch(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>, KeyBrokerError> {
        debug!("fetching DEK material for key id {}", key_id);
        let response = self
            .transit_request(reqwest::Method::GET, key_id, None)
            .await?;
        base64::engine::general_purpose::STANDARD
            .decode(response.data.ciphertext)
            .map(Zeroizing::new)
            .map_err(|e| KeyBrokerError::Encoding(e.to_string()))
    }

    async fn destroy(&self, key_id: &str) -> Result<(), KeyBrokerError> {
        debug!("destroying DEK material for key id {}", key_id);
        match self
            .transit_request(reqwest::Method::DELETE, key_id, None)
            .await
        {
            Ok(_) => Ok(()),
            Err(KeyBrokerError::KeyNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_carry_through() {
        let config = KeyBrokerConfig::default();
        assert_eq!(config.max_retries, 3);
    }
}
