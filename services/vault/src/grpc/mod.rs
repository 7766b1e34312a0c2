//! Internal gRPC surface: mirrors the public HTTP operations one-for-one
//! for same-mesh callers, per `proto/vault.proto`.
//!
//! Every response message carries its own `error` field, so a business
//! failure is reported as a populated field rather than a `tonic::Status` —
//! callers on the internal channel get uniform handling whether or not the
//! RPC itself is still `Ok`. A handler panic is still caught and turned
//! into a transport-level error rather than taking the connection down.

use crate::domain::card::{Brand, CardType};
use crate::domain::record::VaultStatus;
use crate::error::VaultError;
use crate::service::{DetokenizeInput, TokenizeInput, TokenizationService, UsageType};
use crate::vault_proto::vault_service_server::VaultService;
use crate::vault_proto::{
    DetokenizeRequest, DetokenizeResponse, RevokeTokenRequest, RevokeTokenResponse,
    TokenizeCardRequest, TokenizeCardResponse, ValidateTokenRequest, ValidateTokenResponse,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{error, instrument};

/// Implements [`VaultService`] over a shared [`TokenizationService`].
pub struct VaultServiceImpl {
    service: Arc<TokenizationService>,
}

impl VaultServiceImpl {
    /// Build the RPC surface over an already-constructed service.
    #[must_use]
    pub const fn new(service: Arc<TokenizationService>) -> Self {
        Self { service }
    }
}

fn status_str(status: VaultStatus) -> &'static str {
    match status {
        VaultStatus::Active => "active",
        VaultStatus::Expired => "expired",
        VaultStatus::Revoked => "revoked",
        VaultStatus::Used => "used",
    }
}

fn usage_type_from_str(value: &str) -> Result<UsageType, VaultError> {
    match value {
        "payment" => Ok(UsageType::Payment),
        "verification" => Ok(UsageType::Verification),
        "recurring" => Ok(UsageType::Recurring),
        other => Err(VaultError::invalid_card(format!("unknown usage_type: {other}"))),
    }
}

/// Run `body` on a fresh task and translate a panic into `Status::internal`
/// rather than letting it unwind across the tonic connection. Neither
/// `catch_unwind` nor a `futures` dependency is available here, so a
/// detached task plus a `JoinError` check stands in for both.
async fn catch_panic<T, F>(body: F) -> Result<T, Status>
where
    T: Send + 'static,
    F: std::future::Future<Output = T> + Send + 'static,
{
    match tokio::spawn(body).await {
        Ok(value) => Ok(value),
        Err(join_err) if join_err.is_panic() => {
            error!("gRPC handler panicked");
            Err(Status::internal("internal error"))
        }
        Err(_) => Err(Status::cancelled("request cancelled")),
    }
}

#[tonic::async_trait]
impl VaultService for VaultServiceImpl {
    #[instrument(skip(self, request))]
    async fn tokenize_card(
        &self,
        request: Request<TokenizeCardRequest>,
    ) -> Result<Response<TokenizeCardResponse>, Status> {
        let req = request.into_inner();
        let service = self.service.clone();

        let response = catch_panic(async move {
            let input = TokenizeInput {
                merchant_id: req.merchant_id,
                card_number: req.card_number,
                cardholder_name: req.cardholder_name,
                exp_month: req.exp_month,
                exp_year: req.exp_year,
                cvv: req.cvv,
                is_single_use: req.is_single_use,
                expires_in_seconds: (req.expires_in_seconds > 0).then_some(req.expires_in_seconds),
                request_id: req.request_id,
                actor_id: req.actor_id,
                ip: String::new(),
                user_agent: String::new(),
            };
            match service.tokenize(input).await {
                Ok(out) => TokenizeCardResponse {
                    token: out.token,
                    brand: out.brand.to_string(),
                    card_type: out.card_type.to_string(),
                    last4: out.last4,
                    exp_month: out.exp_month,
                    exp_year: out.exp_year,
                    fingerprint: out.fingerprint,
                    is_new_token: out.is_new_token,
                    error: String::new(),
                },
                Err(err) => TokenizeCardResponse {
                    error: err.safe_message(),
                    ..Default::default()
                },
            }
        })
        .await?;

        Ok(Response::new(response))
    }

    #[instrument(skip(self, request))]
    async fn detokenize(
        &self,
        request: Request<DetokenizeRequest>,
    ) -> Result<Response<DetokenizeResponse>, Status> {
        let req = request.into_inner();
        let service = self.service.clone();

        let response = catch_panic(async move {
            let usage_type = match usage_type_from_str(&req.usage_type) {
                Ok(usage_type) => usage_type,
                Err(err) => return DetokenizeResponse { error: err.safe_message(), ..Default::default() },
            };
            let input = DetokenizeInput {
                token: req.token,
                merchant_id: req.merchant_id,
                transaction_id: (!req.transaction_id.is_empty()).then_some(req.transaction_id),
                usage_type,
                amount: (req.amount > 0).then_some(req.amount),
                currency: (!req.currency.is_empty()).then_some(req.currency),
                ip: req.ip_address,
                user_agent: req.user_agent,
                request_id: String::new(),
                actor_id: String::new(),
            };
            match service.detokenize(input).await {
                Ok(out) => DetokenizeResponse {
                    card_number: out.card_number,
                    cardholder_name: out.cardholder_name.unwrap_or_default(),
                    exp_month: out.exp_month,
                    exp_year: out.exp_year,
                    card_brand: out.brand.to_string(),
                    last4: out.last4,
                    error: String::new(),
                },
                Err(err) => DetokenizeResponse { error: err.safe_message(), ..Default::default() },
            }
        })
        .await?;

        Ok(Response::new(response))
    }

    #[instrument(skip(self, request))]
    async fn validate_token(
        &self,
        request: Request<ValidateTokenRequest>,
    ) -> Result<Response<ValidateTokenResponse>, Status> {
        let req = request.into_inner();
        let service = self.service.clone();

        let response = catch_panic(async move {
            let request_id = uuid::Uuid::new_v4().to_string();
            match service.validate_token(&req.token, &req.merchant_id, "grpc", &request_id).await {
                Ok(out) => ValidateTokenResponse {
                    valid: out.valid,
                    brand: out.brand.to_string(),
                    card_type: out.card_type.to_string(),
                    last4: out.last4,
                    exp_month: out.exp_month,
                    exp_year: out.exp_year,
                    status: status_str(out.status).to_string(),
                    usage_count: out.usage_count,
                    is_single_use: out.is_single_use,
                    error: String::new(),
                },
                Err(err) => ValidateTokenResponse { error: err.safe_message(), ..Default::default() },
            }
        })
        .await?;

        Ok(Response::new(response))
    }

    #[instrument(skip(self, request))]
    async fn revoke_token(
        &self,
        request: Request<RevokeTokenRequest>,
    ) -> Result<Response<RevokeTokenResponse>, Status> {
        let req = request.into_inner();
        let service = self.service.clone();

        let response = catch_panic(async move {
            let request_id = uuid::Uuid::new_v4().to_string();
            match service
                .revoke_token(&req.token, &req.merchant_id, &req.revoked_by, &req.reason, &request_id)
                .await
            {
                Ok(()) => RevokeTokenResponse { revoked: true, error: String::new() },
                Err(err) => RevokeTokenResponse { revoked: false, error: err.safe_message() },
            }
        })
        .await?;

        Ok(Response::new(response))
    }
}
