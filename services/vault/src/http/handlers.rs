//! Handler functions for the public REST surface and the internal
//! detokenize endpoint.
//!
//! Every state-changing handler follows the same sequence: resolve auth,
//! enforce the permission it requires, consume the rate limiter, check
//! idempotency if the caller supplied a key, run the business operation,
//! and (on 2xx) persist the idempotency record.

use super::dto::{
    success_envelope, CardInfo, CardWithFingerprint, RevokeRequest, TokenizeData, TokenizeRequest,
    ValidateData,
};
use super::AppState;
use crate::error::VaultError;
use crate::metrics;
use crate::middleware::idempotency::GuardDecision;
use crate::middleware::{extract_auth_context, rate_limit, IdempotencyGuard, RateLimitHeaders};
use crate::service::{DetokenizeInput, TokenizeInput, UsageType};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// `POST /v1/tokenize`.
pub async fn tokenize(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, VaultError> {
    let started = Instant::now();
    let request_id = request_id(&headers);
    let ctx = extract_auth_context(
        &headers,
        &state.auth_backend,
        &state.internal_service_secret,
        &state.internal_service_allowlist,
    )
    .await?;
    ctx.require_permission("tokenize")?;
    let merchant_id = ctx.merchant_id().ok_or(VaultError::AccessDenied)?.to_string();
    let ip = client_ip(&headers, addr);
    let user_agent = header_str(&headers, "user-agent").unwrap_or_default();

    let rl = rate_limit::enforce(&state.rate_limiter, &merchant_id).await?;

    let guard = match idempotency_key(&headers) {
        Some(key) => match IdempotencyGuard::check(&state.idempotency, &merchant_id, &key, &body).await? {
            GuardDecision::Replay { status, bytes } => {
                return Ok(replay_response(status, bytes, rl));
            }
            GuardDecision::Run(guard) => Some(guard),
        },
        None => None,
    };

    let req: TokenizeRequest = serde_json::from_slice(&body)
        .map_err(|e| VaultError::invalid_card(format!("malformed JSON body: {e}")))?;

    let input = TokenizeInput {
        merchant_id: merchant_id.clone(),
        card_number: req.card_number,
        cardholder_name: req.cardholder_name,
        exp_month: req.exp_month,
        exp_year: req.exp_year,
        cvv: req.cvv,
        is_single_use: req.is_single_use,
        expires_in_seconds: req.expires_in,
        request_id: request_id.clone(),
        actor_id: ctx.actor_id().to_string(),
        ip: ip.clone(),
        user_agent: user_agent.clone(),
    };

    let result = state.service.tokenize(input).await;
    record_latency("tokenize", started);
    match result {
        Ok(out) => {
            metrics::record_tokenize("success");
            let data = TokenizeData {
                token: out.token,
                card: CardWithFingerprint {
                    brand: out.brand,
                    card_type: out.card_type,
                    last4: out.last4,
                    exp_month: out.exp_month,
                    exp_year: out.exp_year,
                    fingerprint: out.fingerprint,
                },
                is_new_token: out.is_new_token,
            };
            let envelope = success_envelope(data, &request_id);
            let response = ok_response(StatusCode::OK, &envelope, rl);
            if let Some(guard) = guard {
                let bytes = serde_json::to_vec(&envelope).unwrap_or_default();
                guard
                    .store(&state.idempotency, bytes, 200, "/v1/tokenize", "POST", &ip, &user_agent)
                    .await?;
            }
            Ok(response)
        }
        Err(err) => {
            metrics::record_tokenize("failure");
            Err(err)
        }
    }
}

/// `GET /v1/tokens/{token}/validate`.
pub async fn validate_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Result<Response, VaultError> {
    let started = Instant::now();
    let ctx = extract_auth_context(
        &headers,
        &state.auth_backend,
        &state.internal_service_secret,
        &state.internal_service_allowlist,
    )
    .await?;
    ctx.require_permission("validate_token")?;
    let merchant_id = ctx.merchant_id().ok_or(VaultError::AccessDenied)?.to_string();
    let rl = rate_limit::enforce(&state.rate_limiter, &merchant_id).await?;
    let request_id = request_id(&headers);

    let out = state
        .service
        .validate_token(&token, &merchant_id, ctx.actor_id(), &request_id)
        .await;
    record_latency("validate_token", started);
    let out = out.map_err(|e| {
        metrics::record_access_denied("validate_token");
        e
    })?;

    let data = ValidateData {
        valid: out.valid,
        card: CardInfo {
            brand: out.brand,
            card_type: out.card_type,
            last4: out.last4,
            exp_month: out.exp_month,
            exp_year: out.exp_year,
        },
        status: out.status,
        usage_count: out.usage_count,
        is_single_use: out.is_single_use,
    };
    let envelope = success_envelope(data, &request_id);
    Ok(ok_response(StatusCode::OK, &envelope, rl))
}

/// `GET /v1/tokens/{token}` — identical surface to validate per spec §4.4's
/// side-effect-free read contract; this endpoint is the "token read" entry
/// named in spec §4.7's sensitive-endpoint list.
pub async fn get_token(
    state: State<Arc<AppState>>,
    headers: HeaderMap,
    path: Path<String>,
) -> Result<Response, VaultError> {
    validate_token(state, headers, path).await
}

/// `DELETE /v1/tokens/{token}`.
pub async fn revoke_token(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<Response, VaultError> {
    let started = Instant::now();
    let request_id = request_id(&headers);
    let ctx = extract_auth_context(
        &headers,
        &state.auth_backend,
        &state.internal_service_secret,
        &state.internal_service_allowlist,
    )
    .await?;
    ctx.require_permission("revoke_token")?;
    let merchant_id = ctx.merchant_id().ok_or(VaultError::AccessDenied)?.to_string();
    let ip = client_ip(&headers, addr);
    let user_agent = header_str(&headers, "user-agent").unwrap_or_default();

    let rl = rate_limit::enforce(&state.rate_limiter, &merchant_id).await?;

    let guard = match idempotency_key(&headers) {
        Some(key) => match IdempotencyGuard::check(&state.idempotency, &merchant_id, &key, &body).await? {
            GuardDecision::Replay { status, bytes } => {
                return Ok(replay_response(status, bytes, rl));
            }
            GuardDecision::Run(guard) => Some(guard),
        },
        None => None,
    };

    let req: RevokeRequest = serde_json::from_slice(&body)
        .map_err(|e| VaultError::invalid_card(format!("malformed JSON body: {e}")))?;
    if req.reason.trim().is_empty() {
        return Err(VaultError::invalid_card("revocation reason is required"));
    }

    let result = state
        .service
        .revoke_token(&token, &merchant_id, ctx.actor_id(), &req.reason, &request_id)
        .await;
    record_latency("revoke_token", started);
    match result {
        Ok(()) => {
            metrics::record_revoke("success");
            let envelope = success_envelope(serde_json::json!({ "revoked": true }), &request_id);
            let response = ok_response(StatusCode::OK, &envelope, rl);
            if let Some(guard) = guard {
                let bytes = serde_json::to_vec(&envelope).unwrap_or_default();
                guard
                    .store(&state.idempotency, bytes, 200, "/v1/tokens/:token", "DELETE", &ip, &user_agent)
                    .await?;
            }
            Ok(response)
        }
        Err(err) => {
            metrics::record_revoke("failure");
            Err(err)
        }
    }
}

/// `GET /v1/keys/statistics`.
pub async fn key_statistics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, VaultError> {
    let ctx = extract_auth_context(
        &headers,
        &state.auth_backend,
        &state.internal_service_secret,
        &state.internal_service_allowlist,
    )
    .await?;
    ctx.require_permission("key_statistics")?;
    let merchant_id = ctx.merchant_id().ok_or(VaultError::AccessDenied)?.to_string();
    let rl = rate_limit::enforce(&state.rate_limiter, &merchant_id).await?;

    let stats = state.service.key_statistics(&merchant_id).await;
    let data = serde_json::json!({
        "total": stats.total,
        "active": stats.active,
        "rotated": stats.rotated,
        "revoked": stats.revoked,
        "oldest_age_days": stats.oldest_age_days,
        "last_rotation": stats.last_rotation.map(|t| t.to_rfc3339()),
    });
    let envelope = success_envelope(data, &request_id(&headers));
    Ok(ok_response(StatusCode::OK, &envelope, rl))
}

/// `POST /v1/keys/rotate`.
pub async fn rotate_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, VaultError> {
    let request_id = request_id(&headers);
    let ctx = extract_auth_context(
        &headers,
        &state.auth_backend,
        &state.internal_service_secret,
        &state.internal_service_allowlist,
    )
    .await?;
    ctx.require_permission("rotate_key")?;
    let merchant_id = ctx.merchant_id().ok_or(VaultError::AccessDenied)?.to_string();
    let rl = rate_limit::enforce(&state.rate_limiter, &merchant_id).await?;

    let new_key_id = state.service.rotate_key(&merchant_id, ctx.actor_id(), &request_id).await?;
    let envelope = success_envelope(serde_json::json!({ "key_id": new_key_id }), &request_id);
    Ok(ok_response(StatusCode::OK, &envelope, rl))
}

/// `POST /internal/v1/detokenize`. Reachable only through internal-service
/// credentials; the merchant id is supplied in the request body rather than
/// derived from the caller's own identity.
pub async fn detokenize(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, VaultError> {
    let started = Instant::now();
    let request_id = request_id(&headers);
    let ctx = extract_auth_context(
        &headers,
        &state.auth_backend,
        &state.internal_service_secret,
        &state.internal_service_allowlist,
    )
    .await?;
    if !ctx.is_internal() {
        return Err(VaultError::AccessDenied);
    }
    let ip = client_ip(&headers, addr);
    let user_agent = header_str(&headers, "user-agent").unwrap_or_default();

    let req: InternalDetokenizeRequest = serde_json::from_slice(&body)
        .map_err(|e| VaultError::invalid_card(format!("malformed JSON body: {e}")))?;

    let usage_type = match req.usage_type.as_str() {
        "payment" => UsageType::Payment,
        "verification" => UsageType::Verification,
        "recurring" => UsageType::Recurring,
        other => return Err(VaultError::invalid_card(format!("unknown usage_type: {other}"))),
    };

    let input = DetokenizeInput {
        token: req.token,
        merchant_id: req.merchant_id,
        transaction_id: req.transaction_id,
        usage_type,
        amount: req.amount,
        currency: req.currency,
        ip,
        user_agent,
        request_id: request_id.clone(),
        actor_id: ctx.actor_id().to_string(),
    };

    let result = state.service.detokenize(input).await;
    record_latency("detokenize", started);
    match result {
        Ok(out) => {
            metrics::record_detokenize("success");
            let data = serde_json::json!({
                "card_number": out.card_number,
                "cardholder_name": out.cardholder_name,
                "exp_month": out.exp_month,
                "exp_year": out.exp_year,
                "card_brand": out.brand,
                "last4": out.last4,
            });
            let envelope = success_envelope(data, &request_id);
            Ok((StatusCode::OK, Json(envelope)).into_response())
        }
        Err(err) => {
            metrics::record_detokenize("failure");
            Err(err)
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct InternalDetokenizeRequest {
    token: String,
    merchant_id: String,
    transaction_id: Option<String>,
    usage_type: String,
    amount: Option<i64>,
    currency: Option<String>,
}

fn request_id(headers: &HeaderMap) -> String {
    header_str(headers, "x-request-id").unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "idempotency-key")
}

/// Trust boundary: `X-Forwarded-For` is only honored because this service
/// sits behind the gateway's proxy layer per spec §1; a direct deployment
/// would need a trusted-proxy allowlist before trusting this header.
fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(str::trim).map(str::to_string))
        .unwrap_or_else(|| addr.ip().to_string())
}

fn rate_limit_header_value(n: u32) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

fn ok_response(status: StatusCode, envelope: &Value, rl: RateLimitHeaders) -> Response {
    let mut response = (status, Json(envelope.clone())).into_response();
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", rate_limit_header_value(rl.limit));
    headers.insert("x-ratelimit-remaining", rate_limit_header_value(rl.remaining));
    response
}

fn replay_response(status: u16, bytes: Vec<u8>, rl: RateLimitHeaders) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    let mut response = (status, bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("x-ratelimit-limit", rate_limit_header_value(rl.limit));
    headers.insert("x-ratelimit-remaining", rate_limit_header_value(rl.remaining));
    response
}

fn record_latency(operation: &str, started: Instant) {
    metrics::record_request_latency(operation, "http", started.elapsed().as_secs_f64());
}
