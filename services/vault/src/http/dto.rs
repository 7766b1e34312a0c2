//! JSON request/response shapes for the public REST surface.
//!
//! Every success response is wrapped in the `{success, data, meta}` envelope;
//! failures go through `VaultError`'s own `IntoResponse` impl instead of a
//! type here.

use crate::domain::card::{Brand, CardType};
use crate::domain::record::VaultStatus;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// `POST /v1/tokenize` request body.
#[derive(Debug, Deserialize)]
pub struct TokenizeRequest {
    pub card_number: String,
    pub cardholder_name: String,
    pub exp_month: u32,
    pub exp_year: u32,
    pub cvv: String,
    #[serde(default)]
    pub is_single_use: bool,
    pub expires_in: Option<u64>,
}

/// `DELETE /v1/tokens/{token}` request body.
#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub reason: String,
}

/// Non-sensitive card metadata, with the dedup fingerprint, as returned
/// from a tokenize call.
#[derive(Debug, Serialize)]
pub struct CardWithFingerprint {
    pub brand: Brand,
    #[serde(rename = "type")]
    pub card_type: CardType,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
    pub fingerprint: String,
}

/// Non-sensitive card metadata, without the fingerprint, as returned from
/// a validate or read call.
#[derive(Debug, Serialize)]
pub struct CardInfo {
    pub brand: Brand,
    #[serde(rename = "type")]
    pub card_type: CardType,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
}

/// Success envelope `data` for `POST /v1/tokenize`.
#[derive(Debug, Serialize)]
pub struct TokenizeData {
    pub token: String,
    pub card: CardWithFingerprint,
    pub is_new_token: bool,
}

/// Success envelope `data` for the validate/read endpoints.
#[derive(Debug, Serialize)]
pub struct ValidateData {
    pub valid: bool,
    pub card: CardInfo,
    pub status: VaultStatus,
    pub usage_count: u64,
    pub is_single_use: bool,
}

/// Wrap a serializable payload in the spec's success envelope.
pub fn success_envelope(data: impl Serialize, request_id: &str) -> Value {
    json!({
        "success": true,
        "data": data,
        "meta": { "request_id": request_id, "timestamp": chrono::Utc::now().to_rfc3339() },
    })
}
