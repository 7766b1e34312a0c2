//! Wire types for the key broker's HTTP API.

use serde::{Deserialize, Serialize};

/// Request body for creating DEK material under a key id.
#[derive(Debug, Clone, Serialize)]
pub struct CreateDekRequest {
    /// Number of random bytes to generate server-side (32 for AES-256).
    pub bytes: u32,
}

/// Response to a create/fetch of KEK-wrapped DEK material.
#[derive(Debug, Clone, Deserialize)]
pub struct DekMaterialResponse {
    /// Transit-engine-shaped envelope.
    pub data: DekMaterialData,
}

/// The KEK-wrapped key bytes, base64 encoded by the broker.
#[derive(Debug, Clone, Deserialize)]
pub struct DekMaterialData {
    /// Base64-encoded ciphertext of the DEK, wrapped under the broker's KEK.
    pub ciphertext: String,
}

/// Kubernetes auth-method login response.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub auth: AuthData,
}

/// Auth data returned alongside a client token.
#[derive(Debug, Deserialize)]
pub struct AuthData {
    pub client_token: String,
    pub lease_duration: u64,
    pub renewable: bool,
}
