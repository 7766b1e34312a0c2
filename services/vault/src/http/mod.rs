//! Public HTTP transport: merchant-facing REST surface plus the internal
//! detokenize endpoint, all over `axum`.
//!
//! The teacher's services expose only `tonic`; this surface is grounded on
//! the `AppState`/extractor idioms of a relayer service elsewhere in the
//! retrieval pack, since nothing in the teacher touches `axum`.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use routes::router;

use crate::middleware::AuthBackend;
use crate::service::TokenizationService;
use crate::storage::{IdempotencyStore, RateLimiter};
use std::sync::Arc;

/// Shared state handed to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// The orchestration layer every handler ultimately calls into.
    pub service: Arc<TokenizationService>,
    /// JWT / API-key validation delegate.
    pub auth_backend: Arc<dyn AuthBackend>,
    /// Per-caller request-rate enforcement.
    pub rate_limiter: Arc<RateLimiter>,
    /// Idempotency-key replay/conflict tracking.
    pub idempotency: Arc<IdempotencyStore>,
    /// Shared secret for the internal-service credential form.
    pub internal_service_secret: String,
    /// Service names permitted to authenticate as an internal caller.
    pub internal_service_allowlist: Vec<String>,
}
