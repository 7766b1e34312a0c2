//! Persistence traits and the in-process cache-backed implementation.
//!
//! The teacher has no SQL crate anywhere in its dependency tree — its
//! persistence model is entirely the cache-service abstraction. The vault
//! follows suit: [`VaultStore`] is the seam where a real deployment would
//! swap in a `sqlx`-backed Postgres implementation carrying the spec's
//! literal `WHERE status='active'` partial-unique-index; that
//! implementation is out of scope here.

pub mod idempotency;
pub mod rate_limit;
pub mod vault_store;

pub use idempotency::{IdempotencyOutcome, IdempotencyStore};
pub use rate_limit::RateLimiter;
pub use vault_store::{CachedVaultStore, VaultStore};
