//! Key broker client for the Tokenization Vault.
//!
//! Provides the external KEK/DEK broker capability set the vault's Key
//! Manager consumes in production mode: `create`, `fetch`, `destroy` of
//! KEK-wrapped data-encryption-key material, addressed by key id. Modeled
//! on a HashiCorp-Vault-shaped transit/KV HTTP API with Kubernetes service
//! account authentication and automatic token renewal.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod secrets;

pub use client::KeyBrokerClient;
pub use config::KeyBrokerConfig;
pub use error::{KeyBrokerError, KeyBrokerResult};
pub use provider::KeyBroker;
