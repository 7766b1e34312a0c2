//! Tokenization Vault: envelope-encrypted card storage and detokenization.
//!
//! Converts raw card data into opaque, revocable tokens and returns the
//! original plaintext only to authorized internal callers. This is the
//! PCI-sensitive core of the payment gateway; every other component talks
//! to it through the public HTTP surface or the internal gRPC channel.

#![warn(missing_docs)]

pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod grpc;
pub mod http;
pub mod keys;
pub mod metrics;
pub mod middleware;
pub mod service;
pub mod storage;

pub use config::Config;
pub use error::VaultError;

pub mod vault_proto {
    //! Generated protobuf/tonic types for the internal RPC surface.
    tonic::include_proto!("vault.v1");
}
