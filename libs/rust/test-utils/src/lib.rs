//! Shared test utilities for the Tokenization Vault's Rust libraries.
//!
//! This crate provides:
//! - Proptest generators for card, merchant, key id, and idempotency-key domain types
//! - Mock implementations for service clients
//! - Test fixtures with sample data

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod generators;
pub mod mocks;
pub mod fixtures;

pub use generators::*;
