//! Orchestration layer: tokenization pipeline and audit trail.

pub mod audit;
pub mod tokenization;

pub use audit::{AuditAction, AuditEvent, AuditLogger};
pub use tokenization::{
    DetokenizeInput, DetokenizeOutput, TokenizationService, TokenizeInput, TokenizeOutput,
    UsageType, ValidateOutput,
};
