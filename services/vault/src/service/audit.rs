//! PCI-redacted audit trail for every operation that touches vault data.

use rust_common::LoggingClient;
use std::sync::Arc;

/// Closed set of actions the audit trail records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// A tokenize request, successful or not.
    Tokenize,
    /// A detokenize request, successful or not.
    Detokenize,
    /// A validate-token request.
    ValidateToken,
    /// A revoke-token request.
    RevokeToken,
    /// A cross-merchant access attempt, always a security event.
    AccessDenied,
    /// A key rotation.
    KeyRotate,
    /// A key revocation.
    KeyRevoke,
}

impl AuditAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Tokenize => "tokenize",
            Self::Detokenize => "detokenize",
            Self::ValidateToken => "validate_token",
            Self::RevokeToken => "revoke_token",
            Self::AccessDenied => "access_denied",
            Self::KeyRotate => "key_rotate",
            Self::KeyRevoke => "key_revoke",
        }
    }
}

/// One audit record: `(request_id, action, actor, merchant_id, status, ip,
/// user_agent, timestamp)` per spec §3. Never carries PAN or CVV.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Caller-correlated request id.
    pub request_id: String,
    /// What operation this is.
    pub action: AuditAction,
    /// Who performed it (user id, API key id, or internal service name).
    pub actor: String,
    /// Merchant the operation was scoped to.
    pub merchant_id: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Caller IP address.
    pub ip: String,
    /// Caller user agent.
    pub user_agent: String,
    /// Token id involved, if any — never the raw token string.
    pub token_id: Option<String>,
    /// Extra contextual fields (e.g. detokenize's transaction id, usage
    /// type, amount, currency) folded into the same append-only trail
    /// rather than a separate usage-log table.
    pub extra: Vec<(String, String)>,
}

impl AuditEvent {
    /// Start building an event for `action` performed by `actor` on
    /// `merchant_id`, defaulting to `success = true`.
    #[must_use]
    pub fn new(request_id: impl Into<String>, action: AuditAction, actor: impl Into<String>, merchant_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            action,
            actor: actor.into(),
            merchant_id: merchant_id.into(),
            success: true,
            ip: String::new(),
            user_agent: String::new(),
            token_id: None,
            extra: Vec::new(),
        }
    }

    /// Set caller network metadata.
    #[must_use]
    pub fn with_network(mut self, ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.ip = ip.into();
        self.user_agent = user_agent.into();
        self
    }

    /// Mark the event as a failure.
    #[must_use]
    pub const fn failed(mut self) -> Self {
        self.success = false;
        self
    }

    /// Attach the surrogate record id this event concerns.
    #[must_use]
    pub fn with_token_id(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self
    }

    /// Attach an extra contextual field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }
}

/// Writes audit events through the shared [`LoggingClient`], redacting any
/// cardholder data before the record leaves this module.
pub struct AuditLogger {
    logging: Arc<LoggingClient>,
}

impl AuditLogger {
    /// Construct a new logger over a shared `LoggingClient`.
    #[must_use]
    pub fn new(logging: Arc<LoggingClient>) -> Self {
        Self { logging }
    }

    /// Record one audit event. Always succeeds from the caller's point of
    /// view — a logging-backend failure must never fail the request it is
    /// auditing.
    pub async fn record(&self, event: AuditEvent) {
        let mut entry = rust_common::LogEntry::new(
            if event.success {
                rust_common::LogLevel::Info
            } else {
                rust_common::LogLevel::Warn
            },
            format!("vault.{} success={}", event.action.as_str(), event.success),
            "vault-service",
        )
        .with_correlation_id(event.request_id.clone())
        .with_metadata("action", event.action.as_str())
        .with_metadata("actor", event.actor)
        .with_metadata("merchant_id", event.merchant_id)
        .with_metadata("success", event.success.to_string())
        .with_metadata("ip", event.ip)
        .with_metadata("user_agent", event.user_agent);

        if let Some(token_id) = event.token_id {
            entry = entry.with_metadata("token_id", token_id);
        }
        for (key, value) in event.extra {
            entry = entry.with_metadata(key, value);
        }

        self.logging.log(entry).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_common::LoggingClientConfig;

    #[tokio::test]
    async fn records_a_success_event() {
        let logging = Arc::new(LoggingClient::new(LoggingClientConfig::default()).await.unwrap());
        let logger = AuditLogger::new(logging.clone());

        let event = AuditEvent::new("req-1", AuditAction::Tokenize, "user-1", "merchant_m1")
            .with_network("127.0.0.1", "test-agent")
            .with_token_id("id1");
        logger.record(event).await;

        assert_eq!(logging.buffer_size().await, 1);
    }

    #[tokio::test]
    async fn records_a_failure_as_warn_without_panicking() {
        let logging = Arc::new(LoggingClient::new(LoggingClientConfig::default()).await.unwrap());
        let logger = AuditLogger::new(logging.clone());

        let event = AuditEvent::new("req-2", AuditAction::AccessDenied, "merchant_m2", "merchant_m1")
            .failed()
            .with_token_id("id1");
        logger.record(event).await;

        assert_eq!(logging.buffer_size().await, 1);
    }
}
