//! Error types for the AI crate.

use relaycrm_core::TenantId;
use std::fmt;

/// Errors from completion-provider operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    /// The tenant is not entitled to AI features.
    NotEntitled { tenant_id: TenantId },
    /// The provider rejected or failed the request.
    RequestFailed { reason: String },
    /// The provider response could not be parsed.
    ResponseParseFailed { reason: String },
    /// Timeout waiting for the provider.
    Timeout,
    /// The provider rate-limited the request.
    RateLimited { retry_after_secs: Option<u64> },
    /// Invalid request configuration.
    InvalidConfig { reason: String },
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEntitled { tenant_id } => {
                write!(f, "tenant {tenant_id} is not entitled to AI features")
            }
            Self::RequestFailed { reason } => write!(f, "completion request failed: {reason}"),
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse completion response: {reason}")
            }
            Self::Timeout => write!(f, "completion request timed out"),
            Self::RateLimited { retry_after_secs } => match retry_after_secs {
                Some(secs) => write!(f, "provider rate limited, retry after {secs}s"),
                None => write!(f, "provider rate limited"),
            },
            Self::InvalidConfig { reason } => write!(f, "invalid completion config: {reason}"),
        }
    }
}

impl std::error::Error for AiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_entitled_display_names_tenant() {
        let tenant_id = TenantId::new();
        let err = AiError::NotEntitled { tenant_id };
        assert!(err.to_string().contains(&tenant_id.to_string()));
    }

    #[test]
    fn request_failed_display() {
        let err = AiError::RequestFailed {
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("connection refused"));
    }
}
