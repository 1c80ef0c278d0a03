//! # M-Pesa Error Types
//!
//! Error types for gateway operations.
//!
//! ## The Rejected / Unavailable Split
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Two very different failure modes                       │
//! │                                                                         │
//! │  GatewayRejected                     GatewayUnavailable                 │
//! │  ───────────────                     ──────────────────                 │
//! │  The gateway answered and said NO.   We never got a usable answer.      │
//! │  Bad shortcode, invalid phone,       Timeout, DNS failure, 5xx,         │
//! │  malformed request.                  connection reset.                  │
//! │                                                                         │
//! │  NOT retryable - the same request    Retryable - the same request       │
//! │  will be rejected again. Surface     may succeed in a moment.           │
//! │  the raw payload to the operator.    HTTP 502 to the caller.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for gateway operations.
pub type MpesaResult<T> = Result<T, MpesaError>;

/// M-Pesa gateway and reconciliation errors.
#[derive(Debug, Error)]
pub enum MpesaError {
    /// Gateway credentials or settings are missing/malformed.
    #[error("Invalid M-Pesa configuration: {0}")]
    Config(String),

    /// OAuth token request failed.
    #[error("Token request failed: {0}")]
    TokenRequest(String),

    /// The gateway answered with a business rejection (4xx or a
    /// non-zero ResponseCode). The raw payload is preserved so the
    /// operator can see exactly what Safaricom said.
    #[error("Gateway rejected request: {message}")]
    GatewayRejected {
        message: String,
        raw: serde_json::Value,
    },

    /// Transport failure or gateway-side error (timeout, 5xx).
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The gateway returned a payload we could not make sense of.
    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    /// Input validation failure (bad phone number, etc).
    #[error(transparent)]
    Validation(#[from] dawa_core::ValidationError),

    /// Database failure during reconciliation.
    #[error(transparent)]
    Database(#[from] dawa_db::DbError),
}

impl MpesaError {
    /// Returns true if this error is transient and the operation can be
    /// retried as-is.
    ///
    /// A rejected request is never retryable: the gateway understood it
    /// and said no.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MpesaError::GatewayUnavailable(_) | MpesaError::TokenRequest(_)
        )
    }
}

impl From<reqwest::Error> for MpesaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            MpesaError::GatewayUnavailable(err.to_string())
        } else if err.is_decode() {
            MpesaError::InvalidResponse(err.to_string())
        } else {
            MpesaError::GatewayUnavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(MpesaError::GatewayUnavailable("timeout".into()).is_retryable());
        assert!(MpesaError::TokenRequest("503".into()).is_retryable());

        assert!(!MpesaError::GatewayRejected {
            message: "Invalid ShortCode".into(),
            raw: serde_json::json!({"errorCode": "400.002.02"}),
        }
        .is_retryable());
        assert!(!MpesaError::Config("missing passkey".into()).is_retryable());
    }
}
