//! # Gateway Configuration
//!
//! Daraja credentials and environment selection.
//!
//! ## Environment Variables
//! ```text
//! MPESA_CONSUMER_KEY     OAuth consumer key (required)
//! MPESA_CONSUMER_SECRET  OAuth consumer secret (required)
//! MPESA_SHORTCODE        Business shortcode (default: 174379, the sandbox code)
//! MPESA_PASSKEY          STK push passkey (required)
//! MPESA_CALLBACK_URL     Public URL Safaricom posts results to (required)
//! MPESA_ENVIRONMENT      "sandbox" (default) or "production"
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};

use crate::error::{MpesaError, MpesaResult};

/// Sandbox business shortcode used when none is configured.
const SANDBOX_SHORTCODE: &str = "174379";

/// Which Daraja environment to hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    /// Base URL for this environment.
    pub fn base_url(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => "https://sandbox.safaricom.co.ke",
            MpesaEnvironment::Production => "https://api.safaricom.co.ke",
        }
    }
}

/// Daraja gateway configuration.
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
    pub environment: MpesaEnvironment,
}

impl MpesaConfig {
    /// Loads configuration from `MPESA_*` environment variables.
    ///
    /// ## Errors
    /// Returns [`MpesaError::Config`] when a required value is missing.
    pub fn from_env() -> MpesaResult<Self> {
        let required = |name: &str| -> MpesaResult<String> {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| MpesaError::Config(format!("{name} is not set")))
        };

        let environment = match std::env::var("MPESA_ENVIRONMENT").as_deref() {
            Ok("production") => MpesaEnvironment::Production,
            _ => MpesaEnvironment::Sandbox,
        };

        Ok(MpesaConfig {
            consumer_key: required("MPESA_CONSUMER_KEY")?,
            consumer_secret: required("MPESA_CONSUMER_SECRET")?,
            shortcode: std::env::var("MPESA_SHORTCODE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| SANDBOX_SHORTCODE.to_string()),
            passkey: required("MPESA_PASSKEY")?,
            callback_url: required("MPESA_CALLBACK_URL")?,
            environment,
        })
    }

    /// Base URL for the configured environment.
    pub fn base_url(&self) -> &'static str {
        self.environment.base_url()
    }

    /// Basic-auth credentials for the token endpoint:
    /// `base64(consumer_key:consumer_secret)`.
    pub fn basic_credentials(&self) -> String {
        BASE64.encode(format!("{}:{}", self.consumer_key, self.consumer_secret))
    }

    /// STK push password: `base64(shortcode + passkey + timestamp)`.
    ///
    /// The timestamp must be the same `YYYYMMDDHHMMSS` string sent in the
    /// request's `Timestamp` field.
    pub fn stk_password(&self, timestamp: &str) -> String {
        BASE64.encode(format!("{}{}{}", self.shortcode, self.passkey, timestamp))
    }

    /// Formats a timestamp the way Daraja expects: `YYYYMMDDHHMMSS`.
    pub fn format_timestamp(at: DateTime<Utc>) -> String {
        at.format("%Y%m%d%H%M%S").to_string()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> MpesaConfig {
        MpesaConfig {
            consumer_key: "key".into(),
            consumer_secret: "secret".into(),
            shortcode: "174379".into(),
            passkey: "pass".into(),
            callback_url: "https://example.com/api/mpesa/callback".into(),
            environment: MpesaEnvironment::Sandbox,
        }
    }

    #[test]
    fn test_base_urls() {
        assert_eq!(
            MpesaEnvironment::Sandbox.base_url(),
            "https://sandbox.safaricom.co.ke"
        );
        assert_eq!(
            MpesaEnvironment::Production.base_url(),
            "https://api.safaricom.co.ke"
        );
    }

    #[test]
    fn test_basic_credentials() {
        // base64("key:secret")
        assert_eq!(config().basic_credentials(), "a2V5OnNlY3JldA==");
    }

    #[test]
    fn test_stk_password_is_deterministic() {
        let ts = "20260825120000";
        let cfg = config();
        assert_eq!(cfg.stk_password(ts), cfg.stk_password(ts));
        // base64("174379" + "pass" + timestamp)
        let decoded = String::from_utf8(
            base64::engine::general_purpose::STANDARD
                .decode(cfg.stk_password(ts))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(decoded, "174379pass20260825120000");
    }

    #[test]
    fn test_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2026, 8, 25, 9, 5, 3).unwrap();
        assert_eq!(MpesaConfig::format_timestamp(at), "20260825090503");
    }
}
