//! # Daraja Gateway Client
//!
//! REST client for the Safaricom Daraja API. No vendor SDK; three
//! endpoints over plain HTTPS:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET  /oauth/v1/generate?grant_type=client_credentials   (10s timeout)  │
//! │       Basic auth → { access_token, expires_in }                         │
//! │                                                                         │
//! │  POST /mpesa/stkpush/v1/processrequest                   (30s timeout)  │
//! │       Bearer token → { ResponseCode, CheckoutRequestID, ... }           │
//! │                                                                         │
//! │  POST /mpesa/stkpushquery/v1/query                       (30s timeout)  │
//! │       Bearer token → { ResultCode, ResultDesc, ... }                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`PaymentGateway`] trait is the seam: the reconciliation engine
//! talks to the trait, so tests swap in a scripted fake and never touch
//! the network.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::MpesaConfig;
use crate::error::{MpesaError, MpesaResult};
use crate::token::{AccessToken, TokenCache, DEFAULT_TOKEN_LIFETIME_SECS};

/// Timeout for the OAuth token endpoint.
const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for push and query requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Gateway Seam
// =============================================================================

/// An STK push to initiate.
#[derive(Debug, Clone)]
pub struct PushRequest {
    /// Normalized MSISDN (254XXXXXXXXX).
    pub phone_number: String,
    /// Whole shillings, minimum 1.
    pub amount_shillings: i64,
    /// Shown on the customer's statement (we use the receipt number).
    pub account_reference: String,
    pub description: String,
}

/// Gateway acknowledgement of an accepted push.
#[derive(Debug, Clone)]
pub struct PushAck {
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub customer_message: Option<String>,
}

/// Result of a status query for a pending push.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Gateway result code as a string ("0" = paid). `None` while the
    /// push is still being processed on the handset.
    pub result_code: Option<String>,
    pub result_description: Option<String>,
}

/// The payment gateway seam.
///
/// Production uses [`DarajaClient`]; tests use a scripted fake.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initiates an STK push on the customer's handset.
    async fn stk_push(&self, request: &PushRequest) -> MpesaResult<PushAck>;

    /// Queries the outcome of a previously initiated push.
    async fn query_status(&self, checkout_request_id: &str) -> MpesaResult<QueryResult>;
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    expires_in: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushPayload<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    transaction_type: &'static str,
    amount: i64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    #[serde(rename = "ResponseCode", default, deserialize_with = "de_opt_string")]
    response_code: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: Option<String>,
    #[serde(rename = "CustomerMessage")]
    customer_message: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryPayload<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct StkQueryResponse {
    #[serde(rename = "ResultCode", default, deserialize_with = "de_opt_string")]
    result_code: Option<String>,
    #[serde(rename = "ResultDesc")]
    result_desc: Option<String>,
}

/// Daraja is inconsistent about number-vs-string fields ("0" one day,
/// 0 the next). Accept either and normalize to String.
fn de_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

// =============================================================================
// Client
// =============================================================================

/// Production Daraja client.
#[derive(Debug, Clone)]
pub struct DarajaClient {
    config: MpesaConfig,
    http: reqwest::Client,
    tokens: TokenCache,
}

impl DarajaClient {
    /// Creates a client for the configured environment.
    pub fn new(config: MpesaConfig) -> Self {
        DarajaClient {
            config,
            http: reqwest::Client::new(),
            tokens: TokenCache::new(),
        }
    }

    /// Gets a bearer token, from cache when fresh.
    async fn access_token(&self) -> MpesaResult<String> {
        if let Some(token) = self.tokens.fresh().await {
            debug!("Using cached gateway token");
            return Ok(token);
        }

        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url()
        );

        debug!("Requesting fresh gateway token");
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Basic {}", self.config.basic_credentials()))
            .header("Accept", "application/json")
            .header("Cache-Control", "no-cache")
            .timeout(TOKEN_TIMEOUT)
            .send()
            .await
            .map_err(|e| MpesaError::TokenRequest(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MpesaError::TokenRequest(format!("{status}: {body}")));
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| MpesaError::TokenRequest(e.to_string()))?;

        let lifetime = payload
            .expires_in
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

        let token = AccessToken::new(payload.access_token.clone(), lifetime);
        self.tokens.store(token).await;

        debug!(lifetime_secs = lifetime, "Fresh gateway token cached");
        Ok(payload.access_token)
    }

    /// Maps an HTTP-level failure response into Rejected vs Unavailable.
    async fn classify_http_failure(response: reqwest::Response) -> MpesaError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let raw: serde_json::Value =
            serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body.clone()));

        if status.is_client_error() {
            let message = raw
                .get("errorMessage")
                .and_then(|v| v.as_str())
                .unwrap_or("request rejected")
                .to_string();
            error!(status = %status, %message, "Gateway rejected request");
            MpesaError::GatewayRejected { message, raw }
        } else {
            warn!(status = %status, "Gateway unavailable");
            MpesaError::GatewayUnavailable(format!("{status}: {raw}"))
        }
    }
}

#[async_trait]
impl PaymentGateway for DarajaClient {
    async fn stk_push(&self, request: &PushRequest) -> MpesaResult<PushAck> {
        let token = self.access_token().await?;
        let timestamp = MpesaConfig::format_timestamp(Utc::now());

        let payload = StkPushPayload {
            business_short_code: &self.config.shortcode,
            password: self.config.stk_password(&timestamp),
            timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount: request.amount_shillings,
            party_a: &request.phone_number,
            party_b: &self.config.shortcode,
            phone_number: &request.phone_number,
            callback_url: &self.config.callback_url,
            account_reference: &request.account_reference,
            transaction_desc: &request.description,
        };

        debug!(
            phone = %request.phone_number,
            amount = request.amount_shillings,
            reference = %request.account_reference,
            "Sending STK push"
        );

        let response = self
            .http
            .post(format!("{}/mpesa/stkpush/v1/processrequest", self.config.base_url()))
            .bearer_auth(&token)
            .json(&payload)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::classify_http_failure(response).await);
        }

        let body: serde_json::Value = response.json().await?;
        let parsed: StkPushResponse = serde_json::from_value(body.clone())
            .map_err(|e| MpesaError::InvalidResponse(e.to_string()))?;

        // HTTP 200 with a non-zero ResponseCode is still a rejection
        if parsed.response_code.as_deref() != Some("0") {
            let message = parsed
                .error_message
                .unwrap_or_else(|| "STK push not accepted".to_string());
            return Err(MpesaError::GatewayRejected { message, raw: body });
        }

        let checkout_request_id = parsed.checkout_request_id.ok_or_else(|| {
            MpesaError::InvalidResponse("accepted push without CheckoutRequestID".to_string())
        })?;

        info!(checkout_id = %checkout_request_id, "STK push accepted");

        Ok(PushAck {
            checkout_request_id,
            merchant_request_id: parsed.merchant_request_id,
            customer_message: parsed.customer_message,
        })
    }

    async fn query_status(&self, checkout_request_id: &str) -> MpesaResult<QueryResult> {
        let token = self.access_token().await?;
        let timestamp = MpesaConfig::format_timestamp(Utc::now());

        let payload = StkQueryPayload {
            business_short_code: &self.config.shortcode,
            password: self.config.stk_password(&timestamp),
            timestamp,
            checkout_request_id,
        };

        debug!(checkout_id = %checkout_request_id, "Querying STK status");

        let response = self
            .http
            .post(format!("{}/mpesa/stkpushquery/v1/query", self.config.base_url()))
            .bearer_auth(&token)
            .json(&payload)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::classify_http_failure(response).await);
        }

        let parsed: StkQueryResponse = response
            .json()
            .await
            .map_err(|e| MpesaError::InvalidResponse(e.to_string()))?;

        Ok(QueryResult {
            result_code: parsed.result_code,
            result_description: parsed.result_desc,
        })
    }
}

/// Stand-in gateway for deployments without Daraja credentials.
///
/// Lets the rest of the API run (cash and card sales work fine); any
/// payment initiation comes back as a configuration error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn stk_push(&self, _request: &PushRequest) -> MpesaResult<PushAck> {
        Err(MpesaError::Config(
            "M-Pesa gateway is not configured".to_string(),
        ))
    }

    async fn query_status(&self, _checkout_request_id: &str) -> MpesaResult<QueryResult> {
        Err(MpesaError::Config(
            "M-Pesa gateway is not configured".to_string(),
        ))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_response_parsing() {
        let json = r#"{
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        }"#;

        let parsed: StkPushResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.response_code.as_deref(), Some("0"));
        assert_eq!(
            parsed.checkout_request_id.as_deref(),
            Some("ws_CO_191220191020363925")
        );
    }

    #[test]
    fn test_numeric_response_code_normalized() {
        // Daraja sometimes sends numbers where docs say strings
        let json = r#"{"ResponseCode": 0, "CheckoutRequestID": "ws_CO_1"}"#;
        let parsed: StkPushResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.response_code.as_deref(), Some("0"));
    }

    #[test]
    fn test_query_response_parsing() {
        let json = r#"{
            "ResponseCode": "0",
            "ResponseDescription": "The service request has been accepted successsfully",
            "MerchantRequestID": "22205-34066-1",
            "CheckoutRequestID": "ws_CO_13012021093521236557",
            "ResultCode": "1032",
            "ResultDesc": "Request cancelled by user"
        }"#;

        let parsed: StkQueryResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.result_code.as_deref(), Some("1032"));
        assert_eq!(parsed.result_desc.as_deref(), Some("Request cancelled by user"));
    }

    #[test]
    fn test_push_payload_field_names() {
        let payload = StkPushPayload {
            business_short_code: "174379",
            password: "cGFzcw==".into(),
            timestamp: "20260825120000".into(),
            transaction_type: "CustomerPayBillOnline",
            amount: 105,
            party_a: "254712345678",
            party_b: "174379",
            phone_number: "254712345678",
            callback_url: "https://example.com/api/mpesa/callback",
            account_reference: "RX-2608251200-AB12",
            transaction_desc: "Pharmacy payment RX-2608251200-AB12",
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["BusinessShortCode"], "174379");
        assert_eq!(json["TransactionType"], "CustomerPayBillOnline");
        assert_eq!(json["Amount"], 105);
        assert_eq!(json["CallBackURL"], "https://example.com/api/mpesa/callback");
        assert_eq!(json["PhoneNumber"], "254712345678");
        assert_eq!(json["AccountReference"], "RX-2608251200-AB12");
    }
}
