//! # Callback Payload Parsing
//!
//! Types for the asynchronous result Safaricom posts to our callback URL.
//!
//! ## Envelope Shape
//! ```text
//! {
//!   "Body": {
//!     "stkCallback": {
//!       "MerchantRequestID": "29115-34620561-1",
//!       "CheckoutRequestID": "ws_CO_191220191020363925",
//!       "ResultCode": 0,
//!       "ResultDesc": "The service request is processed successfully.",
//!       "CallbackMetadata": {              ← present only on success
//!         "Item": [
//!           { "Name": "Amount",             "Value": 105.0 },
//!           { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
//!           { "Name": "TransactionDate",    "Value": 20191219102115 },
//!           { "Name": "PhoneNumber",        "Value": 254708374149 }
//!         ]
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! The metadata items arrive in no guaranteed order and with mixed value
//! types, so extraction is by `Name`, tolerant of strings and numbers.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

/// Full callback envelope as posted by Safaricom.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata")]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<serde_json::Value>,
}

impl CallbackEnvelope {
    /// The inner callback, for convenience.
    pub fn callback(&self) -> &StkCallback {
        &self.body.stk_callback
    }
}

impl StkCallback {
    /// Whether the customer paid.
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    /// Looks up a metadata value by name, stringified.
    fn metadata_value(&self, name: &str) -> Option<String> {
        let items = &self.callback_metadata.as_ref()?.items;
        items
            .iter()
            .find(|item| item.name == name)
            .and_then(|item| item.value.as_ref())
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    /// The gateway receipt number (e.g. "NLJ7RT61SV"). Success only.
    pub fn receipt_number(&self) -> Option<String> {
        self.metadata_value("MpesaReceiptNumber")
    }

    /// Amount paid in whole shillings, as reported by the gateway.
    pub fn amount_shillings(&self) -> Option<i64> {
        self.metadata_value("Amount")
            .and_then(|s| s.parse::<f64>().ok())
            .map(|f| f as i64)
    }

    /// The paying phone number, as reported by the gateway.
    pub fn phone_number(&self) -> Option<String> {
        self.metadata_value("PhoneNumber")
    }

    /// Transaction timestamp, parsed from the `YYYYMMDDHHMMSS` value.
    pub fn transaction_date(&self) -> Option<DateTime<Utc>> {
        let raw = self.metadata_value("TransactionDate")?;
        NaiveDateTime::parse_from_str(&raw, "%Y%m%d%H%M%S")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const SUCCESS_CALLBACK: &str = r#"{
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        { "Name": "Amount", "Value": 105.00 },
                        { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                        { "Name": "TransactionDate", "Value": 20191219102115 },
                        { "Name": "PhoneNumber", "Value": 254708374149 }
                    ]
                }
            }
        }
    }"#;

    const CANCELLED_CALLBACK: &str = r#"{
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-2",
                "CheckoutRequestID": "ws_CO_191220191020363926",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }
        }
    }"#;

    #[test]
    fn test_success_callback_parsing() {
        let envelope: CallbackEnvelope = serde_json::from_str(SUCCESS_CALLBACK).unwrap();
        let cb = envelope.callback();

        assert!(cb.is_success());
        assert_eq!(cb.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(cb.receipt_number().as_deref(), Some("NLJ7RT61SV"));
        assert_eq!(cb.amount_shillings(), Some(105));
        assert_eq!(cb.phone_number().as_deref(), Some("254708374149"));

        let date = cb.transaction_date().unwrap();
        assert_eq!(date.year(), 2019);
        assert_eq!(date.month(), 12);
        assert_eq!(date.day(), 19);
    }

    #[test]
    fn test_cancelled_callback_parsing() {
        let envelope: CallbackEnvelope = serde_json::from_str(CANCELLED_CALLBACK).unwrap();
        let cb = envelope.callback();

        assert!(!cb.is_success());
        assert_eq!(cb.result_code, 1032);
        assert!(cb.receipt_number().is_none());
        assert!(cb.transaction_date().is_none());
    }

    #[test]
    fn test_metadata_order_does_not_matter() {
        // Same items, shuffled; receipt as the last entry
        let json = r#"{
            "Body": { "stkCallback": {
                "CheckoutRequestID": "ws_CO_1",
                "ResultCode": 0,
                "ResultDesc": "ok",
                "CallbackMetadata": { "Item": [
                    { "Name": "PhoneNumber", "Value": 254712345678 },
                    { "Name": "MpesaReceiptNumber", "Value": "SGH7TY12XX" }
                ]}
            }}
        }"#;

        let envelope: CallbackEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(
            envelope.callback().receipt_number().as_deref(),
            Some("SGH7TY12XX")
        );
    }
}
