//! # Phone Normalization
//!
//! Kenyan MSISDN normalization for the payment gateway.
//!
//! ## Accepted Input Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Input               Normalized                                         │
//! │  ──────────────────  ─────────────                                      │
//! │  0712345678          254712345678    local format with leading zero     │
//! │  +254712345678       254712345678    international with plus            │
//! │  254712345678        254712345678    already canonical                  │
//! │  712345678           254712345678    bare subscriber number (07x)       │
//! │  110123456           254110123456    bare subscriber number (01x)       │
//! │  "0712 345 678"      254712345678    whitespace and hyphens stripped    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The gateway requires exactly 12 digits starting with 254. Everything
//! else is rejected before a push is ever attempted, so a typo fails fast
//! at the counter rather than as a silent timeout.

use crate::error::ValidationError;

/// Canonical country prefix for Kenyan MSISDNs.
const COUNTRY_PREFIX: &str = "254";

/// Canonical MSISDN length (254 + 9 subscriber digits).
const CANONICAL_LEN: usize = 12;

/// Normalizes a Kenyan phone number to the gateway format `254XXXXXXXXX`.
///
/// ## Example
/// ```rust
/// use dawa_core::phone::normalize_phone;
///
/// assert_eq!(normalize_phone("0712345678").unwrap(), "254712345678");
/// assert_eq!(normalize_phone("+254 712 345 678").unwrap(), "254712345678");
/// assert!(normalize_phone("12345").is_err());
/// ```
pub fn normalize_phone(input: &str) -> Result<String, ValidationError> {
    // Strip formatting characters people actually type
    let digits: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-' | '(' | ')'))
        .collect();

    if digits.is_empty() {
        return Err(ValidationError::Required {
            field: "phone_number".to_string(),
        });
    }

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "phone_number".to_string(),
            reason: "must contain only digits".to_string(),
        });
    }

    let canonical = if let Some(rest) = digits.strip_prefix('0') {
        // Local format: 07XXXXXXXX / 01XXXXXXXX
        format!("{COUNTRY_PREFIX}{rest}")
    } else if digits.starts_with(COUNTRY_PREFIX) {
        digits
    } else if digits.starts_with('7') || digits.starts_with('1') {
        // Bare subscriber number without trunk prefix
        format!("{COUNTRY_PREFIX}{digits}")
    } else {
        return Err(ValidationError::InvalidFormat {
            field: "phone_number".to_string(),
            reason: "must be a Kenyan mobile number".to_string(),
        });
    };

    if canonical.len() != CANONICAL_LEN {
        return Err(ValidationError::InvalidFormat {
            field: "phone_number".to_string(),
            reason: format!("must be {CANONICAL_LEN} digits after normalization"),
        });
    }

    Ok(canonical)
}

// =============================================================================
// Unit Tests
// =============================================================================
