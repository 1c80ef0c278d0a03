//! # API Error Mapping
//!
//! Converts crate errors into HTTP responses.
//!
//! ## Status Mapping
//! ```text
//! ValidationError / InsufficientStock / ForeignKey  → 400 Bad Request
//! GatewayRejected                                   → 400 (raw payload attached)
//! NotFound                                          → 404 Not Found
//! UniqueViolation                                   → 409 Conflict
//! GatewayUnavailable / TokenRequest / bad payload   → 502 Bad Gateway
//! everything else                                   → 500 Internal Server Error
//! ```
//!
//! Every error body is `{"error": "<message>"}`; gateway rejections also
//! carry `{"gateway": <raw daraja payload>}` so the operator can see
//! exactly what Safaricom said.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use dawa_db::DbError;
use dawa_mpesa::MpesaError;

/// Unified error type for route handlers.
#[derive(Debug)]
pub enum ApiError {
    Db(DbError),
    Mpesa(MpesaError),
}

/// Result type alias for route handlers.
pub type ApiResult<T> = Result<T, ApiError>;

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        ApiError::Db(err)
    }
}

impl From<MpesaError> for ApiError {
    fn from(err: MpesaError) -> Self {
        // Unwrap reconciliation storage failures so they map like any
        // other database error
        match err {
            MpesaError::Database(db) => ApiError::Db(db),
            other => ApiError::Mpesa(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Db(err) => {
                let status = match &err {
                    DbError::NotFound { .. } => StatusCode::NOT_FOUND,
                    DbError::InsufficientStock { .. }
                    | DbError::Validation(_)
                    | DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                    DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %err, "Database error");
                }
                (status, json!({ "error": err.to_string() }))
            }

            ApiError::Mpesa(err) => match &err {
                MpesaError::Validation(_) => {
                    (StatusCode::BAD_REQUEST, json!({ "error": err.to_string() }))
                }
                MpesaError::GatewayRejected { message, raw } => (
                    StatusCode::BAD_REQUEST,
                    json!({ "error": message, "gateway": raw }),
                ),
                MpesaError::GatewayUnavailable(_)
                | MpesaError::TokenRequest(_)
                | MpesaError::InvalidResponse(_) => {
                    (StatusCode::BAD_GATEWAY, json!({ "error": err.to_string() }))
                }
                MpesaError::Config(_) => {
                    error!(error = %err, "Gateway misconfigured");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({ "error": "Payment gateway is not configured" }),
                    )
                }
                MpesaError::Database(_) => {
                    // Handled by the From impl; kept for exhaustiveness
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({ "error": err.to_string() }),
                    )
                }
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_status_codes() {
        let cases = [
            (DbError::not_found("Sale", "abc"), StatusCode::NOT_FOUND),
            (
                DbError::duplicate("medicines.barcode", "123"),
                StatusCode::CONFLICT,
            ),
            (
                DbError::InsufficientStock {
                    name: "Paracetamol".into(),
                    available: 1,
                    requested: 5,
                },
                StatusCode::BAD_REQUEST,
            ),
            (DbError::PoolExhausted, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let response = ApiError::Db(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_gateway_unavailable_is_bad_gateway() {
        let response =
            ApiError::Mpesa(MpesaError::GatewayUnavailable("timeout".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
