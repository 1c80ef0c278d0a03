//! M-Pesa payment endpoints.
//!
//! Two result paths converge on the reconciliation engine: Safaricom
//! pushes the callback here, and the counter polls `status` while the
//! customer has the STK prompt open.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, warn};

use dawa_core::MpesaTransaction;
use dawa_mpesa::CallbackEnvelope;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StkPushInput {
    pub sale_id: String,
    pub phone_number: String,
    /// Overrides the sale total when given (partial payment).
    pub amount_cents: Option<i64>,
}

/// `POST /api/mpesa/stk-push` - sends the payment prompt to the
/// customer's handset and records a pending transaction.
pub async fn stk_push(
    State(state): State<AppState>,
    Json(input): Json<StkPushInput>,
) -> ApiResult<(StatusCode, Json<MpesaTransaction>)> {
    let txn = state
        .payments
        .initiate(&input.sale_id, &input.phone_number, input.amount_cents)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(txn)))
}

/// `GET /api/mpesa/status/{checkout_id}` - poll path. Queries the
/// gateway only while the transaction is still pending.
pub async fn status(
    State(state): State<AppState>,
    Path(checkout_id): Path<String>,
) -> ApiResult<Json<MpesaTransaction>> {
    Ok(Json(state.payments.poll(&checkout_id).await?))
}

/// `POST /api/mpesa/callback` - push path, called by Safaricom.
///
/// Always acks with `ResultCode: 0`. Safaricom retries unacked
/// callbacks, and a payload we cannot parse will not parse on retry
/// either; the poll path covers any result lost here.
pub async fn callback(State(state): State<AppState>, Json(payload): Json<Value>) -> Json<Value> {
    match serde_json::from_value::<CallbackEnvelope>(payload) {
        Ok(envelope) => {
            if let Err(e) = state.payments.handle_callback(&envelope).await {
                error!(error = %e, "Failed to apply payment callback");
            }
        }
        Err(e) => {
            warn!(error = %e, "Unparseable payment callback");
        }
    }

    Json(json!({ "ResultCode": 0, "ResultDesc": "Accepted" }))
}
