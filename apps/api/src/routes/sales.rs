//! Sales endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use dawa_core::{NewSale, Sale, SaleWithItems};
use dawa_db::repository::reports::DashboardStats;
use dawa_db::repository::sale::SaleFilter;
use dawa_db::DbError;

use crate::error::ApiResult;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// `GET /api/sales?date_from=&date_to=&payment_method=&status=&limit=&offset=`
/// - most recent first.
pub async fn list(
    State(state): State<AppState>,
    Query(mut filter): Query<SaleFilter>,
) -> ApiResult<Json<Vec<Sale>>> {
    filter.limit = Some(
        filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE),
    );
    Ok(Json(state.db.sales().list(&filter).await?))
}

/// `GET /api/sales/{id}` - sale header with its line items.
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SaleWithItems>> {
    let sale = state
        .db
        .sales()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| DbError::not_found("Sale", &id))?;
    Ok(Json(sale))
}

/// `POST /api/sales` - checkout.
///
/// Stock is decremented atomically with the sale; any short line rolls
/// the whole sale back. Cash/card sales come back completed, M-Pesa
/// sales come back pending and wait for payment.
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<NewSale>,
) -> ApiResult<(StatusCode, Json<SaleWithItems>)> {
    let sale = state.db.sales().create_sale(&input).await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

/// `POST /api/sales/{id}/cancel` - cancels a pending sale and restores
/// its stock. Completed or already-cancelled sales are not touched.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let cancelled = state.db.sales().cancel_pending(&id).await?;
    if cancelled {
        Ok((StatusCode::OK, Json(json!({ "cancelled": true }))))
    } else {
        // Exists but not pending, or unknown; distinguish for the caller
        match state.db.sales().get_by_id(&id).await? {
            Some(_) => Ok((
                StatusCode::CONFLICT,
                Json(json!({ "error": "Sale is not pending" })),
            )),
            None => Err(DbError::not_found("Sale", &id).into()),
        }
    }
}

/// `GET /api/sales/dashboard_stats` - today's trading snapshot.
pub async fn dashboard_stats(State(state): State<AppState>) -> ApiResult<Json<DashboardStats>> {
    Ok(Json(state.db.reports().dashboard_stats(Utc::now()).await?))
}
