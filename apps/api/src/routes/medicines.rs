//! Medicine catalog endpoints.
//!
//! `pos_search` is the hot path: the counter autocompletes against it on
//! every keystroke, so it only returns sellable rows (active, in stock).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use dawa_core::validation::validate_search_query;
use dawa_core::Medicine;
use dawa_db::repository::medicine::{NewMedicine, UpdateMedicine};
use dawa_db::DbError;

use crate::error::ApiResult;
use crate::state::AppState;

/// Result cap for counter autocomplete.
const POS_SEARCH_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub include_inactive: bool,
    pub category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    /// Signed delta, e.g. +200 for a delivery, -3 for breakage.
    pub quantity: i64,
}

/// `GET /api/medicines?include_inactive=true&category_id=`
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Medicine>>> {
    Ok(Json(
        state
            .db
            .medicines()
            .list(params.include_inactive, params.category_id.as_deref())
            .await?,
    ))
}

/// `GET /api/medicines/pos_search?q=para`
pub async fn pos_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<Medicine>>> {
    let query = validate_search_query(&params.q).map_err(DbError::Validation)?;
    Ok(Json(
        state
            .db
            .medicines()
            .pos_search(&query, POS_SEARCH_LIMIT)
            .await?,
    ))
}

/// `GET /api/medicines/low_stock` - active medicines at or below reorder level.
pub async fn low_stock(State(state): State<AppState>) -> ApiResult<Json<Vec<Medicine>>> {
    Ok(Json(state.db.medicines().low_stock().await?))
}

/// `GET /api/medicines/{id}`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Medicine>> {
    let medicine = state
        .db
        .medicines()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| DbError::not_found("Medicine", &id))?;
    Ok(Json(medicine))
}

/// `POST /api/medicines`
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<NewMedicine>,
) -> ApiResult<(StatusCode, Json<Medicine>)> {
    let medicine = state.db.medicines().create(input).await?;
    Ok((StatusCode::CREATED, Json(medicine)))
}

/// `PUT /api/medicines/{id}` - details only; stock moves through
/// `update_stock` or sales.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateMedicine>,
) -> ApiResult<Json<Medicine>> {
    Ok(Json(state.db.medicines().update(&id, input).await?))
}

/// `DELETE /api/medicines/{id}` - soft delete; sale history keeps its
/// snapshots.
pub async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.medicines().deactivate(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PATCH /api/medicines/{id}/update_stock` - manual stock adjustment
/// (delivery intake, stocktake correction). Negative deltas floor at zero.
pub async fn update_stock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<StockAdjustment>,
) -> ApiResult<Json<Medicine>> {
    Ok(Json(
        state.db.medicines().adjust_stock(&id, input.quantity).await?,
    ))
}
