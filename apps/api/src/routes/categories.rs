//! Category CRUD endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use dawa_core::Category;
use dawa_db::DbError;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    pub description: Option<String>,
}

/// `GET /api/categories` - all categories, alphabetical.
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.db.categories().list().await?))
}

/// `GET /api/categories/{id}`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Category>> {
    let category = state
        .db
        .categories()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| DbError::not_found("Category", &id))?;
    Ok(Json(category))
}

/// `POST /api/categories`
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CategoryInput>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let category = state
        .db
        .categories()
        .create(&input.name, input.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// `PUT /api/categories/{id}`
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<CategoryInput>,
) -> ApiResult<Json<Category>> {
    let category = state
        .db
        .categories()
        .update(&id, &input.name, input.description.as_deref())
        .await?;
    Ok(Json(category))
}

/// `DELETE /api/categories/{id}`
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.categories().delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
