//! Category endpoints. Reads are public; writes are staff-only.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::CategoryId;
use domain::{CatalogNamesInput, CatalogNamesPatch, Category};
use store::ShopStore;

use super::{SuccessResponse, success};
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::AppState;

/// GET /products/categories
#[tracing::instrument(skip(state))]
pub async fn list<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.store.list_categories().await?))
}

/// POST /products/categories
#[tracing::instrument(skip(state, current, input))]
pub async fn create<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    JsonBody(input): JsonBody<CatalogNamesInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    current.require_staff()?;
    let category = state.store.create_category(input.validate()?).await?;
    tracing::info!(category_id = %category.id, "category created");
    Ok((StatusCode::CREATED, Json(category)))
}

/// GET /products/categories/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<CategoryId>,
) -> Result<Json<Category>, ApiError> {
    let category = state
        .store
        .get_category(id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(category))
}

/// PUT /products/categories/:id
#[tracing::instrument(skip(state, current, input))]
pub async fn replace<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<CategoryId>,
    JsonBody(input): JsonBody<CatalogNamesInput>,
) -> Result<Json<Category>, ApiError> {
    apply_patch(&state, &current, id, &input.into()).await
}

/// PATCH /products/categories/:id
#[tracing::instrument(skip(state, current, patch))]
pub async fn update<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<CategoryId>,
    JsonBody(patch): JsonBody<CatalogNamesPatch>,
) -> Result<Json<Category>, ApiError> {
    apply_patch(&state, &current, id, &patch).await
}

/// DELETE /products/categories/:id: clears the category from its products.
#[tracing::instrument(skip(state, current))]
pub async fn delete<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<CategoryId>,
) -> Result<Json<SuccessResponse>, ApiError> {
    current.require_staff()?;
    if !state.store.delete_category(id).await? {
        return Err(not_found(id));
    }
    tracing::info!(category_id = %id, "category deleted");
    Ok(success())
}

async fn apply_patch<S: ShopStore>(
    state: &AppState<S>,
    current: &CurrentUser,
    id: CategoryId,
    patch: &CatalogNamesPatch,
) -> Result<Json<Category>, ApiError> {
    current.require_staff()?;
    let category = state
        .store
        .update_category(id, patch)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(category))
}

fn not_found(id: CategoryId) -> ApiError {
    ApiError::NotFound(format!("Category {id} not found"))
}
