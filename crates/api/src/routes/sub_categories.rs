//! Sub-category endpoints. Reads are public; writes are staff-only.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::SubCategoryId;
use domain::{SubCategory, SubCategoryInput, SubCategoryPatch};
use store::ShopStore;

use super::{SuccessResponse, success};
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::AppState;

/// GET /products/sub-categories
#[tracing::instrument(skip(state))]
pub async fn list<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<SubCategory>>, ApiError> {
    Ok(Json(state.store.list_sub_categories().await?))
}

/// POST /products/sub-categories: every linked category must exist.
#[tracing::instrument(skip(state, current, input))]
pub async fn create<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    JsonBody(input): JsonBody<SubCategoryInput>,
) -> Result<(StatusCode, Json<SubCategory>), ApiError> {
    current.require_staff()?;
    let sub_category = state.store.create_sub_category(input.validate()?).await?;
    tracing::info!(
        sub_category_id = %sub_category.id,
        links = sub_category.categories.len(),
        "sub category created"
    );
    Ok((StatusCode::CREATED, Json(sub_category)))
}

/// GET /products/sub-categories/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<SubCategoryId>,
) -> Result<Json<SubCategory>, ApiError> {
    let sub_category = state
        .store
        .get_sub_category(id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(sub_category))
}

/// PUT /products/sub-categories/:id: replaces names and links.
#[tracing::instrument(skip(state, current, input))]
pub async fn replace<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<SubCategoryId>,
    JsonBody(input): JsonBody<SubCategoryInput>,
) -> Result<Json<SubCategory>, ApiError> {
    apply_patch(&state, &current, id, &input.into()).await
}

/// PATCH /products/sub-categories/:id
#[tracing::instrument(skip(state, current, patch))]
pub async fn update<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<SubCategoryId>,
    JsonBody(patch): JsonBody<SubCategoryPatch>,
) -> Result<Json<SubCategory>, ApiError> {
    apply_patch(&state, &current, id, &patch).await
}

/// DELETE /products/sub-categories/:id
#[tracing::instrument(skip(state, current))]
pub async fn delete<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<SubCategoryId>,
) -> Result<Json<SuccessResponse>, ApiError> {
    current.require_staff()?;
    if !state.store.delete_sub_category(id).await? {
        return Err(not_found(id));
    }
    tracing::info!(sub_category_id = %id, "sub category deleted");
    Ok(success())
}

async fn apply_patch<S: ShopStore>(
    state: &AppState<S>,
    current: &CurrentUser,
    id: SubCategoryId,
    patch: &SubCategoryPatch,
) -> Result<Json<SubCategory>, ApiError> {
    current.require_staff()?;
    let sub_category = state
        .store
        .update_sub_category(id, patch)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(sub_category))
}

fn not_found(id: SubCategoryId) -> ApiError {
    ApiError::NotFound(format!("Sub category {id} not found"))
}
