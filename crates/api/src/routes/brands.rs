//! Brand endpoints. Reads are public; writes are staff-only.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::BrandId;
use domain::{Brand, CatalogNamesInput, CatalogNamesPatch};
use store::ShopStore;

use super::{SuccessResponse, success};
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::AppState;

/// GET /products/brands
#[tracing::instrument(skip(state))]
pub async fn list<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Brand>>, ApiError> {
    Ok(Json(state.store.list_brands().await?))
}

/// POST /products/brands
#[tracing::instrument(skip(state, current, input))]
pub async fn create<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    JsonBody(input): JsonBody<CatalogNamesInput>,
) -> Result<(StatusCode, Json<Brand>), ApiError> {
    current.require_staff()?;
    let brand = state.store.create_brand(input.validate()?).await?;
    tracing::info!(brand_id = %brand.id, "brand created");
    Ok((StatusCode::CREATED, Json(brand)))
}

/// GET /products/brands/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<BrandId>,
) -> Result<Json<Brand>, ApiError> {
    let brand = state
        .store
        .get_brand(id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(brand))
}

/// PUT /products/brands/:id
#[tracing::instrument(skip(state, current, input))]
pub async fn replace<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<BrandId>,
    JsonBody(input): JsonBody<CatalogNamesInput>,
) -> Result<Json<Brand>, ApiError> {
    apply_patch(&state, &current, id, &input.into()).await
}

/// PATCH /products/brands/:id
#[tracing::instrument(skip(state, current, patch))]
pub async fn update<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<BrandId>,
    JsonBody(patch): JsonBody<CatalogNamesPatch>,
) -> Result<Json<Brand>, ApiError> {
    apply_patch(&state, &current, id, &patch).await
}

/// DELETE /products/brands/:id: clears the brand from its products.
#[tracing::instrument(skip(state, current))]
pub async fn delete<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<BrandId>,
) -> Result<Json<SuccessResponse>, ApiError> {
    current.require_staff()?;
    if !state.store.delete_brand(id).await? {
        return Err(not_found(id));
    }
    tracing::info!(brand_id = %id, "brand deleted");
    Ok(success())
}

async fn apply_patch<S: ShopStore>(
    state: &AppState<S>,
    current: &CurrentUser,
    id: BrandId,
    patch: &CatalogNamesPatch,
) -> Result<Json<Brand>, ApiError> {
    current.require_staff()?;
    let brand = state
        .store
        .update_brand(id, patch)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(brand))
}

fn not_found(id: BrandId) -> ApiError {
    ApiError::NotFound(format!("Brand {id} not found"))
}
