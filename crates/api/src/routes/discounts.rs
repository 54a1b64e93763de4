//! Discount endpoints. Reads are public; writes are staff-only.
//!
//! Discounts are shown on products and drive `/products/has_discount`;
//! cart line prices never change because of them.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{DiscountId, ProductId};
use domain::{Discount, DiscountInput, DiscountPatch};
use serde::Deserialize;
use store::ShopStore;

use super::{SuccessResponse, success};
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DiscountQuery {
    pub product: Option<ProductId>,
}

/// GET /products/discounts: every discount, optionally for one product.
#[tracing::instrument(skip(state))]
pub async fn list<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<DiscountQuery>,
) -> Result<Json<Vec<Discount>>, ApiError> {
    Ok(Json(state.store.list_discounts(query.product).await?))
}

/// POST /products/discounts
#[tracing::instrument(skip(state, current, input), fields(product_id = %input.product_id))]
pub async fn create<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    JsonBody(input): JsonBody<DiscountInput>,
) -> Result<(StatusCode, Json<Discount>), ApiError> {
    current.require_staff()?;
    let discount = state.store.create_discount(input.validate()?).await?;
    tracing::info!(
        discount_id = %discount.id,
        percentage = discount.percentage,
        finish_date = %discount.finish_date,
        "discount created"
    );
    Ok((StatusCode::CREATED, Json(discount)))
}

/// GET /products/discounts/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<DiscountId>,
) -> Result<Json<Discount>, ApiError> {
    let discount = state
        .store
        .get_discount(id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(discount))
}

/// PUT /products/discounts/:id
#[tracing::instrument(skip(state, current, input))]
pub async fn replace<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<DiscountId>,
    JsonBody(input): JsonBody<DiscountInput>,
) -> Result<Json<Discount>, ApiError> {
    apply_patch(&state, &current, id, &input.into()).await
}

/// PATCH /products/discounts/:id
#[tracing::instrument(skip(state, current, patch))]
pub async fn update<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<DiscountId>,
    JsonBody(patch): JsonBody<DiscountPatch>,
) -> Result<Json<Discount>, ApiError> {
    apply_patch(&state, &current, id, &patch).await
}

/// DELETE /products/discounts/:id
#[tracing::instrument(skip(state, current))]
pub async fn delete<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<DiscountId>,
) -> Result<Json<SuccessResponse>, ApiError> {
    current.require_staff()?;
    if !state.store.delete_discount(id).await? {
        return Err(not_found(id));
    }
    tracing::info!(discount_id = %id, "discount deleted");
    Ok(success())
}

async fn apply_patch<S: ShopStore>(
    state: &AppState<S>,
    current: &CurrentUser,
    id: DiscountId,
    patch: &DiscountPatch,
) -> Result<Json<Discount>, ApiError> {
    current.require_staff()?;
    let discount = state
        .store
        .update_discount(id, patch)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(discount))
}

fn not_found(id: DiscountId) -> ApiError {
    ApiError::NotFound(format!("Discount {id} not found"))
}
