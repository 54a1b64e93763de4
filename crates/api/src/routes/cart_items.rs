//! Cart line item endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CartId, CartItemId, ProductId};
use domain::{CartItem, CartItemPatch, Money, NewCartItem};
use serde::Deserialize;
use store::ShopStore;

use super::{SuccessResponse, success};
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub color: String,
    pub size: u32,
    #[serde(default)]
    pub price_cents: Option<i64>,
}

/// POST /cart_item: add a line to one of the caller's open carts.
#[tracing::instrument(skip(state, current, req), fields(cart_id = %req.cart_id))]
pub async fn create<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    JsonBody(req): JsonBody<AddCartItemRequest>,
) -> Result<(StatusCode, Json<CartItem>), ApiError> {
    let line = NewCartItem {
        product_id: req.product_id,
        quantity: req.quantity,
        color: req.color,
        size: req.size,
        price: req.price_cents.map(Money::from_cents),
    };
    let item = state
        .lifecycle
        .add_item(&current.actor(), req.cart_id, line)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /cart_item/:id
#[tracing::instrument(skip(state, current))]
pub async fn get<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<CartItemId>,
) -> Result<Json<CartItem>, ApiError> {
    Ok(Json(state.lifecycle.get_item(&current.actor(), id).await?))
}

/// PUT /cart_item/:id: replace every field of a line.
#[tracing::instrument(skip(state, current, line))]
pub async fn replace<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<CartItemId>,
    JsonBody(line): JsonBody<NewCartItem>,
) -> Result<Json<CartItem>, ApiError> {
    let patch = CartItemPatch::from(line);
    let item = state
        .lifecycle
        .update_item(&current.actor(), id, &patch)
        .await?;
    Ok(Json(item))
}

/// PATCH /cart_item/:id: change some fields of a line.
#[tracing::instrument(skip(state, current, patch))]
pub async fn update<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<CartItemId>,
    JsonBody(patch): JsonBody<CartItemPatch>,
) -> Result<Json<CartItem>, ApiError> {
    let item = state
        .lifecycle
        .update_item(&current.actor(), id, &patch)
        .await?;
    Ok(Json(item))
}

/// DELETE /cart_item/:id
#[tracing::instrument(skip(state, current))]
pub async fn delete<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<CartItemId>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.lifecycle.remove_item(&current.actor(), id).await?;
    Ok(success())
}
