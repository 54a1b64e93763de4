//! Wishlist endpoints for the authenticated user.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use common::WishlistItemId;
use domain::access::is_owner;
use domain::{NewWishlistItem, WishlistItem};
use serde::Deserialize;
use store::ShopStore;

use super::{SuccessResponse, success};
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RemoveWishlistRequest {
    pub id: WishlistItemId,
}

/// GET /wishlist
#[tracing::instrument(skip(state, current))]
pub async fn list<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
) -> Result<Json<Vec<WishlistItem>>, ApiError> {
    Ok(Json(state.store.list_wishlist(current.0.id).await?))
}

/// POST /wishlist: add a product; adding it twice is a conflict.
#[tracing::instrument(skip(state, current))]
pub async fn add<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    JsonBody(req): JsonBody<NewWishlistItem>,
) -> Result<(StatusCode, Json<WishlistItem>), ApiError> {
    let item = WishlistItem::new(current.0.id, req.product_id, Utc::now());
    let item = state.store.add_wishlist_item(item).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// DELETE /wishlist: remove one of the caller's entries by id.
#[tracing::instrument(skip(state, current))]
pub async fn remove<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    JsonBody(req): JsonBody<RemoveWishlistRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let not_found = || ApiError::NotFound(format!("Wishlist item {} not found", req.id));

    let item = state
        .store
        .get_wishlist_item(req.id)
        .await?
        .ok_or_else(not_found)?;
    if !is_owner(&current.actor(), &item) {
        return Err(ApiError::Forbidden);
    }

    if !state.store.delete_wishlist_item(item.id).await? {
        return Err(not_found());
    }
    Ok(success())
}
