//! Cart endpoints, including the checkout transitions.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use checkout::DetailsUpdate;
use common::{CartId, UserId};
use domain::{Cart, CartDetails, CartItem, CartState, NewCartItem, PaymentMethod};
use serde::{Deserialize, Serialize};
use store::{CartScope, ShopStore};

use super::{SuccessResponse, success};
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateCartRequest {
    #[serde(flatten)]
    pub details: CartDetails,
    #[serde(default)]
    pub items: Vec<NewCartItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FinishRequest {
    #[serde(default)]
    pub payment_token: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub id: CartId,
    pub user_id: UserId,
    pub state: CartState,
    pub is_active: bool,
    pub address: Option<String>,
    pub zip_code: Option<u32>,
    pub country: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When the order was placed.
    pub date_added: Option<DateTime<Utc>>,
    /// When the order was settled or cancelled.
    pub date_finished: Option<DateTime<Utc>>,
    pub items: Vec<CartItem>,
    pub total_cents: i64,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        let header = cart.header();
        Self {
            id: header.id,
            user_id: header.user_id,
            state: header.state,
            is_active: cart.is_active(),
            address: header.details.address.clone(),
            zip_code: header.details.zip_code,
            country: header.details.country.clone(),
            payment_method: header.details.payment_method,
            payment_reference: header.payment_reference.clone(),
            created_at: header.created_at,
            date_added: header.submitted_at,
            date_finished: header.finished_at,
            items: cart.items().to_vec(),
            total_cents: cart.total().cents(),
        }
    }
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        Self::from(&cart)
    }
}

// -- Handlers --

/// GET /carts: the caller's open and submitted carts.
#[tracing::instrument(skip(state, current))]
pub async fn list<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
) -> Result<Json<Vec<CartResponse>>, ApiError> {
    list_scope(&state, &current, CartScope::Active).await
}

/// GET /carts/history: the caller's finished and cancelled carts.
#[tracing::instrument(skip(state, current))]
pub async fn history<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
) -> Result<Json<Vec<CartResponse>>, ApiError> {
    list_scope(&state, &current, CartScope::History).await
}

/// POST /carts: create a cart, optionally with items.
#[tracing::instrument(skip(state, current, req), fields(items = req.items.len()))]
pub async fn create<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    JsonBody(req): JsonBody<CreateCartRequest>,
) -> Result<(StatusCode, Json<CartResponse>), ApiError> {
    let cart = state
        .lifecycle
        .create_cart(&current.actor(), req.details, req.items)
        .await?;
    Ok((StatusCode::CREATED, Json(cart.into())))
}

/// GET /carts/:id
#[tracing::instrument(skip(state, current))]
pub async fn get<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<CartId>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.lifecycle.get_cart(&current.actor(), id).await?;
    Ok(Json(cart.into()))
}

/// PUT /carts/:id: replace the fulfillment fields.
#[tracing::instrument(skip(state, current, details))]
pub async fn replace<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<CartId>,
    JsonBody(details): JsonBody<CartDetails>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .lifecycle
        .update_details(&current.actor(), id, DetailsUpdate::Replace(details))
        .await?;
    Ok(Json(cart.into()))
}

/// PATCH /carts/:id: update the given fulfillment fields.
#[tracing::instrument(skip(state, current, details))]
pub async fn update<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<CartId>,
    JsonBody(details): JsonBody<CartDetails>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .lifecycle
        .update_details(&current.actor(), id, DetailsUpdate::Merge(details))
        .await?;
    Ok(Json(cart.into()))
}

/// DELETE /carts/:id: cancel the cart.
#[tracing::instrument(skip(state, current))]
pub async fn cancel<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<CartId>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.lifecycle.cancel(&current.actor(), id).await?;
    Ok(success())
}

/// GET /carts/:id/finish: submit the order and reserve stock.
#[tracing::instrument(skip(state, current))]
pub async fn submit<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<CartId>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.lifecycle.submit(&current.actor(), id).await?;
    Ok(Json(cart.into()))
}

/// POST /carts/:id/finish: capture payment and settle the order.
///
/// The body is optional; `{"payment_token": "..."}` is passed to the gateway.
#[tracing::instrument(skip(state, current, body))]
pub async fn finish<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<CartId>,
    body: Bytes,
) -> Result<Json<CartResponse>, ApiError> {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        FinishRequest::default()
    } else {
        serde_json::from_slice::<FinishRequest>(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid finish request: {e}")))?
    };

    let cart = state
        .lifecycle
        .finish(&current.actor(), id, req.payment_token)
        .await?;
    Ok(Json(cart.into()))
}

async fn list_scope<S: ShopStore>(
    state: &AppState<S>,
    current: &CurrentUser,
    scope: CartScope,
) -> Result<Json<Vec<CartResponse>>, ApiError> {
    let carts = state.store.list_carts(current.0.id, scope).await?;
    Ok(Json(carts.iter().map(CartResponse::from).collect()))
}
