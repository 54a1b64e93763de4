//! User registration and profile endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::UserId;
use domain::access::{Access, is_self_or_staff, is_user_or_read_only};
use domain::{User, UserInput, UserPatch, WishlistItem};
use serde::Serialize;
use store::{CartScope, ShopStore};

use super::carts::CartResponse;
use super::{SuccessResponse, success};
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::AppState;

// -- Response types --

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_staff: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            is_staff: user.is_staff,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// Registration response; the only place the token is ever returned.
#[derive(Debug, Serialize)]
pub struct RegisteredUserResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub api_token: String,
}

// -- Handlers --

/// POST /users: register a new user.
#[tracing::instrument(skip(state, input), fields(username = %input.username))]
pub async fn register<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(input): JsonBody<UserInput>,
) -> Result<(StatusCode, Json<RegisteredUserResponse>), ApiError> {
    let user = state.store.create_user(input.validate()?).await?;
    tracing::info!(user_id = %user.id, "user registered");

    let api_token = user.api_token.clone();
    Ok((
        StatusCode::CREATED,
        Json(RegisteredUserResponse {
            user: user.into(),
            api_token,
        }),
    ))
}

/// GET /users: list active users.
#[tracing::instrument(skip(state, _current))]
pub async fn list<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _current: CurrentUser,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.store.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// GET /users/:id
#[tracing::instrument(skip(state, _current))]
pub async fn get<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _current: CurrentUser,
    Path(id): Path<UserId>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = load_active(&state, id).await?;
    Ok(Json(user.into()))
}

/// PUT /users/:id: replace the caller's own profile.
#[tracing::instrument(skip(state, current, input))]
pub async fn replace<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<UserId>,
    JsonBody(input): JsonBody<UserInput>,
) -> Result<Json<UserResponse>, ApiError> {
    let patch = UserPatch {
        username: Some(input.username),
        first_name: Some(input.first_name),
        last_name: Some(input.last_name),
        email: Some(input.email),
        phone: Some(input.phone.unwrap_or_default()),
    };
    apply_patch(&state, &current, id, &patch).await
}

/// PATCH /users/:id: update fields of the caller's own profile.
#[tracing::instrument(skip(state, current, patch))]
pub async fn update<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<UserId>,
    JsonBody(patch): JsonBody<UserPatch>,
) -> Result<Json<UserResponse>, ApiError> {
    apply_patch(&state, &current, id, &patch).await
}

/// DELETE /users/:id: deactivate the caller's own account.
#[tracing::instrument(skip(state, current))]
pub async fn deactivate<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<UserId>,
) -> Result<Json<SuccessResponse>, ApiError> {
    load_active(&state, id).await?;
    if !is_user_or_read_only(&current.actor(), id, Access::Write) {
        return Err(ApiError::Forbidden);
    }

    if !state.store.deactivate_user(id).await? {
        return Err(user_not_found(id));
    }
    tracing::info!(user_id = %id, "user deactivated");
    Ok(success())
}

/// GET /users/:id/carts: every cart of a user, for that user or staff.
#[tracing::instrument(skip(state, current))]
pub async fn carts<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<UserId>,
) -> Result<Json<Vec<CartResponse>>, ApiError> {
    if !is_self_or_staff(&current.actor(), id) {
        return Err(ApiError::Forbidden);
    }
    let carts = state.store.list_carts(id, CartScope::All).await?;
    Ok(Json(carts.iter().map(CartResponse::from).collect()))
}

/// GET /users/:id/wishlist: a user's wishlist, for that user or staff.
#[tracing::instrument(skip(state, current))]
pub async fn wishlist<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<UserId>,
) -> Result<Json<Vec<WishlistItem>>, ApiError> {
    if !is_self_or_staff(&current.actor(), id) {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(state.store.list_wishlist(id).await?))
}

async fn apply_patch<S: ShopStore>(
    state: &AppState<S>,
    current: &CurrentUser,
    id: UserId,
    patch: &UserPatch,
) -> Result<Json<UserResponse>, ApiError> {
    load_active(state, id).await?;
    if !is_user_or_read_only(&current.actor(), id, Access::Write) {
        return Err(ApiError::Forbidden);
    }

    let user = state
        .store
        .update_user(id, patch)
        .await?
        .ok_or_else(|| user_not_found(id))?;
    Ok(Json(user.into()))
}

async fn load_active<S: ShopStore>(state: &AppState<S>, id: UserId) -> Result<User, ApiError> {
    state
        .store
        .get_user(id)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| user_not_found(id))
}

fn user_not_found(id: UserId) -> ApiError {
    ApiError::NotFound(format!("User {id} not found"))
}
