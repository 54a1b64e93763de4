//! Bearer-token authentication extractors.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use domain::{Actor, User};
use store::ShopStore;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated, active user making the request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn actor(&self) -> Actor {
        Actor::from(&self.0)
    }

    /// Fails unless the user is staff.
    pub fn require_staff(&self) -> Result<(), ApiError> {
        if !self.0.is_staff {
            tracing::warn!(user_id = %self.0.id, "staff-only action denied");
            return Err(ApiError::Forbidden);
        }
        Ok(())
    }
}

impl<S> FromRequestParts<Arc<AppState<S>>> for CurrentUser
where
    S: ShopStore + Clone + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        authenticate(state, &token).await.map(CurrentUser)
    }
}

/// Like [`CurrentUser`], but anonymous requests are allowed.
///
/// A token that is present but invalid is still rejected.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl<S> FromRequestParts<Arc<AppState<S>>> for MaybeUser
where
    S: ShopStore + Clone + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            Some(token) => authenticate(state, &token).await.map(|user| MaybeUser(Some(user))),
            None => Ok(MaybeUser(None)),
        }
    }
}

async fn authenticate<S: ShopStore>(state: &AppState<S>, token: &str) -> Result<User, ApiError> {
    state
        .store
        .find_user_by_token(token)
        .await?
        .ok_or(ApiError::Unauthorized)
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}
