//! Contact feedback endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use domain::{Feedback, FeedbackInput};
use store::ShopStore;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::AppState;

/// POST /feedback: anyone may leave feedback.
#[tracing::instrument(skip(state, input))]
pub async fn create<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(input): JsonBody<FeedbackInput>,
) -> Result<(StatusCode, Json<Feedback>), ApiError> {
    let feedback = Feedback::new(input.validate()?, Utc::now());
    let feedback = state.store.create_feedback(feedback).await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

/// GET /feedback: staff only, newest first.
#[tracing::instrument(skip(state, current))]
pub async fn list<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
) -> Result<Json<Vec<Feedback>>, ApiError> {
    current.require_staff()?;
    Ok(Json(state.store.list_feedback().await?))
}
