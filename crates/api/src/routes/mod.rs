//! HTTP route handlers.

pub mod brands;
pub mod cart_items;
pub mod carts;
pub mod categories;
pub mod discounts;
pub mod feedback;
pub mod health;
pub mod metrics;
pub mod products;
pub mod sub_categories;
pub mod users;
pub mod wishlist;

use axum::Json;
use serde::Serialize;

/// Body returned by successful deletes.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

pub(crate) fn success() -> Json<SuccessResponse> {
    Json(SuccessResponse { success: true })
}
