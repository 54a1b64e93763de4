//! Wishlist entries.

use chrono::{DateTime, Utc};
use common::{ProductId, UserId, WishlistItemId};
use serde::{Deserialize, Serialize};

/// A product a user has saved for later. At most one per (user, product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WishlistItem {
    pub id: WishlistItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub created_at: DateTime<Utc>,
}

impl WishlistItem {
    pub fn new(user_id: UserId, product_id: ProductId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: WishlistItemId::new(),
            user_id,
            product_id,
            created_at,
        }
    }
}

/// Request to save a product to the caller's wishlist.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct NewWishlistItem {
    pub product_id: ProductId,
}
