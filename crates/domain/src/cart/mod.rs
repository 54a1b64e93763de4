//! Cart aggregate and related types.

mod aggregate;
mod state;

pub use aggregate::{
    Cart, CartDetails, CartHeader, CartItem, CartItemPatch, NewCartItem, PaymentMethod,
    StockChange,
};
pub use state::{CartState, UnknownCartState};

use common::{CartItemId, ProductId};
use thiserror::Error;

use crate::error::{ErrorKind, ValidationError};

/// Errors raised by cart rules and transitions.
#[derive(Debug, Error)]
pub enum CartError {
    /// The requested color or size is not offered for the product.
    #[error("Color or size not available for product {product_id}: color '{color}', size {size}")]
    VariantUnavailable {
        product_id: ProductId,
        color: String,
        size: u32,
    },

    /// A line item references a product that does not exist.
    #[error("Product does not exist: {0}")]
    ProductNotFound(ProductId),

    /// Line item quantity must be positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// A line price is negative or too large to store.
    #[error("Invalid price: {cents} cents ({reason})")]
    InvalidPrice { cents: i64, reason: &'static str },

    /// The cart has no items to check out.
    #[error("Cart has no items")]
    NoItems,

    /// The line item is not part of this cart.
    #[error("Cart item not found: {0}")]
    ItemNotFound(CartItemId),

    /// Submit attempted on a cart that already left the open state.
    #[error("Cart already submitted")]
    AlreadySubmitted,

    /// Transition attempted on a finished or cancelled cart.
    #[error("Cart already finished ({state})")]
    AlreadyFinished { state: CartState },

    /// Finish attempted before inventory was reserved.
    #[error("Cart not submitted")]
    NotSubmitted,

    /// Item change attempted after checkout started.
    #[error("Cart items cannot be modified in {state} state")]
    NotModifiable { state: CartState },

    /// Not enough stock to reserve the requested quantity.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A header field failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl CartError {
    /// Classifies the error for the HTTP boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CartError::VariantUnavailable { .. }
            | CartError::ProductNotFound(_)
            | CartError::InvalidQuantity { .. }
            | CartError::InvalidPrice { .. }
            | CartError::NoItems
            | CartError::Invalid(_) => ErrorKind::Validation,
            CartError::ItemNotFound(_) => ErrorKind::NotFound,
            CartError::AlreadySubmitted
            | CartError::AlreadyFinished { .. }
            | CartError::NotSubmitted
            | CartError::NotModifiable { .. }
            | CartError::InsufficientStock { .. } => ErrorKind::Conflict,
        }
    }
}
