//! Checkout error types.

use common::{CartId, CartItemId};
use domain::{CartError, ErrorKind};
use store::StoreError;
use thiserror::Error;

use crate::payment::PaymentError;

/// Errors that can occur while changing a cart.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A cart rule or transition rejected the request.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Cart not found.
    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    /// Cart item not found.
    #[error("Cart item not found: {0}")]
    ItemNotFound(CartItemId),

    /// The acting user may not perform this operation on the cart.
    #[error("You do not have permission to perform this action")]
    Forbidden,

    /// The gateway declined the capture.
    #[error("Payment declined")]
    PaymentDeclined,

    /// Payment gateway error.
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl CheckoutError {
    /// Returns the coarse kind for errors a caller can act on.
    ///
    /// None means the failure is internal, except for `Forbidden`, which
    /// callers must check for separately.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            CheckoutError::Cart(err) => Some(err.kind()),
            CheckoutError::Store(err) => store_error_kind(err),
            CheckoutError::CartNotFound(_) | CheckoutError::ItemNotFound(_) => {
                Some(ErrorKind::NotFound)
            }
            CheckoutError::PaymentDeclined => Some(ErrorKind::Conflict),
            CheckoutError::Forbidden | CheckoutError::Payment(_) => None,
        }
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckoutError::Store(err) if err.is_retryable())
    }
}

/// Classifies store errors that reflect a client-visible condition.
pub fn store_error_kind(err: &StoreError) -> Option<ErrorKind> {
    match err {
        StoreError::Duplicate { .. } | StoreError::LockTimeout | StoreError::Contention(_) => {
            Some(ErrorKind::Conflict)
        }
        StoreError::MissingReference { .. } | StoreError::Validation(_) => {
            Some(ErrorKind::Validation)
        }
        StoreError::Corrupt(_) | StoreError::Database(_) | StoreError::Migration(_) => None,
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
