//! Cart checkout for the storefront.
//!
//! [`CartLifecycle`] owns every cart mutation. The consistency-critical ones
//! are:
//! 1. Submit: reserve stock for all lines and mark the cart submitted
//! 2. Finish: capture payment through a [`PaymentGateway`] and settle
//! 3. Cancel: close the cart, restocking if it was submitted
//!
//! Each runs in a single store unit of work with ascending product locks.

pub mod error;
pub mod lifecycle;
pub mod payment;

pub use error::{CheckoutError, Result, store_error_kind};
pub use lifecycle::{CartLifecycle, DetailsUpdate};
pub use payment::{InMemoryPaymentGateway, PaymentCapture, PaymentError, PaymentGateway};
