//! Persistence for the storefront.
//!
//! [`ShopStore`] is implemented by [`PostgresShopStore`] for production and
//! [`InMemoryShopStore`] for tests and database-less runs. Cart mutations go
//! through a [`CheckoutUnit`] so stock changes and cart state commit together.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryShopStore;
pub use postgres::PostgresShopStore;
pub use store::{CartScope, CheckoutUnit, ShopStore, lock_order};
