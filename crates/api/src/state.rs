//! Shared application state.

use checkout::{CartLifecycle, InMemoryPaymentGateway};
use store::ShopStore;

/// Shared application state accessible from all handlers.
pub struct AppState<S: ShopStore> {
    pub store: S,
    pub lifecycle: CartLifecycle<S, InMemoryPaymentGateway>,
}

impl<S: ShopStore + Clone> AppState<S> {
    pub fn new(store: S, payment: InMemoryPaymentGateway) -> Self {
        Self {
            lifecycle: CartLifecycle::new(store.clone(), payment),
            store,
        }
    }
}
