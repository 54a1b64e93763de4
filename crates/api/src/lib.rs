//! HTTP API server with observability for the storefront.
//!
//! Provides REST endpoints for the catalog and its taxonomy, discounts, users,
//! carts, wishlists and feedback, with bearer-token authentication,
//! structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::InMemoryPaymentGateway;
use metrics_exporter_prometheus::PrometheusHandle;
use store::ShopStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: ShopStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{
        brands, cart_items, carts, categories, discounts, feedback, products, sub_categories,
        users, wishlist,
    };

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/users", get(users::list::<S>).post(users::register::<S>))
        .route(
            "/users/{id}",
            get(users::get::<S>)
                .put(users::replace::<S>)
                .patch(users::update::<S>)
                .delete(users::deactivate::<S>),
        )
        .route("/users/{id}/carts", get(users::carts::<S>))
        .route("/users/{id}/wishlist", get(users::wishlist::<S>))
        .route(
            "/products",
            get(products::list::<S>).post(products::create::<S>),
        )
        .route("/products/has_discount", get(products::discounted::<S>))
        .route(
            "/products/categories",
            get(categories::list::<S>).post(categories::create::<S>),
        )
        .route(
            "/products/categories/{id}",
            get(categories::get::<S>)
                .put(categories::replace::<S>)
                .patch(categories::update::<S>)
                .delete(categories::delete::<S>),
        )
        .route(
            "/products/sub-categories",
            get(sub_categories::list::<S>).post(sub_categories::create::<S>),
        )
        .route(
            "/products/sub-categories/{id}",
            get(sub_categories::get::<S>)
                .put(sub_categories::replace::<S>)
                .patch(sub_categories::update::<S>)
                .delete(sub_categories::delete::<S>),
        )
        .route(
            "/products/brands",
            get(brands::list::<S>).post(brands::create::<S>),
        )
        .route(
            "/products/brands/{id}",
            get(brands::get::<S>)
                .put(brands::replace::<S>)
                .patch(brands::update::<S>)
                .delete(brands::delete::<S>),
        )
        .route(
            "/products/discounts",
            get(discounts::list::<S>).post(discounts::create::<S>),
        )
        .route(
            "/products/discounts/{id}",
            get(discounts::get::<S>)
                .put(discounts::replace::<S>)
                .patch(discounts::update::<S>)
                .delete(discounts::delete::<S>),
        )
        .route(
            "/products/{id}",
            get(products::get::<S>)
                .put(products::replace::<S>)
                .patch(products::update::<S>)
                .delete(products::delete::<S>),
        )
        .route("/carts", get(carts::list::<S>).post(carts::create::<S>))
        .route("/carts/history", get(carts::history::<S>))
        .route(
            "/carts/{id}",
            get(carts::get::<S>)
                .put(carts::replace::<S>)
                .patch(carts::update::<S>)
                .delete(carts::cancel::<S>),
        )
        .route(
            "/carts/{id}/finish",
            get(carts::submit::<S>).post(carts::finish::<S>),
        )
        .route("/cart_item", post(cart_items::create::<S>))
        .route(
            "/cart_item/{id}",
            get(cart_items::get::<S>)
                .put(cart_items::replace::<S>)
                .patch(cart_items::update::<S>)
                .delete(cart_items::delete::<S>),
        )
        .route(
            "/wishlist",
            get(wishlist::list::<S>)
                .post(wishlist::add::<S>)
                .delete(wishlist::remove::<S>),
        )
        .route(
            "/feedback",
            get(feedback::list::<S>).post(feedback::create::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state over `store` with the in-memory
/// payment gateway.
pub fn create_default_state<S: ShopStore + Clone + 'static>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState::new(store, InMemoryPaymentGateway::new()))
}
