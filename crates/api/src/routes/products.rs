//! Catalog endpoints. Reads are public; writes are staff-only.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use common::ProductId;
use domain::{Discount, Product, ProductFilter, ProductInput, ProductPatch, User};
use serde::Serialize;
use store::ShopStore;

use super::{SuccessResponse, success};
use crate::auth::{CurrentUser, MaybeUser};
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    #[serde(flatten)]
    pub product: Product,
    /// Whether the requesting user has this product on their wishlist.
    pub in_wishlist: bool,
    /// Discounts on this product that are active today.
    pub discounts: Vec<Discount>,
}

/// Viewer-dependent data attached to products in a response.
struct Annotations {
    wished: HashSet<ProductId>,
    discounts: HashMap<ProductId, Vec<Discount>>,
}

impl Annotations {
    async fn load<S: ShopStore>(
        state: &AppState<S>,
        viewer: Option<&User>,
    ) -> Result<Self, ApiError> {
        let wished = match viewer {
            Some(user) => state
                .store
                .list_wishlist(user.id)
                .await?
                .into_iter()
                .map(|item| item.product_id)
                .collect(),
            None => HashSet::new(),
        };

        let today = Utc::now().date_naive();
        let mut discounts: HashMap<ProductId, Vec<Discount>> = HashMap::new();
        for discount in state.store.list_discounts(None).await? {
            if discount.is_active_on(today) {
                discounts.entry(discount.product_id).or_default().push(discount);
            }
        }

        Ok(Self { wished, discounts })
    }

    fn respond(&mut self, product: Product) -> ProductResponse {
        ProductResponse {
            in_wishlist: self.wished.contains(&product.id),
            discounts: self.discounts.remove(&product.id).unwrap_or_default(),
            product,
        }
    }

    fn respond_all(mut self, products: Vec<Product>) -> Vec<ProductResponse> {
        products.into_iter().map(|p| self.respond(p)).collect()
    }
}

/// GET /products: list products matching the query filters.
#[tracing::instrument(skip(state, viewer))]
pub async fn list<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    MaybeUser(viewer): MaybeUser,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.store.list_products(&filter).await?;
    let annotations = Annotations::load(&state, viewer.as_ref()).await?;
    Ok(Json(annotations.respond_all(products)))
}

/// GET /products/has_discount: products with a discount active today.
#[tracing::instrument(skip(state, viewer))]
pub async fn discounted<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    MaybeUser(viewer): MaybeUser,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let today = Utc::now().date_naive();
    let products = state.store.list_discounted_products(today).await?;
    let annotations = Annotations::load(&state, viewer.as_ref()).await?;
    Ok(Json(annotations.respond_all(products)))
}

/// POST /products
#[tracing::instrument(skip(state, current, input), fields(sku = %input.sku))]
pub async fn create<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    JsonBody(input): JsonBody<ProductInput>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    current.require_staff()?;
    let product = state.store.create_product(input.validate()?).await?;
    tracing::info!(product_id = %product.id, "product created");

    Ok((
        StatusCode::CREATED,
        Json(ProductResponse {
            product,
            in_wishlist: false,
            discounts: Vec::new(),
        }),
    ))
}

/// GET /products/:id
#[tracing::instrument(skip(state, viewer))]
pub async fn get<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .store
        .get_product(id)
        .await?
        .ok_or_else(|| product_not_found(id))?;
    let mut annotations = Annotations::load(&state, viewer.as_ref()).await?;
    Ok(Json(annotations.respond(product)))
}

/// PUT /products/:id: replace every writable field.
#[tracing::instrument(skip(state, current, input))]
pub async fn replace<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<ProductId>,
    JsonBody(input): JsonBody<ProductInput>,
) -> Result<Json<ProductResponse>, ApiError> {
    apply_patch(&state, &current, id, &ProductPatch::from(input)).await
}

/// PATCH /products/:id
#[tracing::instrument(skip(state, current, patch))]
pub async fn update<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<ProductId>,
    JsonBody(patch): JsonBody<ProductPatch>,
) -> Result<Json<ProductResponse>, ApiError> {
    apply_patch(&state, &current, id, &patch).await
}

/// DELETE /products/:id
#[tracing::instrument(skip(state, current))]
pub async fn delete<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    Path(id): Path<ProductId>,
) -> Result<Json<SuccessResponse>, ApiError> {
    current.require_staff()?;
    if !state.store.delete_product(id).await? {
        return Err(product_not_found(id));
    }
    tracing::info!(product_id = %id, "product deleted");
    Ok(success())
}

async fn apply_patch<S: ShopStore>(
    state: &AppState<S>,
    current: &CurrentUser,
    id: ProductId,
    patch: &ProductPatch,
) -> Result<Json<ProductResponse>, ApiError> {
    current.require_staff()?;
    let product = state
        .store
        .update_product(id, patch)
        .await?
        .ok_or_else(|| product_not_found(id))?;
    let mut annotations = Annotations::load(state, Some(&current.0)).await?;
    Ok(Json(annotations.respond(product)))
}

pub(crate) fn product_not_found(id: ProductId) -> ApiError {
    ApiError::NotFound(format!("Product {id} not found"))
}
