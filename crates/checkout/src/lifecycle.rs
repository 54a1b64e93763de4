//! Cart lifecycle manager.

use std::time::Instant;

use chrono::Utc;
use common::{CartId, CartItemId, ProductId};
use domain::access::{Access, Actor, is_owner_or_read_only_for_staff};
use domain::{Cart, CartDetails, CartError, CartItem, CartItemPatch, ErrorKind, NewCartItem, Product};
use store::{CheckoutUnit, ShopStore};

use crate::error::{CheckoutError, Result};
use crate::payment::PaymentGateway;

/// How a details update combines with the stored fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailsUpdate {
    /// Every field is replaced; absent fields are cleared.
    Replace(CartDetails),
    /// Only present fields are overwritten.
    Merge(CartDetails),
}

/// Validates and applies every cart mutation.
///
/// Each mutation runs in its own unit of work: the cart row is locked
/// first, ownership is checked, then product rows are locked in ascending
/// id order when stock moves. A failure anywhere drops the unit and leaves
/// both the cart and stock untouched.
pub struct CartLifecycle<S, P>
where
    S: ShopStore,
    P: PaymentGateway,
{
    store: S,
    payment: P,
}

impl<S, P> CartLifecycle<S, P>
where
    S: ShopStore,
    P: PaymentGateway,
{
    /// Creates a new lifecycle manager.
    pub fn new(store: S, payment: P) -> Self {
        Self { store, payment }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn payment(&self) -> &P {
        &self.payment
    }

    /// Loads a cart the actor may read.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, actor: &Actor, cart_id: CartId) -> Result<Cart> {
        let cart = self
            .store
            .get_cart(cart_id)
            .await?
            .ok_or(CheckoutError::CartNotFound(cart_id))?;
        authorize(actor, &cart, Access::Read)?;
        Ok(cart)
    }

    /// Loads a line item the actor may read.
    #[tracing::instrument(skip(self))]
    pub async fn get_item(&self, actor: &Actor, item_id: CartItemId) -> Result<CartItem> {
        let cart = self
            .store
            .find_cart_by_item(item_id)
            .await?
            .ok_or(CheckoutError::ItemNotFound(item_id))?;
        authorize(actor, &cart, Access::Read)?;
        cart.item(item_id)
            .cloned()
            .ok_or(CheckoutError::ItemNotFound(item_id))
    }

    /// Creates an open cart with its initial items.
    ///
    /// Every line is validated before anything is written; the header and
    /// all items are inserted in one unit.
    #[tracing::instrument(skip(self, details, lines), fields(lines = lines.len()))]
    pub async fn create_cart(
        &self,
        actor: &Actor,
        details: CartDetails,
        lines: Vec<NewCartItem>,
    ) -> Result<Cart> {
        details.validate().map_err(CartError::from)?;

        let mut unit = self.store.begin().await?;
        let ids: Vec<ProductId> = lines.iter().map(|line| line.product_id).collect();
        let products = unit.load_products(&ids).await?;

        let mut cart = Cart::open(actor.user_id, details, Utc::now());
        for line in &lines {
            let product = find_product(&products, line.product_id)?;
            cart.add_item(product, line)?;
        }

        unit.insert_cart(&cart).await?;
        unit.commit().await?;

        tracing::info!(cart_id = %cart.id(), items = cart.items().len(), "cart created");
        Ok(cart)
    }

    /// Adds a line to an open cart.
    #[tracing::instrument(skip(self, line))]
    pub async fn add_item(
        &self,
        actor: &Actor,
        cart_id: CartId,
        line: NewCartItem,
    ) -> Result<CartItem> {
        let mut unit = self.store.begin().await?;
        let mut cart = lock_writable(unit.as_mut(), actor, cart_id).await?;
        ensure_items_modifiable(&cart)?;

        let products = unit.load_products(&[line.product_id]).await?;
        let product = find_product(&products, line.product_id)?;
        let item = cart.add_item(product, &line)?.clone();

        unit.insert_item(&item).await?;
        unit.commit().await?;
        Ok(item)
    }

    /// Edits a line of an open cart, re-pricing it from the current product.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_item(
        &self,
        actor: &Actor,
        item_id: CartItemId,
        patch: &CartItemPatch,
    ) -> Result<CartItem> {
        let cart_id = self.cart_id_for_item(item_id).await?;

        let mut unit = self.store.begin().await?;
        let mut cart = lock_writable(unit.as_mut(), actor, cart_id).await?;
        ensure_items_modifiable(&cart)?;

        let current = cart
            .item(item_id)
            .ok_or(CheckoutError::ItemNotFound(item_id))?;
        let line = patch.apply(current);

        let products = unit.load_products(&[line.product_id]).await?;
        let product = find_product(&products, line.product_id)?;
        let item = cart.update_item(item_id, product, &line)?.clone();

        unit.update_item(&item).await?;
        unit.commit().await?;
        Ok(item)
    }

    /// Removes a line from an open cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, actor: &Actor, item_id: CartItemId) -> Result<CartItem> {
        let cart_id = self.cart_id_for_item(item_id).await?;

        let mut unit = self.store.begin().await?;
        let mut cart = lock_writable(unit.as_mut(), actor, cart_id).await?;
        let item = cart.remove_item(item_id).map_err(|err| match err {
            CartError::ItemNotFound(id) => CheckoutError::ItemNotFound(id),
            other => other.into(),
        })?;

        unit.delete_item(item.id).await?;
        unit.commit().await?;
        Ok(item)
    }

    /// Changes the fulfillment fields of an active cart.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_details(
        &self,
        actor: &Actor,
        cart_id: CartId,
        update: DetailsUpdate,
    ) -> Result<Cart> {
        let mut unit = self.store.begin().await?;
        let mut cart = lock_writable(unit.as_mut(), actor, cart_id).await?;

        let details = match update {
            DetailsUpdate::Replace(details) => details,
            DetailsUpdate::Merge(patch) => cart.header().details.merge(&patch),
        };
        cart.update_details(details)?;

        unit.save_cart_header(cart.header()).await?;
        unit.commit().await?;
        Ok(cart)
    }

    /// Places the order: reserves stock for every line and marks the cart
    /// submitted, all or nothing.
    #[tracing::instrument(skip(self))]
    pub async fn submit(&self, actor: &Actor, cart_id: CartId) -> Result<Cart> {
        let started = Instant::now();
        let result = self.try_submit(actor, cart_id).await;
        observe("submit", started, &result);

        if let Ok(cart) = &result {
            metrics::counter!("checkout_submitted_total").increment(1);
            tracing::info!(cart_id = %cart.id(), total = %cart.total(), "cart submitted");
        }
        result
    }

    async fn try_submit(&self, actor: &Actor, cart_id: CartId) -> Result<Cart> {
        let mut unit = self.store.begin().await?;
        let mut cart = lock_writable(unit.as_mut(), actor, cart_id).await?;
        cart.ensure_can_submit()?;

        let products = unit.lock_products(&cart.product_ids()).await?;
        let changes = cart.reserve_stock(&products)?;
        for change in &changes {
            unit.set_product_quantity(change.product_id, change.after)
                .await?;
        }
        cart.submit(Utc::now())?;

        unit.save_cart_header(cart.header()).await?;
        unit.commit().await?;
        Ok(cart)
    }

    /// Settles a submitted cart by capturing its total.
    ///
    /// A declined capture leaves the cart submitted. If the capture succeeds
    /// but the cart cannot be saved, the capture is refunded.
    #[tracing::instrument(skip(self, payment_token))]
    pub async fn finish(
        &self,
        actor: &Actor,
        cart_id: CartId,
        payment_token: Option<String>,
    ) -> Result<Cart> {
        let started = Instant::now();
        let result = self
            .try_finish(actor, cart_id, payment_token.as_deref())
            .await;
        observe("finish", started, &result);

        if let Ok(cart) = &result {
            metrics::counter!("checkout_finished_total").increment(1);
            tracing::info!(
                cart_id = %cart.id(),
                payment_reference = ?cart.header().payment_reference,
                "cart finished"
            );
        }
        result
    }

    async fn try_finish(
        &self,
        actor: &Actor,
        cart_id: CartId,
        payment_token: Option<&str>,
    ) -> Result<Cart> {
        let mut unit = self.store.begin().await?;
        let mut cart = lock_writable(unit.as_mut(), actor, cart_id).await?;
        cart.ensure_can_finish()?;

        let capture = self
            .payment
            .capture(cart.id(), cart.total(), payment_token)
            .await?;
        if !capture.approved {
            return Err(CheckoutError::PaymentDeclined);
        }
        cart.finish(Utc::now(), capture.reference.clone())?;

        let persisted = match unit.save_cart_header(cart.header()).await {
            Ok(()) => unit.commit().await,
            Err(err) => Err(err),
        };
        if let Err(err) = persisted {
            if let Some(reference) = &capture.reference
                && let Err(refund_err) = self.payment.refund(reference).await
            {
                tracing::error!(
                    %cart_id,
                    reference = %reference,
                    error = %refund_err,
                    "refund after failed finish did not go through"
                );
            }
            return Err(err.into());
        }
        Ok(cart)
    }

    /// Cancels an active cart, returning reserved stock if it was submitted.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, actor: &Actor, cart_id: CartId) -> Result<Cart> {
        let started = Instant::now();
        let result = self.try_cancel(actor, cart_id).await;
        observe("cancel", started, &result);

        if let Ok(cart) = &result {
            metrics::counter!("checkout_cancelled_total").increment(1);
            tracing::info!(cart_id = %cart.id(), "cart cancelled");
        }
        result
    }

    async fn try_cancel(&self, actor: &Actor, cart_id: CartId) -> Result<Cart> {
        let mut unit = self.store.begin().await?;
        let mut cart = lock_writable(unit.as_mut(), actor, cart_id).await?;
        if !cart.state().can_cancel() {
            return Err(CartError::AlreadyFinished {
                state: cart.state(),
            }
            .into());
        }

        if cart.state().holds_stock() {
            let products = unit.lock_products(&cart.product_ids()).await?;
            for change in cart.release_stock(&products) {
                unit.set_product_quantity(change.product_id, change.after)
                    .await?;
            }
        }
        cart.cancel(Utc::now())?;

        unit.save_cart_header(cart.header()).await?;
        unit.commit().await?;
        Ok(cart)
    }

    async fn cart_id_for_item(&self, item_id: CartItemId) -> Result<CartId> {
        self.store
            .find_cart_by_item(item_id)
            .await?
            .map(|cart| cart.id())
            .ok_or(CheckoutError::ItemNotFound(item_id))
    }
}

/// Locks a cart inside `unit` and checks the actor may change it.
async fn lock_writable(
    unit: &mut dyn CheckoutUnit,
    actor: &Actor,
    cart_id: CartId,
) -> Result<Cart> {
    let cart = unit
        .lock_cart(cart_id)
        .await?
        .ok_or(CheckoutError::CartNotFound(cart_id))?;
    authorize(actor, &cart, Access::Write)?;
    Ok(cart)
}

fn authorize(actor: &Actor, cart: &Cart, access: Access) -> Result<()> {
    if !is_owner_or_read_only_for_staff(actor, cart, access) {
        tracing::warn!(
            user_id = %actor.user_id,
            cart_id = %cart.id(),
            ?access,
            "cart access denied"
        );
        return Err(CheckoutError::Forbidden);
    }
    Ok(())
}

fn ensure_items_modifiable(cart: &Cart) -> std::result::Result<(), CartError> {
    if !cart.state().can_modify_items() {
        return Err(CartError::NotModifiable {
            state: cart.state(),
        });
    }
    Ok(())
}

fn find_product(
    products: &[Product],
    product_id: ProductId,
) -> std::result::Result<&Product, CartError> {
    products
        .iter()
        .find(|product| product.id == product_id)
        .ok_or(CartError::ProductNotFound(product_id))
}

/// Records duration and conflict metrics for a checkout transition.
fn observe<T>(operation: &'static str, started: Instant, result: &Result<T>) {
    metrics::histogram!("checkout_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());

    if let Err(err) = result {
        if err.kind() == Some(ErrorKind::Conflict) {
            metrics::counter!("checkout_conflicts_total", "operation" => operation).increment(1);
            tracing::warn!(operation, error = %err, retryable = err.is_retryable(), "checkout conflict");
        } else {
            tracing::debug!(operation, error = %err, "checkout rejected");
        }
    }
}
