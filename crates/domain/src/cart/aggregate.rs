//! Cart aggregate implementation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, check_length};
use crate::money::Money;
use crate::product::Product;

use super::{CartError, CartState};

const COUNTRY_MAX: usize = 50;

/// How the customer intends to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Visa,
}

impl PaymentMethod {
    /// Returns the method name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Visa => "visa",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "visa" => Ok(PaymentMethod::Visa),
            other => Err(ValidationError::new(
                "payment_method",
                format!("unknown payment method '{other}'"),
            )),
        }
    }
}

/// Order-fulfillment fields of a cart. All optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartDetails {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub zip_code: Option<u32>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

impl CartDetails {
    /// Validates field lengths.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(country) = &self.country {
            check_length("country", country, Some(COUNTRY_MAX))?;
        }
        Ok(())
    }

    /// Overlays the present fields of `patch` onto these details.
    pub fn merge(&self, patch: &CartDetails) -> CartDetails {
        CartDetails {
            address: patch.address.clone().or_else(|| self.address.clone()),
            zip_code: patch.zip_code.or(self.zip_code),
            country: patch.country.clone().or_else(|| self.country.clone()),
            payment_method: patch.payment_method.or(self.payment_method),
        }
    }
}

/// A line item as requested by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewCartItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub color: String,
    pub size: u32,
    /// Explicit line price. When absent the price is computed from the product.
    #[serde(default, rename = "price_cents")]
    pub price: Option<Money>,
}

/// Partial line edit. Absent fields keep the item's current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CartItemPatch {
    pub product_id: Option<ProductId>,
    pub quantity: Option<u32>,
    pub color: Option<String>,
    pub size: Option<u32>,
}

impl CartItemPatch {
    /// Merges the patch onto `item`, producing the full requested line.
    pub fn apply(&self, item: &CartItem) -> NewCartItem {
        NewCartItem {
            product_id: self.product_id.unwrap_or(item.product_id),
            quantity: self.quantity.unwrap_or(item.quantity),
            color: self.color.clone().unwrap_or_else(|| item.color.clone()),
            size: self.size.unwrap_or(item.size),
            price: None,
        }
    }
}

impl From<NewCartItem> for CartItemPatch {
    fn from(line: NewCartItem) -> Self {
        Self {
            product_id: Some(line.product_id),
            quantity: Some(line.quantity),
            color: Some(line.color),
            size: Some(line.size),
        }
    }
}

/// One product line within a cart, with a frozen price snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub color: String,
    pub size: u32,
    /// Line price captured when the item was created or last edited.
    #[serde(rename = "price_cents")]
    pub price: Money,
}

impl CartItem {
    /// Validates `line` against `product` and builds a new item.
    ///
    /// The price is the caller's explicit price if given, otherwise
    /// `product.price * quantity` at this moment.
    pub fn new(cart_id: CartId, product: &Product, line: &NewCartItem) -> Result<Self, CartError> {
        check_line(product, line)?;

        let price = match line.price {
            Some(price) if price.is_negative() => {
                return Err(CartError::InvalidPrice {
                    cents: price.cents(),
                    reason: "must not be negative",
                });
            }
            Some(price) => price,
            None => line_price(product, line.quantity)?,
        };

        Ok(Self {
            id: CartItemId::new(),
            cart_id,
            product_id: product.id,
            quantity: line.quantity,
            color: line.color.clone(),
            size: line.size,
            price,
        })
    }

    /// Builds the edited version of this item.
    ///
    /// Edits always re-price the line from the product's current price.
    pub fn revise(&self, product: &Product, line: &NewCartItem) -> Result<Self, CartError> {
        check_line(product, line)?;

        Ok(Self {
            id: self.id,
            cart_id: self.cart_id,
            product_id: product.id,
            quantity: line.quantity,
            color: line.color.clone(),
            size: line.size,
            price: line_price(product, line.quantity)?,
        })
    }
}

fn line_price(product: &Product, quantity: u32) -> Result<Money, CartError> {
    product
        .price
        .checked_multiply(quantity)
        .ok_or(CartError::InvalidPrice {
            cents: product.price.cents(),
            reason: "line total is too large",
        })
}

fn check_line(product: &Product, line: &NewCartItem) -> Result<(), CartError> {
    if line.product_id != product.id {
        return Err(CartError::ProductNotFound(line.product_id));
    }
    if line.quantity == 0 {
        return Err(CartError::InvalidQuantity {
            quantity: line.quantity,
        });
    }
    if !product.has_color(&line.color) || !product.has_size(line.size) {
        return Err(CartError::VariantUnavailable {
            product_id: product.id,
            color: line.color.clone(),
            size: line.size,
        });
    }
    Ok(())
}

/// A planned stock level change for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub product_id: ProductId,
    pub before: u32,
    pub after: u32,
}

/// Persisted cart header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartHeader {
    pub id: CartId,
    pub user_id: UserId,
    pub state: CartState,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub details: CartDetails,
    pub payment_reference: Option<String>,
}

/// Cart aggregate root: header plus line items.
///
/// State only changes through the transition methods, each of which accepts
/// a fixed set of current states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    header: CartHeader,
    items: Vec<CartItem>,
}

// Query methods
impl Cart {
    /// Starts a new, empty open cart for `user_id`.
    pub fn open(user_id: UserId, details: CartDetails, now: DateTime<Utc>) -> Self {
        Self {
            header: CartHeader {
                id: CartId::new(),
                user_id,
                state: CartState::Open,
                created_at: now,
                submitted_at: None,
                finished_at: None,
                details,
                payment_reference: None,
            },
            items: Vec::new(),
        }
    }

    /// Rebuilds a cart from stored parts.
    pub fn from_parts(header: CartHeader, items: Vec<CartItem>) -> Self {
        Self { header, items }
    }

    pub fn id(&self) -> CartId {
        self.header.id
    }

    /// The owning user.
    pub fn user_id(&self) -> UserId {
        self.header.user_id
    }

    pub fn state(&self) -> CartState {
        self.header.state
    }

    pub fn header(&self) -> &CartHeader {
        &self.header
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Returns an item by ID.
    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Returns true while the cart is open or submitted.
    pub fn is_active(&self) -> bool {
        self.header.state.is_active()
    }

    /// Sum of every line's price snapshot.
    pub fn total(&self) -> Money {
        self.items.iter().map(|item| item.price).sum()
    }

    /// Distinct referenced products, ascending. This is the row lock order.
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = self.items.iter().map(|item| item.product_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Total requested quantity per product.
    fn requested(&self) -> BTreeMap<ProductId, u32> {
        let mut requested = BTreeMap::new();
        for item in &self.items {
            let total = requested.entry(item.product_id).or_insert(0u32);
            *total = total.saturating_add(item.quantity);
        }
        requested
    }
}

// Item and header mutation, open carts only
impl Cart {
    /// Adds a validated line for `product`.
    pub fn add_item(&mut self, product: &Product, line: &NewCartItem) -> Result<&CartItem, CartError> {
        self.ensure_items_modifiable()?;
        let item = CartItem::new(self.header.id, product, line)?;
        self.items.push(item);
        Ok(&self.items[self.items.len() - 1])
    }

    /// Replaces an existing line, re-validating and re-pricing it.
    pub fn update_item(
        &mut self,
        item_id: CartItemId,
        product: &Product,
        line: &NewCartItem,
    ) -> Result<&CartItem, CartError> {
        self.ensure_items_modifiable()?;
        let index = self.item_index(item_id)?;
        let revised = self.items[index].revise(product, line)?;
        self.items[index] = revised;
        Ok(&self.items[index])
    }

    /// Removes a line.
    pub fn remove_item(&mut self, item_id: CartItemId) -> Result<CartItem, CartError> {
        self.ensure_items_modifiable()?;
        let index = self.item_index(item_id)?;
        Ok(self.items.remove(index))
    }

    /// Replaces the fulfillment fields while the cart is active.
    pub fn update_details(&mut self, details: CartDetails) -> Result<(), CartError> {
        if !self.is_active() {
            return Err(CartError::AlreadyFinished {
                state: self.header.state,
            });
        }
        details.validate()?;
        self.header.details = details;
        Ok(())
    }

    fn ensure_items_modifiable(&self) -> Result<(), CartError> {
        if !self.header.state.can_modify_items() {
            return Err(CartError::NotModifiable {
                state: self.header.state,
            });
        }
        Ok(())
    }

    fn item_index(&self, item_id: CartItemId) -> Result<usize, CartError> {
        self.items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or(CartError::ItemNotFound(item_id))
    }
}

// Checkout transitions
impl Cart {
    /// Plans the stock decrement a submit needs, given the locked products.
    ///
    /// Fails without side effects if the cart cannot be submitted, a product
    /// is missing, or any product lacks stock. On success every returned
    /// change has `after <= before`.
    pub fn reserve_stock(&self, products: &[Product]) -> Result<Vec<StockChange>, CartError> {
        self.ensure_can_submit()?;

        let mut changes = Vec::new();
        for (product_id, requested) in self.requested() {
            let product = products
                .iter()
                .find(|p| p.id == product_id)
                .ok_or(CartError::ProductNotFound(product_id))?;

            let after = product.quantity.checked_sub(requested).ok_or(
                CartError::InsufficientStock {
                    product_id,
                    requested,
                    available: product.quantity,
                },
            )?;

            changes.push(StockChange {
                product_id,
                before: product.quantity,
                after,
            });
        }
        Ok(changes)
    }

    /// Plans the restock a cancel needs. Empty unless stock is reserved.
    ///
    /// Products that no longer exist are skipped.
    pub fn release_stock(&self, products: &[Product]) -> Vec<StockChange> {
        if !self.header.state.holds_stock() {
            return Vec::new();
        }

        self.requested()
            .into_iter()
            .filter_map(|(product_id, requested)| {
                products
                    .iter()
                    .find(|p| p.id == product_id)
                    .map(|product| StockChange {
                        product_id,
                        before: product.quantity,
                        after: product.quantity.saturating_add(requested),
                    })
            })
            .collect()
    }

    /// Checks the submit preconditions.
    pub fn ensure_can_submit(&self) -> Result<(), CartError> {
        match self.header.state {
            CartState::Open if self.items.is_empty() => Err(CartError::NoItems),
            CartState::Open => Ok(()),
            CartState::Submitted => Err(CartError::AlreadySubmitted),
            state => Err(CartError::AlreadyFinished { state }),
        }
    }

    /// Marks the order placed. Stock must already have been reserved.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<(), CartError> {
        self.ensure_can_submit()?;
        self.header.state = CartState::Submitted;
        self.header.submitted_at = Some(now);
        Ok(())
    }

    /// Checks the finish preconditions.
    pub fn ensure_can_finish(&self) -> Result<(), CartError> {
        match self.header.state {
            CartState::Submitted => Ok(()),
            CartState::Open => Err(CartError::NotSubmitted),
            state => Err(CartError::AlreadyFinished { state }),
        }
    }

    /// Marks the order settled.
    pub fn finish(
        &mut self,
        now: DateTime<Utc>,
        payment_reference: Option<String>,
    ) -> Result<(), CartError> {
        self.ensure_can_finish()?;
        self.header.state = CartState::Finished;
        self.header.finished_at = Some(now);
        self.header.payment_reference = payment_reference;
        Ok(())
    }

    /// Cancels an active cart, returning the state it was cancelled from.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<CartState, CartError> {
        let previous = self.header.state;
        if !previous.can_cancel() {
            return Err(CartError::AlreadyFinished { state: previous });
        }
        self.header.state = CartState::Cancelled;
        self.header.finished_at = Some(now);
        Ok(previous)
    }
}
