use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use common::{
    BrandId, CartId, CartItemId, CategoryId, DiscountId, ProductId, SubCategoryId, UserId,
    WishlistItemId,
};
use domain::{
    Brand, Cart, CartHeader, CartItem, CatalogNames, CatalogNamesPatch, Category, Discount,
    DiscountPatch, Feedback, NewDiscount, NewProduct, NewSubCategory, NewUser, Product,
    ProductFilter, ProductPatch, SubCategory, SubCategoryPatch, User, UserPatch, WishlistItem,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::store::{CartScope, CheckoutUnit, ShopStore, lock_order};
use crate::{Result, StoreError};

/// Default bound on waiting for the store lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
struct State {
    users: Vec<User>,
    products: Vec<Product>,
    carts: Vec<CartHeader>,
    items: Vec<CartItem>,
    wishlist: Vec<WishlistItem>,
    feedback: Vec<Feedback>,
    categories: Vec<Category>,
    sub_categories: Vec<SubCategory>,
    brands: Vec<Brand>,
    discounts: Vec<Discount>,
}

impl State {
    fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    fn user(&self, id: UserId) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn cart(&self, id: CartId) -> Option<Cart> {
        let header = self.carts.iter().find(|c| c.id == id)?;
        let items = self
            .items
            .iter()
            .filter(|item| item.cart_id == id)
            .cloned()
            .collect();
        Some(Cart::from_parts(header.clone(), items))
    }

    fn check_sku(&self, sku: &str, except: Option<ProductId>) -> Result<()> {
        if self
            .products
            .iter()
            .any(|p| p.sku == sku && Some(p.id) != except)
        {
            return Err(StoreError::Duplicate { what: "sku" });
        }
        Ok(())
    }

    /// Mirrors the product foreign keys.
    fn check_product_refs(&self, fields: &NewProduct) -> Result<()> {
        if let Some(brand) = fields.brand
            && !self.brands.iter().any(|b| b.id == brand)
        {
            return Err(StoreError::MissingReference { what: "brand" });
        }
        if let Some(category) = fields.category
            && !self.categories.iter().any(|c| c.id == category)
        {
            return Err(StoreError::MissingReference { what: "category" });
        }
        if let Some(sub_category) = fields.sub_category
            && !self.sub_categories.iter().any(|s| s.id == sub_category)
        {
            return Err(StoreError::MissingReference {
                what: "sub category",
            });
        }
        Ok(())
    }

    fn check_category_links(&self, categories: &[CategoryId]) -> Result<()> {
        if categories
            .iter()
            .any(|id| !self.categories.iter().any(|c| c.id == *id))
        {
            return Err(StoreError::MissingReference { what: "category" });
        }
        Ok(())
    }

    fn check_discount(&self, fields: &NewDiscount, except: Option<DiscountId>) -> Result<()> {
        if self.product(fields.product_id).is_none() {
            return Err(StoreError::MissingReference { what: "product" });
        }
        if self
            .discounts
            .iter()
            .any(|d| Some(d.id) != except && d.fields() == *fields)
        {
            return Err(StoreError::Duplicate { what: "discount" });
        }
        Ok(())
    }

    fn check_user_unique(&self, user: &User) -> Result<()> {
        for other in self.users.iter().filter(|u| u.id != user.id) {
            if other.username == user.username {
                return Err(StoreError::Duplicate { what: "username" });
            }
            if user.phone.is_some() && other.phone == user.phone {
                return Err(StoreError::Duplicate { what: "phone" });
            }
            if other.api_token == user.api_token {
                return Err(StoreError::Duplicate { what: "api token" });
            }
        }
        Ok(())
    }

    fn check_item_refs(&self, item: &CartItem) -> Result<()> {
        if !self.carts.iter().any(|c| c.id == item.cart_id) {
            return Err(StoreError::MissingReference { what: "cart" });
        }
        if self.product(item.product_id).is_none() {
            return Err(StoreError::MissingReference { what: "product" });
        }
        Ok(())
    }
}

/// In-memory store for tests and database-less runs.
///
/// Units of work take an exclusive lock over the whole state and operate on
/// a private copy that replaces the shared state on commit. This serializes
/// checkouts the same way row locks do, only coarser.
#[derive(Clone)]
pub struct InMemoryShopStore {
    state: Arc<Mutex<State>>,
    lock_timeout: Duration,
}

impl Default for InMemoryShopStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryShopStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates an empty store with a custom bound on lock waits.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            lock_timeout,
        }
    }

    /// Inserts a user with staff rights.
    pub async fn create_staff_user(&self, mut user: NewUser) -> Result<User> {
        user.is_staff = true;
        self.create_user(user).await
    }

    /// Returns the number of stored carts.
    pub async fn cart_count(&self) -> usize {
        self.state.lock().await.carts.len()
    }
}

#[async_trait]
impl ShopStore for InMemoryShopStore {
    async fn create_product(&self, fields: NewProduct) -> Result<Product> {
        let mut state = self.state.lock().await;
        state.check_sku(&fields.sku, None)?;
        state.check_product_refs(&fields)?;
        let product = Product::new(ProductId::new(), fields, Utc::now());
        state.products.push(product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.lock().await.product(id).cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let state = self.state.lock().await;
        Ok(state
            .products
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Option<Product>> {
        let mut state = self.state.lock().await;
        let Some(current) = state.product(id) else {
            return Ok(None);
        };
        let fields = patch.apply(current)?;
        state.check_sku(&fields.sku, Some(id))?;
        state.check_product_refs(&fields)?;
        let updated = Product::new(id, fields, current.created_at);

        if let Some(slot) = state.products.iter_mut().find(|p| p.id == id) {
            *slot = updated.clone();
        }
        Ok(Some(updated))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.products.len();
        state.products.retain(|p| p.id != id);
        if state.products.len() == before {
            return Ok(false);
        }
        state.items.retain(|item| item.product_id != id);
        state.wishlist.retain(|entry| entry.product_id != id);
        state.discounts.retain(|discount| discount.product_id != id);
        Ok(true)
    }

    async fn list_discounted_products(&self, today: NaiveDate) -> Result<Vec<Product>> {
        let state = self.state.lock().await;
        Ok(state
            .products
            .iter()
            .filter(|p| {
                state
                    .discounts
                    .iter()
                    .any(|d| d.product_id == p.id && d.is_active_on(today))
            })
            .cloned()
            .collect())
    }

    async fn create_category(&self, names: CatalogNames) -> Result<Category> {
        let category = Category::new(CategoryId::new(), names);
        self.state.lock().await.categories.push(category.clone());
        Ok(category)
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        let state = self.state.lock().await;
        Ok(state.categories.iter().find(|c| c.id == id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut categories = self.state.lock().await.categories.clone();
        categories.sort_by(|a, b| (&a.names.name, a.id).cmp(&(&b.names.name, b.id)));
        Ok(categories)
    }

    async fn update_category(
        &self,
        id: CategoryId,
        patch: &CatalogNamesPatch,
    ) -> Result<Option<Category>> {
        let mut state = self.state.lock().await;
        let Some(slot) = state.categories.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        slot.names = patch.apply(&slot.names)?;
        Ok(Some(slot.clone()))
    }

    async fn delete_category(&self, id: CategoryId) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.categories.len();
        state.categories.retain(|c| c.id != id);
        if state.categories.len() == before {
            return Ok(false);
        }
        for sub_category in &mut state.sub_categories {
            sub_category.categories.retain(|linked| *linked != id);
        }
        for product in state.products.iter_mut().filter(|p| p.category == Some(id)) {
            product.category = None;
        }
        Ok(true)
    }

    async fn create_sub_category(&self, fields: NewSubCategory) -> Result<SubCategory> {
        let mut state = self.state.lock().await;
        state.check_category_links(&fields.categories)?;
        let sub_category = SubCategory::new(SubCategoryId::new(), fields);
        state.sub_categories.push(sub_category.clone());
        Ok(sub_category)
    }

    async fn get_sub_category(&self, id: SubCategoryId) -> Result<Option<SubCategory>> {
        let state = self.state.lock().await;
        Ok(state.sub_categories.iter().find(|s| s.id == id).cloned())
    }

    async fn list_sub_categories(&self) -> Result<Vec<SubCategory>> {
        let mut sub_categories = self.state.lock().await.sub_categories.clone();
        sub_categories.sort_by(|a, b| (&a.names.name, a.id).cmp(&(&b.names.name, b.id)));
        Ok(sub_categories)
    }

    async fn update_sub_category(
        &self,
        id: SubCategoryId,
        patch: &SubCategoryPatch,
    ) -> Result<Option<SubCategory>> {
        let mut state = self.state.lock().await;
        let Some(current) = state.sub_categories.iter().find(|s| s.id == id) else {
            return Ok(None);
        };
        let fields = patch.apply(current)?;
        state.check_category_links(&fields.categories)?;

        let updated = SubCategory::new(id, fields);
        if let Some(slot) = state.sub_categories.iter_mut().find(|s| s.id == id) {
            *slot = updated.clone();
        }
        Ok(Some(updated))
    }

    async fn delete_sub_category(&self, id: SubCategoryId) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.sub_categories.len();
        state.sub_categories.retain(|s| s.id != id);
        if state.sub_categories.len() == before {
            return Ok(false);
        }
        for product in state
            .products
            .iter_mut()
            .filter(|p| p.sub_category == Some(id))
        {
            product.sub_category = None;
        }
        Ok(true)
    }

    async fn create_brand(&self, names: CatalogNames) -> Result<Brand> {
        let brand = Brand::new(BrandId::new(), names);
        self.state.lock().await.brands.push(brand.clone());
        Ok(brand)
    }

    async fn get_brand(&self, id: BrandId) -> Result<Option<Brand>> {
        let state = self.state.lock().await;
        Ok(state.brands.iter().find(|b| b.id == id).cloned())
    }

    async fn list_brands(&self) -> Result<Vec<Brand>> {
        let mut brands = self.state.lock().await.brands.clone();
        brands.sort_by(|a, b| (&a.names.name, a.id).cmp(&(&b.names.name, b.id)));
        Ok(brands)
    }

    async fn update_brand(
        &self,
        id: BrandId,
        patch: &CatalogNamesPatch,
    ) -> Result<Option<Brand>> {
        let mut state = self.state.lock().await;
        let Some(slot) = state.brands.iter_mut().find(|b| b.id == id) else {
            return Ok(None);
        };
        slot.names = patch.apply(&slot.names)?;
        Ok(Some(slot.clone()))
    }

    async fn delete_brand(&self, id: BrandId) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.brands.len();
        state.brands.retain(|b| b.id != id);
        if state.brands.len() == before {
            return Ok(false);
        }
        for product in state.products.iter_mut().filter(|p| p.brand == Some(id)) {
            product.brand = None;
        }
        Ok(true)
    }

    async fn create_discount(&self, fields: NewDiscount) -> Result<Discount> {
        let mut state = self.state.lock().await;
        state.check_discount(&fields, None)?;
        let discount = Discount::new(DiscountId::new(), fields);
        state.discounts.push(discount.clone());
        Ok(discount)
    }

    async fn get_discount(&self, id: DiscountId) -> Result<Option<Discount>> {
        let state = self.state.lock().await;
        Ok(state.discounts.iter().find(|d| d.id == id).cloned())
    }

    async fn list_discounts(&self, product_id: Option<ProductId>) -> Result<Vec<Discount>> {
        let state = self.state.lock().await;
        let mut discounts: Vec<Discount> = state
            .discounts
            .iter()
            .filter(|d| product_id.is_none_or(|id| d.product_id == id))
            .cloned()
            .collect();
        discounts.sort_by_key(|d| (d.finish_date, d.id));
        Ok(discounts)
    }

    async fn update_discount(
        &self,
        id: DiscountId,
        patch: &DiscountPatch,
    ) -> Result<Option<Discount>> {
        let mut state = self.state.lock().await;
        let Some(current) = state.discounts.iter().find(|d| d.id == id) else {
            return Ok(None);
        };
        let fields = patch.apply(current)?;
        state.check_discount(&fields, Some(id))?;

        let updated = Discount::new(id, fields);
        if let Some(slot) = state.discounts.iter_mut().find(|d| d.id == id) {
            *slot = updated.clone();
        }
        Ok(Some(updated))
    }

    async fn delete_discount(&self, id: DiscountId) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.discounts.len();
        state.discounts.retain(|d| d.id != id);
        Ok(state.discounts.len() != before)
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut state = self.state.lock().await;
        let user = User {
            id: UserId::new(),
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            is_staff: user.is_staff,
            is_active: true,
            api_token: user.api_token,
            created_at: Utc::now(),
        };
        state.check_user_unique(&user)?;
        state.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.lock().await.user(id).cloned())
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|u| u.is_active && u.api_token == token)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().filter(|u| u.is_active).cloned().collect())
    }

    async fn update_user(&self, id: UserId, patch: &UserPatch) -> Result<Option<User>> {
        let mut state = self.state.lock().await;
        let Some(current) = state.user(id) else {
            return Ok(None);
        };
        let updated = patch.apply(current)?;
        state.check_user_unique(&updated)?;

        if let Some(slot) = state.users.iter_mut().find(|u| u.id == id) {
            *slot = updated.clone();
        }
        Ok(Some(updated))
    }

    async fn deactivate_user(&self, id: UserId) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        Ok(self.state.lock().await.cart(id))
    }

    async fn find_cart_by_item(&self, item_id: CartItemId) -> Result<Option<Cart>> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .iter()
            .find(|item| item.id == item_id)
            .and_then(|item| state.cart(item.cart_id)))
    }

    async fn list_carts(&self, user_id: UserId, scope: CartScope) -> Result<Vec<Cart>> {
        let state = self.state.lock().await;
        Ok(state
            .carts
            .iter()
            .filter(|header| header.user_id == user_id)
            .filter_map(|header| state.cart(header.id))
            .filter(|cart| scope.includes(cart))
            .collect())
    }

    async fn add_wishlist_item(&self, item: WishlistItem) -> Result<WishlistItem> {
        let mut state = self.state.lock().await;
        if state.user(item.user_id).is_none() {
            return Err(StoreError::MissingReference { what: "user" });
        }
        if state.product(item.product_id).is_none() {
            return Err(StoreError::MissingReference { what: "product" });
        }
        if state
            .wishlist
            .iter()
            .any(|w| w.user_id == item.user_id && w.product_id == item.product_id)
        {
            return Err(StoreError::Duplicate {
                what: "wishlist item",
            });
        }
        state.wishlist.push(item.clone());
        Ok(item)
    }

    async fn get_wishlist_item(&self, id: WishlistItemId) -> Result<Option<WishlistItem>> {
        let state = self.state.lock().await;
        Ok(state.wishlist.iter().find(|w| w.id == id).cloned())
    }

    async fn list_wishlist(&self, user_id: UserId) -> Result<Vec<WishlistItem>> {
        let state = self.state.lock().await;
        Ok(state
            .wishlist
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_wishlist_item(&self, id: WishlistItemId) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.wishlist.len();
        state.wishlist.retain(|w| w.id != id);
        Ok(state.wishlist.len() != before)
    }

    async fn create_feedback(&self, feedback: Feedback) -> Result<Feedback> {
        self.state.lock().await.feedback.push(feedback.clone());
        Ok(feedback)
    }

    async fn list_feedback(&self) -> Result<Vec<Feedback>> {
        let state = self.state.lock().await;
        Ok(state.feedback.iter().rev().cloned().collect())
    }

    async fn begin(&self) -> Result<Box<dyn CheckoutUnit>> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout)?;
        let working = (*guard).clone();
        Ok(Box::new(InMemoryCheckoutUnit { guard, working }))
    }
}

/// Unit of work over a private copy of the state.
struct InMemoryCheckoutUnit {
    guard: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl CheckoutUnit for InMemoryCheckoutUnit {
    async fn lock_cart(&mut self, id: CartId) -> Result<Option<Cart>> {
        Ok(self.working.cart(id))
    }

    async fn load_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.product(*id).cloned())
            .collect())
    }

    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>> {
        Ok(lock_order(ids)
            .into_iter()
            .filter_map(|id| self.working.product(id).cloned())
            .collect())
    }

    async fn set_product_quantity(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        if let Some(product) = self.working.products.iter_mut().find(|p| p.id == id) {
            product.quantity = quantity;
        }
        Ok(())
    }

    async fn insert_cart(&mut self, cart: &Cart) -> Result<()> {
        if self.working.user(cart.user_id()).is_none() {
            return Err(StoreError::MissingReference { what: "user" });
        }
        self.working.carts.push(cart.header().clone());
        for item in cart.items() {
            self.working.check_item_refs(item)?;
            self.working.items.push(item.clone());
        }
        Ok(())
    }

    async fn save_cart_header(&mut self, header: &CartHeader) -> Result<()> {
        if let Some(slot) = self.working.carts.iter_mut().find(|c| c.id == header.id) {
            *slot = header.clone();
        }
        Ok(())
    }

    async fn insert_item(&mut self, item: &CartItem) -> Result<()> {
        self.working.check_item_refs(item)?;
        self.working.items.push(item.clone());
        Ok(())
    }

    async fn update_item(&mut self, item: &CartItem) -> Result<()> {
        self.working.check_item_refs(item)?;
        if let Some(slot) = self.working.items.iter_mut().find(|i| i.id == item.id) {
            *slot = item.clone();
        }
        Ok(())
    }

    async fn delete_item(&mut self, id: CartItemId) -> Result<()> {
        self.working.items.retain(|item| item.id != id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryCheckoutUnit { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
