use async_trait::async_trait;
use chrono::NaiveDate;
use common::{
    BrandId, CartId, CartItemId, CategoryId, DiscountId, ProductId, SubCategoryId, UserId,
    WishlistItemId,
};
use domain::{
    Brand, Cart, CartHeader, CartItem, CatalogNames, CatalogNamesPatch, Category, Discount,
    DiscountPatch, Feedback, NewDiscount, NewProduct, NewSubCategory, NewUser, Product,
    ProductFilter, ProductPatch, SubCategory, SubCategoryPatch, User, UserPatch, WishlistItem,
};

use crate::Result;

/// Which of a user's carts to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartScope {
    /// Open and submitted carts.
    Active,
    /// Finished and cancelled carts.
    History,
    /// Every cart regardless of state.
    All,
}

impl CartScope {
    /// Returns true if `cart` belongs to this scope.
    pub fn includes(&self, cart: &Cart) -> bool {
        match self {
            CartScope::Active => cart.is_active(),
            CartScope::History => !cart.is_active(),
            CartScope::All => true,
        }
    }
}

/// Core trait for storefront persistence.
///
/// Plain reads and single-row writes go through this trait directly. Cart
/// mutations must go through a [`CheckoutUnit`] obtained from [`ShopStore::begin`]
/// so that row locks and stock changes commit together.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ShopStore: Send + Sync {
    /// Inserts a product.
    ///
    /// Fails with `Duplicate` on a taken sku and with `MissingReference` if
    /// a brand, category or sub-category reference does not exist.
    async fn create_product(&self, fields: NewProduct) -> Result<Product>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Lists products matching every present filter, oldest first.
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>>;

    /// Applies a partial update under the product's row lock.
    ///
    /// Returns None if the product does not exist.
    async fn update_product(&self, id: ProductId, patch: &ProductPatch)
    -> Result<Option<Product>>;

    /// Deletes a product and every cart line, wishlist entry and discount
    /// referencing it.
    async fn delete_product(&self, id: ProductId) -> Result<bool>;

    /// Lists products with a discount still active on `today`, oldest first.
    async fn list_discounted_products(&self, today: NaiveDate) -> Result<Vec<Product>>;

    async fn create_category(&self, names: CatalogNames) -> Result<Category>;

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>>;

    /// Lists categories ordered by name.
    async fn list_categories(&self) -> Result<Vec<Category>>;

    async fn update_category(
        &self,
        id: CategoryId,
        patch: &CatalogNamesPatch,
    ) -> Result<Option<Category>>;

    /// Deletes a category, unlinking it from sub-categories and products.
    async fn delete_category(&self, id: CategoryId) -> Result<bool>;

    /// Inserts a sub-category. Fails with `MissingReference` on an unknown
    /// linked category.
    async fn create_sub_category(&self, fields: NewSubCategory) -> Result<SubCategory>;

    async fn get_sub_category(&self, id: SubCategoryId) -> Result<Option<SubCategory>>;

    /// Lists sub-categories ordered by name.
    async fn list_sub_categories(&self) -> Result<Vec<SubCategory>>;

    async fn update_sub_category(
        &self,
        id: SubCategoryId,
        patch: &SubCategoryPatch,
    ) -> Result<Option<SubCategory>>;

    /// Deletes a sub-category and clears it from its products.
    async fn delete_sub_category(&self, id: SubCategoryId) -> Result<bool>;

    async fn create_brand(&self, names: CatalogNames) -> Result<Brand>;

    async fn get_brand(&self, id: BrandId) -> Result<Option<Brand>>;

    /// Lists brands ordered by name.
    async fn list_brands(&self) -> Result<Vec<Brand>>;

    async fn update_brand(&self, id: BrandId, patch: &CatalogNamesPatch)
    -> Result<Option<Brand>>;

    /// Deletes a brand and clears it from its products.
    async fn delete_brand(&self, id: BrandId) -> Result<bool>;

    /// Inserts a discount.
    ///
    /// Fails with `MissingReference` on an unknown product and with
    /// `Duplicate` if the same product, finish date and percentage exist.
    async fn create_discount(&self, fields: NewDiscount) -> Result<Discount>;

    async fn get_discount(&self, id: DiscountId) -> Result<Option<Discount>>;

    /// Lists discounts, optionally for one product, by finish date.
    async fn list_discounts(&self, product_id: Option<ProductId>) -> Result<Vec<Discount>>;

    async fn update_discount(
        &self,
        id: DiscountId,
        patch: &DiscountPatch,
    ) -> Result<Option<Discount>>;

    async fn delete_discount(&self, id: DiscountId) -> Result<bool>;

    /// Inserts a user. Fails with `Duplicate` on a taken username or phone.
    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Looks up an active user by API token.
    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>>;

    /// Lists active users, oldest first.
    async fn list_users(&self) -> Result<Vec<User>>;

    /// Applies a profile update. Returns None if the user does not exist.
    async fn update_user(&self, id: UserId, patch: &UserPatch) -> Result<Option<User>>;

    /// Marks a user inactive. Returns false if the user does not exist.
    async fn deactivate_user(&self, id: UserId) -> Result<bool>;

    /// Loads a cart with its items.
    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>>;

    /// Loads the cart containing a line item.
    async fn find_cart_by_item(&self, item_id: CartItemId) -> Result<Option<Cart>>;

    /// Lists a user's carts in scope, oldest first.
    async fn list_carts(&self, user_id: UserId, scope: CartScope) -> Result<Vec<Cart>>;

    /// Inserts a wishlist entry.
    ///
    /// Fails with `Duplicate` if the user already saved the product and with
    /// `MissingReference` if the product does not exist.
    async fn add_wishlist_item(&self, item: WishlistItem) -> Result<WishlistItem>;

    async fn get_wishlist_item(&self, id: WishlistItemId) -> Result<Option<WishlistItem>>;

    /// Lists a user's wishlist, oldest first.
    async fn list_wishlist(&self, user_id: UserId) -> Result<Vec<WishlistItem>>;

    async fn delete_wishlist_item(&self, id: WishlistItemId) -> Result<bool>;

    async fn create_feedback(&self, feedback: Feedback) -> Result<Feedback>;

    /// Lists feedback, newest first.
    async fn list_feedback(&self) -> Result<Vec<Feedback>>;

    /// Starts a transactional unit of work for cart mutations.
    async fn begin(&self) -> Result<Box<dyn CheckoutUnit>>;
}

/// A transaction over carts and product stock.
///
/// Locks taken through a unit are held until it is committed or dropped.
/// Dropping without [`CheckoutUnit::commit`] discards every change.
#[async_trait]
pub trait CheckoutUnit: Send {
    /// Locks a cart row and loads the cart with its items.
    async fn lock_cart(&mut self, id: CartId) -> Result<Option<Cart>>;

    /// Reads products without locking them. Missing ids are skipped.
    async fn load_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Locks product rows in ascending id order and loads them.
    ///
    /// Missing ids are skipped.
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>>;

    async fn set_product_quantity(&mut self, id: ProductId, quantity: u32) -> Result<()>;

    /// Inserts a new cart header and all of its items.
    async fn insert_cart(&mut self, cart: &Cart) -> Result<()>;

    /// Writes back the mutable header fields of a locked cart.
    async fn save_cart_header(&mut self, header: &CartHeader) -> Result<()>;

    async fn insert_item(&mut self, item: &CartItem) -> Result<()>;

    async fn update_item(&mut self, item: &CartItem) -> Result<()>;

    async fn delete_item(&mut self, id: CartItemId) -> Result<()>;

    /// Makes every change visible and releases the locks.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Sorts and dedups product ids into the row lock order.
pub fn lock_order(ids: &[ProductId]) -> Vec<ProductId> {
    let mut ordered = ids.to_vec();
    ordered.sort();
    ordered.dedup();
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_order_is_ascending_and_unique() {
        let a = ProductId::new();
        let b = ProductId::new();
        let ordered = lock_order(&[b, a, b]);
        assert_eq!(ordered.len(), 2);
        assert!(ordered[0] < ordered[1]);
    }
}
