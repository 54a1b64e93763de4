//! Domain layer for the storefront.
//!
//! This crate holds the rules that do not depend on storage or transport:
//! - Catalog products with validated string sets and money amounts
//! - The catalog taxonomy (categories, sub-categories, brands) and discounts
//! - The cart aggregate and its checkout state machine
//! - Users, wishlist entries and feedback
//! - Access policies deciding who may read or change a resource

pub mod access;
pub mod cart;
pub mod catalog;
pub mod discount;
pub mod error;
pub mod feedback;
pub mod money;
pub mod product;
pub mod string_set;
pub mod user;
pub mod wishlist;

pub use access::{Access, Actor, Owned};
pub use cart::{
    Cart, CartDetails, CartError, CartHeader, CartItem, CartItemPatch, CartState, NewCartItem,
    PaymentMethod, StockChange,
};
pub use catalog::{
    Brand, CatalogNames, CatalogNamesInput, CatalogNamesPatch, Category, NewSubCategory,
    SubCategory, SubCategoryInput, SubCategoryPatch,
};
pub use discount::{Discount, DiscountInput, DiscountPatch, NewDiscount};
pub use error::{ErrorKind, ValidationError};
pub use feedback::{Feedback, FeedbackInput};
pub use money::Money;
pub use product::{NewProduct, Product, ProductFilter, ProductInput, ProductPatch};
pub use string_set::{StringSet, TokenRule};
pub use user::{NewUser, User, UserInput, UserPatch};
pub use wishlist::{NewWishlistItem, WishlistItem};
