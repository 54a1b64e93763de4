use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Each entity gets its own type so a `CartId` can never be passed where a
/// `ProductId` is expected. Identifiers order by their UUID value, which is
/// the order row locks are taken in during checkout.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a catalog product.
    ProductId
);

uuid_id!(
    /// Unique identifier for a shopping cart.
    CartId
);

uuid_id!(
    /// Unique identifier for a line item inside a cart.
    CartItemId
);

uuid_id!(
    /// Unique identifier for a registered user.
    UserId
);

uuid_id!(
    /// Unique identifier for a wishlist entry.
    WishlistItemId
);

uuid_id!(
    /// Unique identifier for a feedback message.
    FeedbackId
);

uuid_id!(
    /// Unique identifier for a product category.
    CategoryId
);

uuid_id!(
    /// Unique identifier for a product sub-category.
    SubCategoryId
);

uuid_id!(
    /// Unique identifier for a product brand.
    BrandId
);

uuid_id!(
    /// Unique identifier for a product discount.
    DiscountId
);
