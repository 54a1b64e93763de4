use domain::ValidationError;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("{what} already exists")]
    Duplicate { what: &'static str },

    /// A foreign key pointed at a row that does not exist.
    #[error("Referenced {what} does not exist")]
    MissingReference { what: &'static str },

    /// Waiting for a row lock exceeded the configured timeout.
    #[error("Timed out waiting for a lock, retry the request")]
    LockTimeout,

    /// The database aborted the transaction to resolve a conflict.
    #[error("Transaction conflict, retry the request: {0}")]
    Contention(String),

    /// A merged update failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A stored row could not be decoded into a domain value.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::LockTimeout | StoreError::Contention(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        classify(&err).unwrap_or(StoreError::Database(err))
    }
}

/// Classifies constraint and lock failures by SQLSTATE.
fn classify(err: &sqlx::Error) -> Option<StoreError> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };

    match db_err.code().as_deref() {
        Some("23505") => Some(StoreError::Duplicate {
            what: unique_subject(db_err.constraint()),
        }),
        Some("23503") => Some(StoreError::MissingReference {
            what: reference_subject(db_err.constraint()),
        }),
        Some("55P03") => Some(StoreError::LockTimeout),
        Some("40001") | Some("40P01") => Some(StoreError::Contention(db_err.message().to_string())),
        _ => None,
    }
}

/// Maps a unique constraint name to the field it protects.
fn unique_subject(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_username_key") => "username",
        Some("users_phone_key") => "phone",
        Some("users_api_token_key") => "api token",
        Some("products_sku_key") => "sku",
        Some("wishlist_items_user_product_key") => "wishlist item",
        Some("discounts_product_finish_percentage_key") => "discount",
        _ => "record",
    }
}

/// Maps a foreign key constraint name to the entity it references.
fn reference_subject(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some(name) if name.ends_with("product_id_fkey") => "product",
        Some(name) if name.ends_with("user_id_fkey") => "user",
        Some(name) if name.ends_with("cart_id_fkey") => "cart",
        Some(name) if name.ends_with("sub_category_id_fkey") => "sub category",
        Some(name) if name.ends_with("category_id_fkey") => "category",
        Some(name) if name.ends_with("brand_id_fkey") => "brand",
        _ => "record",
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
