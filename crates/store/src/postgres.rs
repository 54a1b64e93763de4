use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use common::{
    BrandId, CartId, CartItemId, CategoryId, DiscountId, FeedbackId, ProductId, SubCategoryId,
    UserId, WishlistItemId,
};
use domain::{
    Brand, Cart, CartDetails, CartHeader, CartItem, CartState, CatalogNames, CatalogNamesPatch,
    Category, Discount, DiscountPatch, Feedback, Money, NewDiscount, NewProduct, NewSubCategory,
    NewUser, PaymentMethod, Product, ProductFilter, ProductPatch, StringSet, SubCategory,
    SubCategoryPatch, TokenRule, User, UserPatch, WishlistItem,
};
use sqlx::postgres::{PgExecutor, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::memory::DEFAULT_LOCK_TIMEOUT;
use crate::store::{CartScope, CheckoutUnit, ShopStore, lock_order};
use crate::{Result, StoreError};

const PRODUCT_COLUMNS: &str = "id, name, name_ar, description, description_ar, colors, \
     colors_ar, sizes, price_cents, quantity, sku, brand_id, category_id, sub_category_id, \
     created_at";

const USER_COLUMNS: &str = "id, username, first_name, last_name, email, phone, is_staff, \
     is_active, api_token, created_at";

const CART_COLUMNS: &str = "id, user_id, state, created_at, submitted_at, finished_at, \
     address, zip_code, country, payment_method, payment_reference";

const ITEM_COLUMNS: &str = "id, cart_id, product_id, quantity, color, size, price_cents";

const DISCOUNT_COLUMNS: &str = "id, product_id, finish_date, percentage";

/// Sub-categories with their links folded into a sorted id array.
const SUB_CATEGORY_SELECT: &str = "SELECT s.id, s.name, s.name_ar, \
     COALESCE(array_agg(l.category_id ORDER BY l.category_id) \
         FILTER (WHERE l.category_id IS NOT NULL), '{}') AS categories \
     FROM sub_categories s \
     LEFT JOIN sub_category_categories l ON l.sub_category_id = s.id";

// Categories and brands share one row shape.
const CATEGORIES: &str = "categories";
const BRANDS: &str = "brands";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresShopStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresShopStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self::with_lock_timeout(pool, DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a store whose units of work give up waiting for row locks
    /// after `lock_timeout`.
    pub fn with_lock_timeout(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Inserts a user with staff rights.
    pub async fn create_staff_user(&self, mut user: NewUser) -> Result<User> {
        user.is_staff = true;
        self.create_user(user).await
    }

    /// Opens a transaction whose row lock waits give up after the
    /// configured timeout.
    async fn begin_bounded(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;

        // Scoped to this transaction only.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(tx)
    }

    async fn insert_names(&self, table: &str, id: Uuid, names: &CatalogNames) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {table} (id, name, name_ar) VALUES ($1, $2, $3)"
        ))
        .bind(id)
        .bind(&names.name)
        .bind(&names.name_ar)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_names(&self, table: &str, id: Uuid) -> Result<Option<CatalogNames>> {
        let row = sqlx::query(&format!("SELECT name, name_ar FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_names).transpose()
    }

    async fn list_names(&self, table: &str) -> Result<Vec<(Uuid, CatalogNames)>> {
        let rows = sqlx::query(&format!(
            "SELECT id, name, name_ar FROM {table} ORDER BY name, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(Uuid, CatalogNames)> {
                Ok((row.try_get("id")?, row_to_names(row)?))
            })
            .collect()
    }

    async fn update_names(
        &self,
        table: &str,
        id: Uuid,
        patch: &CatalogNamesPatch,
    ) -> Result<Option<CatalogNames>> {
        let mut tx = self.begin_bounded().await?;

        let row = sqlx::query(&format!(
            "SELECT name, name_ar FROM {table} WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let updated = patch.apply(&row_to_names(&row)?)?;
        sqlx::query(&format!(
            "UPDATE {table} SET name = $2, name_ar = $3 WHERE id = $1"
        ))
        .bind(id)
        .bind(&updated.name)
        .bind(&updated.name_ar)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete_row(&self, table: &str, id: Uuid) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// Row decoding

fn decode_u32(row: &PgRow, column: &str) -> Result<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn decode_set(row: &PgRow, column: &'static str, rule: TokenRule) -> Result<StringSet> {
    let text: String = row.try_get(column)?;
    StringSet::parse(column, &text, rule).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        name_ar: row.try_get("name_ar")?,
        description: row.try_get("description")?,
        description_ar: row.try_get("description_ar")?,
        colors: decode_set(row, "colors", TokenRule::Word)?,
        colors_ar: decode_set(row, "colors_ar", TokenRule::Arabic)?,
        sizes: decode_set(row, "sizes", TokenRule::Digits)?,
        price: Money::from_cents(row.try_get("price_cents")?),
        quantity: decode_u32(row, "quantity")?,
        sku: row.try_get("sku")?,
        brand: row
            .try_get::<Option<Uuid>, _>("brand_id")?
            .map(BrandId::from_uuid),
        category: row
            .try_get::<Option<Uuid>, _>("category_id")?
            .map(CategoryId::from_uuid),
        sub_category: row
            .try_get::<Option<Uuid>, _>("sub_category_id")?
            .map(SubCategoryId::from_uuid),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_names(row: &PgRow) -> Result<CatalogNames> {
    Ok(CatalogNames {
        name: row.try_get("name")?,
        name_ar: row.try_get("name_ar")?,
    })
}

fn row_to_sub_category(row: &PgRow) -> Result<SubCategory> {
    let categories: Vec<Uuid> = row.try_get("categories")?;
    Ok(SubCategory {
        id: SubCategoryId::from_uuid(row.try_get::<Uuid, _>("id")?),
        names: row_to_names(row)?,
        categories: categories.into_iter().map(CategoryId::from_uuid).collect(),
    })
}

fn row_to_discount(row: &PgRow) -> Result<Discount> {
    let percentage: i16 = row.try_get("percentage")?;
    let percentage = u8::try_from(percentage)
        .map_err(|_| StoreError::Corrupt(format!("percentage out of range: {percentage}")))?;

    Ok(Discount {
        id: DiscountId::from_uuid(row.try_get::<Uuid, _>("id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        finish_date: row.try_get("finish_date")?,
        percentage,
    })
}

fn row_to_user(row: &PgRow) -> Result<User> {
    Ok(User {
        id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        is_staff: row.try_get("is_staff")?,
        is_active: row.try_get("is_active")?,
        api_token: row.try_get("api_token")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_header(row: &PgRow) -> Result<CartHeader> {
    let state: String = row.try_get("state")?;
    let state: CartState = state
        .parse()
        .map_err(|e: domain::cart::UnknownCartState| StoreError::Corrupt(e.to_string()))?;

    let zip_code: Option<i64> = row.try_get("zip_code")?;
    let zip_code = zip_code
        .map(u32::try_from)
        .transpose()
        .map_err(|_| StoreError::Corrupt("zip_code out of range".to_string()))?;

    let payment_method: Option<String> = row.try_get("payment_method")?;
    let payment_method = payment_method
        .map(|method| method.parse::<PaymentMethod>())
        .transpose()
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;

    Ok(CartHeader {
        id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        state,
        created_at: row.try_get("created_at")?,
        submitted_at: row.try_get("submitted_at")?,
        finished_at: row.try_get("finished_at")?,
        details: CartDetails {
            address: row.try_get("address")?,
            zip_code,
            country: row.try_get("country")?,
            payment_method,
        },
        payment_reference: row.try_get("payment_reference")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<CartItem> {
    Ok(CartItem {
        id: CartItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: decode_u32(row, "quantity")?,
        color: row.try_get("color")?,
        size: decode_u32(row, "size")?,
        price: Money::from_cents(row.try_get("price_cents")?),
    })
}

fn row_to_wishlist_item(row: &PgRow) -> Result<WishlistItem> {
    Ok(WishlistItem {
        id: WishlistItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_feedback(row: &PgRow) -> Result<Feedback> {
    Ok(Feedback {
        id: FeedbackId::from_uuid(row.try_get::<Uuid, _>("id")?),
        email: row.try_get("email")?,
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
    })
}

// Shared queries, usable on the pool or inside a transaction

async fn load_items<'e>(executor: impl PgExecutor<'e>, cart_ids: &[Uuid]) -> Result<Vec<CartItem>> {
    let rows = sqlx::query(&format!(
        "SELECT {ITEM_COLUMNS} FROM cart_items WHERE cart_id = ANY($1) ORDER BY created_at, id"
    ))
    .bind(cart_ids)
    .fetch_all(executor)
    .await?;

    rows.iter().map(row_to_item).collect()
}

/// Attaches items to their headers, keeping header order.
fn assemble(headers: Vec<CartHeader>, items: Vec<CartItem>) -> Vec<Cart> {
    let mut by_cart: HashMap<CartId, Vec<CartItem>> = HashMap::new();
    for item in items {
        by_cart.entry(item.cart_id).or_default().push(item);
    }
    headers
        .into_iter()
        .map(|header| {
            let items = by_cart.remove(&header.id).unwrap_or_default();
            Cart::from_parts(header, items)
        })
        .collect()
}

fn scope_states(scope: CartScope) -> Vec<String> {
    let states: &[CartState] = match scope {
        CartScope::Active => &[CartState::Open, CartState::Submitted],
        CartScope::History => &[CartState::Finished, CartState::Cancelled],
        CartScope::All => &[
            CartState::Open,
            CartState::Submitted,
            CartState::Finished,
            CartState::Cancelled,
        ],
    };
    states.iter().map(|s| s.as_str().to_string()).collect()
}

async fn write_product<'e>(
    executor: impl PgExecutor<'e>,
    id: ProductId,
    fields: &NewProduct,
) -> Result<Product> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE products
        SET name = $2, name_ar = $3, description = $4, description_ar = $5, colors = $6,
            colors_ar = $7, sizes = $8, price_cents = $9, quantity = $10, sku = $11,
            brand_id = $12, category_id = $13, sub_category_id = $14
        WHERE id = $1
        RETURNING {PRODUCT_COLUMNS}
        "#
    ))
    .bind(id.as_uuid())
    .bind(&fields.name)
    .bind(&fields.name_ar)
    .bind(&fields.description)
    .bind(&fields.description_ar)
    .bind(fields.colors.to_joined())
    .bind(fields.colors_ar.to_joined())
    .bind(fields.sizes.to_joined())
    .bind(fields.price.cents())
    .bind(i64::from(fields.quantity))
    .bind(&fields.sku)
    .bind(fields.brand.map(|id| id.as_uuid()))
    .bind(fields.category.map(|id| id.as_uuid()))
    .bind(fields.sub_category.map(|id| id.as_uuid()))
    .fetch_one(executor)
    .await?;

    row_to_product(&row)
}

async fn load_sub_category<'e>(
    executor: impl PgExecutor<'e>,
    id: SubCategoryId,
) -> Result<Option<SubCategory>> {
    let row = sqlx::query(&format!(
        "{SUB_CATEGORY_SELECT} WHERE s.id = $1 GROUP BY s.id"
    ))
    .bind(id.as_uuid())
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(row_to_sub_category).transpose()
}

async fn link_categories(
    tx: &mut Transaction<'static, Postgres>,
    id: SubCategoryId,
    categories: &[CategoryId],
) -> Result<()> {
    let ids: Vec<Uuid> = categories.iter().map(CategoryId::as_uuid).collect();
    sqlx::query(
        r#"
        INSERT INTO sub_category_categories (sub_category_id, category_id)
        SELECT $1, unnest($2::uuid[])
        "#,
    )
    .bind(id.as_uuid())
    .bind(ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl ShopStore for PostgresShopStore {
    async fn create_product(&self, fields: NewProduct) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (id, name, name_ar, description, description_ar, colors,
                                  colors_ar, sizes, price_cents, quantity, sku, brand_id,
                                  category_id, sub_category_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&fields.name)
        .bind(&fields.name_ar)
        .bind(&fields.description)
        .bind(&fields.description_ar)
        .bind(fields.colors.to_joined())
        .bind(fields.colors_ar.to_joined())
        .bind(fields.sizes.to_joined())
        .bind(fields.price.cents())
        .bind(i64::from(fields.quantity))
        .bind(&fields.sku)
        .bind(fields.brand.map(|id| id.as_uuid()))
        .bind(fields.category.map(|id| id.as_uuid()))
        .bind(fields.sub_category.map(|id| id.as_uuid()))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        row_to_product(&row)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let mut sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if filter.search.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND (strpos(lower(name), lower(${p})) > 0 \
                 OR strpos(lower(name_ar), lower(${p})) > 0 \
                 OR strpos(lower(description), lower(${p})) > 0 \
                 OR strpos(lower(description_ar), lower(${p})) > 0 \
                 OR strpos(lower(sku), lower(${p})) > 0)",
                p = param_count
            ));
        }
        if filter.color.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND strpos(colors, ${param_count}) > 0"));
        }
        if filter.price_min.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND price_cents >= ${param_count}"));
        }
        if filter.price_max.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND price_cents <= ${param_count}"));
        }
        if filter.quantity_min.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND quantity >= ${param_count}"));
        }
        if filter.quantity_max.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND quantity <= ${param_count}"));
        }
        if filter.brand.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND brand_id = ${param_count}"));
        }
        if filter.category.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND category_id = ${param_count}"));
        }
        if filter.sub_category.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND sub_category_id = ${param_count}"));
        }
        sql.push_str(" ORDER BY created_at, id");

        let mut query = sqlx::query(&sql);
        if let Some(search) = &filter.search {
            query = query.bind(search);
        }
        if let Some(color) = &filter.color {
            query = query.bind(color);
        }
        if let Some(min) = filter.price_min {
            query = query.bind(min);
        }
        if let Some(max) = filter.price_max {
            query = query.bind(max);
        }
        if let Some(min) = filter.quantity_min {
            query = query.bind(i64::from(min));
        }
        if let Some(max) = filter.quantity_max {
            query = query.bind(i64::from(max));
        }
        if let Some(brand) = filter.brand {
            query = query.bind(brand.as_uuid());
        }
        if let Some(category) = filter.category {
            query = query.bind(category.as_uuid());
        }
        if let Some(sub_category) = filter.sub_category {
            query = query.bind(sub_category.as_uuid());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_product).collect()
    }

    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Option<Product>> {
        let mut tx = self.begin_bounded().await?;

        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let current = row_to_product(&row)?;
        let fields = patch.apply(&current)?;
        let updated = write_product(&mut *tx, id, &fields).await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_discounted_products(&self, today: NaiveDate) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE EXISTS (
                SELECT 1 FROM discounts d
                WHERE d.product_id = products.id AND d.finish_date > $1
            )
            ORDER BY created_at, id
            "#
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_product).collect()
    }

    async fn create_category(&self, names: CatalogNames) -> Result<Category> {
        let id = CategoryId::new();
        self.insert_names(CATEGORIES, id.as_uuid(), &names).await?;
        Ok(Category::new(id, names))
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        let names = self.get_names(CATEGORIES, id.as_uuid()).await?;
        Ok(names.map(|names| Category::new(id, names)))
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = self.list_names(CATEGORIES).await?;
        Ok(rows
            .into_iter()
            .map(|(id, names)| Category::new(CategoryId::from_uuid(id), names))
            .collect())
    }

    async fn update_category(
        &self,
        id: CategoryId,
        patch: &CatalogNamesPatch,
    ) -> Result<Option<Category>> {
        let names = self.update_names(CATEGORIES, id.as_uuid(), patch).await?;
        Ok(names.map(|names| Category::new(id, names)))
    }

    async fn delete_category(&self, id: CategoryId) -> Result<bool> {
        self.delete_row(CATEGORIES, id.as_uuid()).await
    }

    async fn create_sub_category(&self, fields: NewSubCategory) -> Result<SubCategory> {
        let id = SubCategoryId::new();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO sub_categories (id, name, name_ar) VALUES ($1, $2, $3)")
            .bind(id.as_uuid())
            .bind(&fields.names.name)
            .bind(&fields.names.name_ar)
            .execute(&mut *tx)
            .await?;
        link_categories(&mut tx, id, &fields.categories).await?;

        tx.commit().await?;
        Ok(SubCategory::new(id, fields))
    }

    async fn get_sub_category(&self, id: SubCategoryId) -> Result<Option<SubCategory>> {
        load_sub_category(&self.pool, id).await
    }

    async fn list_sub_categories(&self) -> Result<Vec<SubCategory>> {
        let rows = sqlx::query(&format!(
            "{SUB_CATEGORY_SELECT} GROUP BY s.id ORDER BY s.name, s.id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_sub_category).collect()
    }

    async fn update_sub_category(
        &self,
        id: SubCategoryId,
        patch: &SubCategoryPatch,
    ) -> Result<Option<SubCategory>> {
        let mut tx = self.begin_bounded().await?;

        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM sub_categories WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Ok(None);
        }
        let Some(current) = load_sub_category(&mut *tx, id).await? else {
            return Ok(None);
        };

        let fields = patch.apply(&current)?;
        sqlx::query("UPDATE sub_categories SET name = $2, name_ar = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(&fields.names.name)
            .bind(&fields.names.name_ar)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sub_category_categories WHERE sub_category_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        link_categories(&mut tx, id, &fields.categories).await?;

        tx.commit().await?;
        Ok(Some(SubCategory::new(id, fields)))
    }

    async fn delete_sub_category(&self, id: SubCategoryId) -> Result<bool> {
        self.delete_row("sub_categories", id.as_uuid()).await
    }

    async fn create_brand(&self, names: CatalogNames) -> Result<Brand> {
        let id = BrandId::new();
        self.insert_names(BRANDS, id.as_uuid(), &names).await?;
        Ok(Brand::new(id, names))
    }

    async fn get_brand(&self, id: BrandId) -> Result<Option<Brand>> {
        let names = self.get_names(BRANDS, id.as_uuid()).await?;
        Ok(names.map(|names| Brand::new(id, names)))
    }

    async fn list_brands(&self) -> Result<Vec<Brand>> {
        let rows = self.list_names(BRANDS).await?;
        Ok(rows
            .into_iter()
            .map(|(id, names)| Brand::new(BrandId::from_uuid(id), names))
            .collect())
    }

    async fn update_brand(
        &self,
        id: BrandId,
        patch: &CatalogNamesPatch,
    ) -> Result<Option<Brand>> {
        let names = self.update_names(BRANDS, id.as_uuid(), patch).await?;
        Ok(names.map(|names| Brand::new(id, names)))
    }

    async fn delete_brand(&self, id: BrandId) -> Result<bool> {
        self.delete_row(BRANDS, id.as_uuid()).await
    }

    async fn create_discount(&self, fields: NewDiscount) -> Result<Discount> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO discounts (id, product_id, finish_date, percentage)
            VALUES ($1, $2, $3, $4)
            RETURNING {DISCOUNT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(fields.product_id.as_uuid())
        .bind(fields.finish_date)
        .bind(i16::from(fields.percentage))
        .fetch_one(&self.pool)
        .await?;

        row_to_discount(&row)
    }

    async fn get_discount(&self, id: DiscountId) -> Result<Option<Discount>> {
        let row = sqlx::query(&format!(
            "SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_discount).transpose()
    }

    async fn list_discounts(&self, product_id: Option<ProductId>) -> Result<Vec<Discount>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {DISCOUNT_COLUMNS} FROM discounts
            WHERE $1::uuid IS NULL OR product_id = $1
            ORDER BY finish_date, id
            "#
        ))
        .bind(product_id.map(|id| id.as_uuid()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_discount).collect()
    }

    async fn update_discount(
        &self,
        id: DiscountId,
        patch: &DiscountPatch,
    ) -> Result<Option<Discount>> {
        let mut tx = self.begin_bounded().await?;

        let row = sqlx::query(&format!(
            "SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let fields = patch.apply(&row_to_discount(&row)?)?;
        sqlx::query(
            r#"
            UPDATE discounts SET product_id = $2, finish_date = $3, percentage = $4
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(fields.product_id.as_uuid())
        .bind(fields.finish_date)
        .bind(i16::from(fields.percentage))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(Discount::new(id, fields)))
    }

    async fn delete_discount(&self, id: DiscountId) -> Result<bool> {
        self.delete_row("discounts", id.as_uuid()).await
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, username, first_name, last_name, email, phone, is_staff,
                               is_active, api_token, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.is_staff)
        .bind(&user.api_token)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        row_to_user(&row)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE api_token = $1 AND is_active"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_active ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect()
    }

    async fn update_user(&self, id: UserId, patch: &UserPatch) -> Result<Option<User>> {
        let mut tx = self.begin_bounded().await?;

        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let updated = patch.apply(&row_to_user(&row)?)?;
        sqlx::query(
            r#"
            UPDATE users
            SET username = $2, first_name = $3, last_name = $4, email = $5, phone = $6
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&updated.username)
        .bind(&updated.first_name)
        .bind(&updated.last_name)
        .bind(&updated.email)
        .bind(&updated.phone)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn deactivate_user(&self, id: UserId) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET is_active = FALSE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query(&format!("SELECT {CART_COLUMNS} FROM carts WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let header = row_to_header(&row)?;
        let items = load_items(&self.pool, &[id.as_uuid()]).await?;
        Ok(Some(Cart::from_parts(header, items)))
    }

    async fn find_cart_by_item(&self, item_id: CartItemId) -> Result<Option<Cart>> {
        let cart_id: Option<Uuid> =
            sqlx::query_scalar("SELECT cart_id FROM cart_items WHERE id = $1")
                .bind(item_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match cart_id {
            Some(cart_id) => self.get_cart(CartId::from_uuid(cart_id)).await,
            None => Ok(None),
        }
    }

    async fn list_carts(&self, user_id: UserId, scope: CartScope) -> Result<Vec<Cart>> {
        let rows = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1 AND state = ANY($2) \
             ORDER BY created_at, id"
        ))
        .bind(user_id.as_uuid())
        .bind(scope_states(scope))
        .fetch_all(&self.pool)
        .await?;

        let headers = rows.iter().map(row_to_header).collect::<Result<Vec<_>>>()?;
        let ids: Vec<Uuid> = headers.iter().map(|h| h.id.as_uuid()).collect();
        let items = load_items(&self.pool, &ids).await?;
        Ok(assemble(headers, items))
    }

    async fn add_wishlist_item(&self, item: WishlistItem) -> Result<WishlistItem> {
        sqlx::query(
            r#"
            INSERT INTO wishlist_items (id, user_id, product_id, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.user_id.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;

        Ok(item)
    }

    async fn get_wishlist_item(&self, id: WishlistItemId) -> Result<Option<WishlistItem>> {
        let row = sqlx::query(
            "SELECT id, user_id, product_id, created_at FROM wishlist_items WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_wishlist_item).transpose()
    }

    async fn list_wishlist(&self, user_id: UserId) -> Result<Vec<WishlistItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, product_id, created_at
            FROM wishlist_items
            WHERE user_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_wishlist_item).collect()
    }

    async fn delete_wishlist_item(&self, id: WishlistItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM wishlist_items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_feedback(&self, feedback: Feedback) -> Result<Feedback> {
        sqlx::query("INSERT INTO feedback (id, email, message, created_at) VALUES ($1, $2, $3, $4)")
            .bind(feedback.id.as_uuid())
            .bind(&feedback.email)
            .bind(&feedback.message)
            .bind(feedback.created_at)
            .execute(&self.pool)
            .await?;

        Ok(feedback)
    }

    async fn list_feedback(&self) -> Result<Vec<Feedback>> {
        let rows = sqlx::query(
            "SELECT id, email, message, created_at FROM feedback ORDER BY created_at DESC, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_feedback).collect()
    }

    async fn begin(&self) -> Result<Box<dyn CheckoutUnit>> {
        let tx = self.begin_bounded().await?;
        Ok(Box::new(PgCheckoutUnit { tx }))
    }
}

/// Unit of work backed by a database transaction.
///
/// Dropping the unit rolls the transaction back.
struct PgCheckoutUnit {
    tx: Transaction<'static, Postgres>,
}

impl PgCheckoutUnit {
    async fn insert_item_row(&mut self, item: &CartItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, quantity, color, size, price_cents)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.cart_id.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(i64::from(item.quantity))
        .bind(&item.color)
        .bind(i64::from(item.size))
        .bind(item.price.cents())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CheckoutUnit for PgCheckoutUnit {
    async fn lock_cart(&mut self, id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let header = row_to_header(&row)?;
        let items = load_items(&mut *self.tx, &[id.as_uuid()]).await?;
        Ok(Some(Cart::from_parts(header, items)))
    }

    async fn load_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(row_to_product).collect()
    }

    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>> {
        // One row at a time so the acquisition order is explicit.
        let mut products = Vec::new();
        for id in lock_order(ids) {
            let row = sqlx::query(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
            ))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

            if let Some(row) = row {
                products.push(row_to_product(&row)?);
            }
        }
        tracing::debug!(count = products.len(), "locked product rows");
        Ok(products)
    }

    async fn set_product_quantity(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        sqlx::query("UPDATE products SET quantity = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(i64::from(quantity))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_cart(&mut self, cart: &Cart) -> Result<()> {
        let header = cart.header();
        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, state, created_at, submitted_at, finished_at,
                               address, zip_code, country, payment_method, payment_reference)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(header.id.as_uuid())
        .bind(header.user_id.as_uuid())
        .bind(header.state.as_str())
        .bind(header.created_at)
        .bind(header.submitted_at)
        .bind(header.finished_at)
        .bind(&header.details.address)
        .bind(header.details.zip_code.map(i64::from))
        .bind(&header.details.country)
        .bind(header.details.payment_method.map(|m| m.as_str()))
        .bind(&header.payment_reference)
        .execute(&mut *self.tx)
        .await?;

        for item in cart.items() {
            self.insert_item_row(item).await?;
        }
        Ok(())
    }

    async fn save_cart_header(&mut self, header: &CartHeader) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE carts
            SET state = $2, submitted_at = $3, finished_at = $4, address = $5, zip_code = $6,
                country = $7, payment_method = $8, payment_reference = $9
            WHERE id = $1
            "#,
        )
        .bind(header.id.as_uuid())
        .bind(header.state.as_str())
        .bind(header.submitted_at)
        .bind(header.finished_at)
        .bind(&header.details.address)
        .bind(header.details.zip_code.map(i64::from))
        .bind(&header.details.country)
        .bind(header.details.payment_method.map(|m| m.as_str()))
        .bind(&header.payment_reference)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_item(&mut self, item: &CartItem) -> Result<()> {
        self.insert_item_row(item).await
    }

    async fn update_item(&mut self, item: &CartItem) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE cart_items
            SET product_id = $2, quantity = $3, color = $4, size = $5, price_cents = $6
            WHERE id = $1
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(i64::from(item.quantity))
        .bind(&item.color)
        .bind(i64::from(item.size))
        .bind(item.price.cents())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_item(&mut self, id: CartItemId) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
