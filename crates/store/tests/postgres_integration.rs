//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container. Every test writes its own
//! uniquely named rows, so they can run in parallel without truncation.
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use common::{CategoryId, ProductId};
use domain::{
    Cart, CartDetails, CartState, CatalogNames, CatalogNamesPatch, DiscountPatch, NewCartItem,
    NewDiscount, NewProduct, NewSubCategory, Product, ProductFilter, ProductInput, ProductPatch,
    SubCategoryPatch, User, UserInput, UserPatch, WishlistItem,
};
use sqlx::PgPool;
use store::{CartScope, PostgresShopStore, ShopStore, StoreError};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_storefront_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/002_create_catalog_taxonomy.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a store with its own pool and a short lock timeout
async fn get_test_store() -> PostgresShopStore {
    let info = get_container_info().await;

    // Create a fresh pool for each test to avoid connection issues
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    PostgresShopStore::with_lock_timeout(pool, Duration::from_millis(200))
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

fn product_fields(sku: &str, quantity: u32, price_cents: i64) -> NewProduct {
    ProductInput {
        name: "Runner".to_string(),
        name_ar: "عداء".to_string(),
        description: "Light running shoe".to_string(),
        description_ar: "حذاء جري خفيف".to_string(),
        colors: "red,blue".to_string(),
        colors_ar: "أحمر,أزرق".to_string(),
        sizes: "40,42".to_string(),
        price_cents,
        quantity,
        sku: sku.to_string(),
        brand: None,
        category: None,
        sub_category: None,
    }
    .validate()
    .unwrap()
}

async fn create_user(store: &PostgresShopStore) -> User {
    let input = UserInput {
        username: unique("user"),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        email: "test@example.com".to_string(),
        phone: None,
    };
    store.create_user(input.validate().unwrap()).await.unwrap()
}

async fn create_product(store: &PostgresShopStore, quantity: u32) -> Product {
    store
        .create_product(product_fields(&unique("SKU"), quantity, 1000))
        .await
        .unwrap()
}

/// Inserts an open cart with one red/40 line per (product, quantity).
async fn create_cart(store: &PostgresShopStore, user: &User, lines: &[(&Product, u32)]) -> Cart {
    let mut cart = Cart::open(user.id, CartDetails::default(), Utc::now());
    for (product, quantity) in lines {
        let line = NewCartItem {
            product_id: product.id,
            quantity: *quantity,
            color: "red".to_string(),
            size: 40,
            price: None,
        };
        cart.add_item(product, &line).unwrap();
    }

    let mut unit = store.begin().await.unwrap();
    unit.insert_cart(&cart).await.unwrap();
    unit.commit().await.unwrap();
    cart
}

mod products {
    use super::*;

    #[tokio::test]
    async fn create_and_get_product() {
        let store = get_test_store().await;
        let product = create_product(&store, 5).await;

        let loaded = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, product.id);
        assert_eq!(loaded.colors_ar.to_joined(), "أحمر,أزرق");
        assert!(loaded.has_size(42));
        assert_eq!(loaded.quantity, 5);
    }

    #[tokio::test]
    async fn duplicate_sku_is_a_duplicate_error() {
        let store = get_test_store().await;
        let sku = unique("SKU");
        store
            .create_product(product_fields(&sku, 1, 100))
            .await
            .unwrap();

        let err = store
            .create_product(product_fields(&sku, 1, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { what: "sku" }));
    }

    #[tokio::test]
    async fn filters_are_applied_in_sql() {
        let store = get_test_store().await;
        let tag = unique("tag");
        let cheap = store
            .create_product(product_fields(&format!("{tag}-a"), 3, 500))
            .await
            .unwrap();
        let pricey = store
            .create_product(product_fields(&format!("{tag}-b"), 30, 5000))
            .await
            .unwrap();

        let filter = ProductFilter {
            search: Some(tag.to_uppercase()),
            ..Default::default()
        };
        let found = store.list_products(&filter).await.unwrap();
        assert_eq!(
            found.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![cheap.id, pricey.id]
        );

        let filter = ProductFilter {
            search: Some(tag.clone()),
            price_max: Some(1000),
            color: Some("blue".to_string()),
            ..Default::default()
        };
        let found = store.list_products(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, cheap.id);

        let filter = ProductFilter {
            search: Some(tag),
            quantity_min: Some(10),
            ..Default::default()
        };
        let found = store.list_products(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, pricey.id);
    }

    #[tokio::test]
    async fn update_and_delete_product() {
        let store = get_test_store().await;
        let product = create_product(&store, 5).await;

        let patch = ProductPatch {
            price_cents: Some(2500),
            sizes: Some("44".to_string()),
            ..Default::default()
        };
        let updated = store
            .update_product(product.id, &patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.price.cents(), 2500);
        assert!(updated.has_size(44));
        assert!(!updated.has_size(40));

        assert!(store.delete_product(product.id).await.unwrap());
        assert!(store.get_product(product.id).await.unwrap().is_none());
        assert!(
            store
                .update_product(product.id, &patch)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn update_waits_at_most_the_lock_timeout() {
        let store = get_test_store().await;
        let product = create_product(&store, 5).await;

        let mut holder = store.begin().await.unwrap();
        holder.lock_products(&[product.id]).await.unwrap();

        let patch = ProductPatch {
            quantity: Some(9),
            ..Default::default()
        };
        let err = store.update_product(product.id, &patch).await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout));
        assert!(err.is_retryable());

        holder.commit().await.unwrap();
        let updated = store
            .update_product(product.id, &patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.quantity, 9);
    }
}

fn names(name: &str) -> CatalogNames {
    CatalogNames {
        name: name.to_string(),
        name_ar: "فئة".to_string(),
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

mod taxonomy {
    use super::*;

    #[tokio::test]
    async fn product_references_and_filters() {
        let store = get_test_store().await;
        let brand = store.create_brand(names(&unique("brand"))).await.unwrap();
        let category = store.create_category(names(&unique("cat"))).await.unwrap();
        let sub_category = store
            .create_sub_category(NewSubCategory {
                names: names(&unique("sub")),
                categories: vec![category.id],
            })
            .await
            .unwrap();

        let mut fields = product_fields(&unique("SKU"), 5, 1000);
        fields.brand = Some(brand.id);
        fields.category = Some(category.id);
        fields.sub_category = Some(sub_category.id);
        let tagged = store.create_product(fields).await.unwrap();
        create_product(&store, 5).await;

        let loaded = store.get_product(tagged.id).await.unwrap().unwrap();
        assert_eq!(loaded.brand, Some(brand.id));
        assert_eq!(loaded.sub_category, Some(sub_category.id));

        for filter in [
            ProductFilter {
                brand: Some(brand.id),
                ..Default::default()
            },
            ProductFilter {
                category: Some(category.id),
                ..Default::default()
            },
            ProductFilter {
                sub_category: Some(sub_category.id),
                ..Default::default()
            },
        ] {
            let found = store.list_products(&filter).await.unwrap();
            assert_eq!(found.iter().map(|p| p.id).collect::<Vec<_>>(), vec![tagged.id]);
        }
    }

    #[tokio::test]
    async fn unknown_references_are_missing_reference_errors() {
        let store = get_test_store().await;
        let mut fields = product_fields(&unique("SKU"), 5, 1000);
        fields.sub_category = Some(common::SubCategoryId::new());
        let err = store.create_product(fields).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::MissingReference {
                what: "sub category"
            }
        ));

        let err = store
            .create_sub_category(NewSubCategory {
                names: names(&unique("sub")),
                categories: vec![CategoryId::new()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingReference { what: "category" }));
    }

    #[tokio::test]
    async fn deleting_taxonomy_clears_product_references() {
        let store = get_test_store().await;
        let brand = store.create_brand(names(&unique("brand"))).await.unwrap();
        let category = store.create_category(names(&unique("cat"))).await.unwrap();
        let sub_category = store
            .create_sub_category(NewSubCategory {
                names: names(&unique("sub")),
                categories: vec![category.id],
            })
            .await
            .unwrap();

        let mut fields = product_fields(&unique("SKU"), 5, 1000);
        fields.brand = Some(brand.id);
        fields.category = Some(category.id);
        let product = store.create_product(fields).await.unwrap();

        assert!(store.delete_category(category.id).await.unwrap());
        assert!(!store.delete_category(category.id).await.unwrap());
        assert!(store.delete_brand(brand.id).await.unwrap());

        let reloaded = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(reloaded.brand, None);
        assert_eq!(reloaded.category, None);
        let unlinked = store
            .get_sub_category(sub_category.id)
            .await
            .unwrap()
            .unwrap();
        assert!(unlinked.categories.is_empty());
    }

    #[tokio::test]
    async fn sub_category_links_are_replaced_on_update() {
        let store = get_test_store().await;
        let a = store.create_category(names(&unique("cat"))).await.unwrap();
        let b = store.create_category(names(&unique("cat"))).await.unwrap();
        let sub_category = store
            .create_sub_category(NewSubCategory {
                names: names(&unique("sub")),
                categories: vec![a.id],
            })
            .await
            .unwrap();

        let mut expected = vec![a.id, b.id];
        expected.sort();
        let patch = SubCategoryPatch {
            categories: Some(vec![b.id, a.id]),
            ..Default::default()
        };
        let updated = store
            .update_sub_category(sub_category.id, &patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.categories, expected);

        let loaded = store
            .get_sub_category(sub_category.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.categories, expected);
        assert!(
            store
                .list_sub_categories()
                .await
                .unwrap()
                .iter()
                .any(|s| s.id == sub_category.id && s.categories == expected)
        );
    }

    #[tokio::test]
    async fn rename_category_and_brand() {
        let store = get_test_store().await;
        let category = store.create_category(names(&unique("cat"))).await.unwrap();
        let patch = CatalogNamesPatch {
            name_ar: Some("أحذية".to_string()),
            ..Default::default()
        };

        let renamed = store
            .update_category(category.id, &patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.names.name, category.names.name);
        assert_eq!(renamed.names.name_ar, "أحذية");
        assert_eq!(
            store.get_category(category.id).await.unwrap(),
            Some(renamed)
        );
        assert!(
            store
                .update_brand(common::BrandId::new(), &patch)
                .await
                .unwrap()
                .is_none()
        );
    }
}

mod discounts {
    use super::*;

    #[tokio::test]
    async fn discount_triple_is_unique() {
        let store = get_test_store().await;
        let product = create_product(&store, 5).await;
        let fields = NewDiscount {
            product_id: product.id,
            finish_date: date(2030, 1, 31),
            percentage: 20,
        };

        store.create_discount(fields).await.unwrap();
        let err = store.create_discount(fields).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { what: "discount" }));

        let err = store
            .create_discount(NewDiscount {
                product_id: ProductId::new(),
                ..fields
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingReference { what: "product" }));
    }

    #[tokio::test]
    async fn discounted_listing_follows_finish_date() {
        let store = get_test_store().await;
        let on_sale = create_product(&store, 5).await;
        let expired = create_product(&store, 5).await;

        let active = store
            .create_discount(NewDiscount {
                product_id: on_sale.id,
                finish_date: date(2099, 6, 1),
                percentage: 10,
            })
            .await
            .unwrap();
        store
            .create_discount(NewDiscount {
                product_id: expired.id,
                finish_date: date(2000, 1, 1),
                percentage: 10,
            })
            .await
            .unwrap();

        let listed = store
            .list_discounted_products(date(2026, 1, 1))
            .await
            .unwrap();
        assert!(listed.iter().any(|p| p.id == on_sale.id));
        assert!(!listed.iter().any(|p| p.id == expired.id));

        let patch = DiscountPatch {
            percentage: Some(55),
            ..Default::default()
        };
        let updated = store
            .update_discount(active.id, &patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.percentage, 55);
        assert_eq!(
            store.list_discounts(Some(on_sale.id)).await.unwrap(),
            vec![updated]
        );

        assert!(store.delete_product(on_sale.id).await.unwrap());
        assert!(store.get_discount(active.id).await.unwrap().is_none());
    }
}

mod users {
    use super::*;

    #[tokio::test]
    async fn token_lookup_ignores_inactive_users() {
        let store = get_test_store().await;
        let user = create_user(&store).await;

        let found = store.find_user_by_token(&user.api_token).await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));

        assert!(store.deactivate_user(user.id).await.unwrap());
        assert!(
            store
                .find_user_by_token(&user.api_token)
                .await
                .unwrap()
                .is_none()
        );
        let reloaded = store.get_user(user.id).await.unwrap().unwrap();
        assert!(!reloaded.is_active);
    }

    #[tokio::test]
    async fn duplicate_username_is_a_duplicate_error() {
        let store = get_test_store().await;
        let user = create_user(&store).await;

        let input = UserInput {
            username: user.username.clone(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone: None,
        };
        let err = store
            .create_user(input.validate().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { what: "username" }));
    }

    #[tokio::test]
    async fn profile_edit_waits_at_most_the_lock_timeout() {
        let store = get_test_store().await;
        let user = create_user(&store).await;

        let mut holder = store.pool().begin().await.unwrap();
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user.id.as_uuid())
            .execute(&mut *holder)
            .await
            .unwrap();

        let patch = UserPatch {
            first_name: Some("Renamed".to_string()),
            ..Default::default()
        };
        let err = store.update_user(user.id, &patch).await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout));

        holder.rollback().await.unwrap();
        let updated = store.update_user(user.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.first_name, "Renamed");
    }
}

mod carts {
    use super::*;

    #[tokio::test]
    async fn cart_round_trips_with_items_in_order() {
        let store = get_test_store().await;
        let user = create_user(&store).await;
        let a = create_product(&store, 5).await;
        let b = create_product(&store, 5).await;
        let cart = create_cart(&store, &user, &[(&a, 1), (&b, 2)]).await;

        // Timestamps lose sub-microsecond precision in the database.
        let loaded = store.get_cart(cart.id()).await.unwrap().unwrap();
        assert_eq!(loaded.user_id(), user.id);
        assert_eq!(loaded.state(), CartState::Open);
        assert_eq!(loaded.items(), cart.items());

        let by_item = store
            .find_cart_by_item(cart.items()[1].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_item.id(), cart.id());

        let active = store.list_carts(user.id, CartScope::Active).await.unwrap();
        assert_eq!(active.len(), 1);
        assert!(
            store
                .list_carts(user.id, CartScope::History)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn committed_unit_persists_stock_and_state() {
        let store = get_test_store().await;
        let user = create_user(&store).await;
        let product = create_product(&store, 5).await;
        let cart = create_cart(&store, &user, &[(&product, 3)]).await;

        let mut unit = store.begin().await.unwrap();
        let mut locked = unit.lock_cart(cart.id()).await.unwrap().unwrap();
        let products = unit.lock_products(&locked.product_ids()).await.unwrap();
        for change in locked.reserve_stock(&products).unwrap() {
            unit.set_product_quantity(change.product_id, change.after)
                .await
                .unwrap();
        }
        locked.submit(Utc::now()).unwrap();
        unit.save_cart_header(locked.header()).await.unwrap();
        unit.commit().await.unwrap();

        let reloaded = store.get_cart(cart.id()).await.unwrap().unwrap();
        assert_eq!(reloaded.state(), CartState::Submitted);
        assert!(reloaded.header().submitted_at.is_some());
        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 2);
    }

    #[tokio::test]
    async fn dropped_unit_rolls_back() {
        let store = get_test_store().await;
        let product = create_product(&store, 5).await;

        {
            let mut unit = store.begin().await.unwrap();
            unit.lock_products(&[product.id]).await.unwrap();
            unit.set_product_quantity(product.id, 0).await.unwrap();
        }

        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 5);
    }

    #[tokio::test]
    async fn lock_products_skips_missing_and_sorts() {
        let store = get_test_store().await;
        let a = create_product(&store, 1).await;
        let b = create_product(&store, 1).await;

        let mut unit = store.begin().await.unwrap();
        let locked = unit
            .lock_products(&[b.id, ProductId::new(), a.id, b.id])
            .await
            .unwrap();
        assert_eq!(locked.len(), 2);
        assert!(locked[0].id < locked[1].id);
    }

    #[tokio::test]
    async fn waiting_on_a_locked_row_times_out() {
        let store = get_test_store().await;
        let user = create_user(&store).await;
        let product = create_product(&store, 5).await;
        let cart = create_cart(&store, &user, &[(&product, 1)]).await;

        let mut holder = store.begin().await.unwrap();
        holder.lock_cart(cart.id()).await.unwrap();

        let mut waiter = store.begin().await.unwrap();
        let err = waiter.lock_cart(cart.id()).await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn item_for_missing_product_is_a_missing_reference() {
        let store = get_test_store().await;
        let user = create_user(&store).await;
        let product = create_product(&store, 5).await;
        let cart = create_cart(&store, &user, &[(&product, 1)]).await;
        store.delete_product(product.id).await.unwrap();

        // Cascade removed the line along with the product.
        let reloaded = store.get_cart(cart.id()).await.unwrap().unwrap();
        assert!(reloaded.items().is_empty());

        let mut unit = store.begin().await.unwrap();
        let err = unit.insert_item(&cart.items()[0]).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingReference { what: "product" }));
    }
}

mod wishlist {
    use super::*;

    #[tokio::test]
    async fn pair_is_unique() {
        let store = get_test_store().await;
        let user = create_user(&store).await;
        let product = create_product(&store, 1).await;

        store
            .add_wishlist_item(WishlistItem::new(user.id, product.id, Utc::now()))
            .await
            .unwrap();
        let err = store
            .add_wishlist_item(WishlistItem::new(user.id, product.id, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Duplicate {
                what: "wishlist item"
            }
        ));
        assert_eq!(store.list_wishlist(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_product_is_a_missing_reference() {
        let store = get_test_store().await;
        let user = create_user(&store).await;

        let err = store
            .add_wishlist_item(WishlistItem::new(user.id, ProductId::new(), Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingReference { what: "product" }));
    }

    #[tokio::test]
    async fn delete_wishlist_item() {
        let store = get_test_store().await;
        let user = create_user(&store).await;
        let product = create_product(&store, 1).await;
        let item = store
            .add_wishlist_item(WishlistItem::new(user.id, product.id, Utc::now()))
            .await
            .unwrap();

        assert!(store.get_wishlist_item(item.id).await.unwrap().is_some());
        assert!(store.delete_wishlist_item(item.id).await.unwrap());
        assert!(!store.delete_wishlist_item(item.id).await.unwrap());
    }
}
