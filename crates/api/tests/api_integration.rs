//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain::UserInput;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryShopStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn product_body(sku: &str, quantity: u32) -> Value {
    json!({
        "name": "Runner",
        "name_ar": "عداء",
        "description": "Light running shoe",
        "description_ar": "حذاء جري خفيف",
        "colors": "red,blue",
        "colors_ar": "أحمر,أزرق",
        "sizes": "40,42",
        "price_cents": 1000,
        "quantity": quantity,
        "sku": sku
    })
}

struct TestApp {
    app: Router,
    store: InMemoryShopStore,
}

impl TestApp {
    fn new() -> Self {
        let store = InMemoryShopStore::new();
        let state = api::create_default_state(store.clone());
        let app = api::create_app(Arc::clone(&state), get_metrics_handle());
        Self { app, store }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Registers a customer and returns `(id, token)`.
    async fn register(&self, username: &str) -> (String, String) {
        let (status, json) = self
            .send(
                "POST",
                "/users",
                None,
                Some(json!({ "username": username, "email": format!("{username}@example.com") })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        (
            json["id"].as_str().unwrap().to_string(),
            json["api_token"].as_str().unwrap().to_string(),
        )
    }

    async fn staff_token(&self) -> String {
        let input = UserInput {
            username: "admin".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: "admin@example.com".to_string(),
            phone: None,
        };
        self.store
            .create_staff_user(input.validate().unwrap())
            .await
            .unwrap()
            .api_token
    }

    async fn create_product(&self, staff: &str, sku: &str, quantity: u32) -> String {
        let (status, json) = self
            .send("POST", "/products", Some(staff), Some(product_body(sku, quantity)))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["id"].as_str().unwrap().to_string()
    }

    /// Creates a taxonomy entry under `/products/{kind}` and returns its id.
    async fn create_entry(&self, staff: &str, kind: &str, body: Value) -> String {
        let (status, json) = self
            .send("POST", &format!("/products/{kind}"), Some(staff), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["id"].as_str().unwrap().to_string()
    }

    async fn create_cart(&self, token: &str, product_id: &str, quantity: u32) -> Value {
        let (status, json) = self
            .send(
                "POST",
                "/carts",
                Some(token),
                Some(json!({
                    "address": "1 Nile St",
                    "payment_method": "cash",
                    "items": [{
                        "product_id": product_id,
                        "quantity": quantity,
                        "color": "red",
                        "size": 40
                    }]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json
    }

    async fn product_quantity(&self, product_id: &str) -> u64 {
        let (_, json) = self
            .send("GET", &format!("/products/{product_id}"), None, None)
            .await;
        json["quantity"].as_u64().unwrap()
    }
}

#[tokio::test]
async fn test_health_check() {
    let t = TestApp::new();
    let (status, json) = t.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = TestApp::new();
    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_checkout_flow() {
    let t = TestApp::new();
    let staff = t.staff_token().await;
    let (_, alice) = t.register("alice").await;
    let product_id = t.create_product(&staff, "RUN-001", 5).await;

    let cart = t.create_cart(&alice, &product_id, 3).await;
    let cart_id = cart["id"].as_str().unwrap();
    assert_eq!(cart["state"], "open");
    assert_eq!(cart["items"][0]["price_cents"], 3000);
    assert_eq!(cart["total_cents"], 3000);
    assert_eq!(cart["date_added"], Value::Null);

    // GET finish submits the order
    let (status, cart) = t
        .send("GET", &format!("/carts/{cart_id}/finish"), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{cart}");
    assert_eq!(cart["state"], "submitted");
    assert_eq!(cart["is_active"], true);
    assert!(cart["date_added"].is_string());
    assert_eq!(t.product_quantity(&product_id).await, 2);

    // POST finish settles it
    let (status, cart) = t
        .send(
            "POST",
            &format!("/carts/{cart_id}/finish"),
            Some(&alice),
            Some(json!({ "payment_token": "tok_visa" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{cart}");
    assert_eq!(cart["state"], "finished");
    assert_eq!(cart["is_active"], false);
    assert!(cart["date_finished"].is_string());
    assert!(cart["payment_reference"].is_string());
    assert_eq!(t.product_quantity(&product_id).await, 2);

    let (_, history) = t.send("GET", "/carts/history", Some(&alice), None).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    let (_, active) = t.send("GET", "/carts", Some(&alice), None).await;
    assert!(active.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_insufficient_stock_is_conflict() {
    let t = TestApp::new();
    let staff = t.staff_token().await;
    let (_, alice) = t.register("alice").await;
    let product_id = t.create_product(&staff, "RUN-001", 2).await;

    let cart = t.create_cart(&alice, &product_id, 3).await;
    let cart_id = cart["id"].as_str().unwrap();

    let (status, json) = t
        .send("GET", &format!("/carts/{cart_id}/finish"), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);
    assert_eq!(json["retryable"], false);
    assert!(json["details"].as_str().unwrap().contains("Insufficient stock"));
    assert_eq!(t.product_quantity(&product_id).await, 2);

    let (_, cart) = t
        .send("GET", &format!("/carts/{cart_id}"), Some(&alice), None)
        .await;
    assert_eq!(cart["state"], "open");
}

#[tokio::test]
async fn test_double_submit_is_conflict() {
    let t = TestApp::new();
    let staff = t.staff_token().await;
    let (_, alice) = t.register("alice").await;
    let product_id = t.create_product(&staff, "RUN-001", 5).await;
    let cart = t.create_cart(&alice, &product_id, 2).await;
    let uri = format!("/carts/{}/finish", cart["id"].as_str().unwrap());

    let (status, _) = t.send("GET", &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, json) = t.send("GET", &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["details"], "Cart already submitted");
    assert_eq!(t.product_quantity(&product_id).await, 3);
}

#[tokio::test]
async fn test_unavailable_variant_is_bad_request() {
    let t = TestApp::new();
    let staff = t.staff_token().await;
    let (_, alice) = t.register("alice").await;
    let product_id = t.create_product(&staff, "RUN-001", 5).await;

    let (status, json) = t
        .send(
            "POST",
            "/carts",
            Some(&alice),
            Some(json!({
                "items": [{ "product_id": product_id, "quantity": 1, "color": "green", "size": 40 }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(t.store.cart_count().await, 0);
}

#[tokio::test]
async fn test_authentication_required() {
    let t = TestApp::new();

    let (status, json) = t.send("GET", "/carts", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);

    let (status, _) = t.send("GET", "/carts", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cart_ownership() {
    let t = TestApp::new();
    let staff = t.staff_token().await;
    let (_, alice) = t.register("alice").await;
    let (_, mallory) = t.register("mallory").await;
    let product_id = t.create_product(&staff, "RUN-001", 5).await;
    let cart = t.create_cart(&alice, &product_id, 1).await;
    let cart_id = cart["id"].as_str().unwrap();

    let (status, _) = t
        .send("GET", &format!("/carts/{cart_id}"), Some(&mallory), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Staff can look but not touch
    let (status, _) = t
        .send("GET", &format!("/carts/{cart_id}"), Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t
        .send("GET", &format!("/carts/{cart_id}/finish"), Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t
        .send("DELETE", &format!("/carts/{cart_id}"), Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(t.product_quantity(&product_id).await, 5);
}

#[tokio::test]
async fn test_cancel_restocks_submitted_cart() {
    let t = TestApp::new();
    let staff = t.staff_token().await;
    let (_, alice) = t.register("alice").await;
    let product_id = t.create_product(&staff, "RUN-001", 5).await;
    let cart = t.create_cart(&alice, &product_id, 4).await;
    let cart_id = cart["id"].as_str().unwrap();

    t.send("GET", &format!("/carts/{cart_id}/finish"), Some(&alice), None)
        .await;
    assert_eq!(t.product_quantity(&product_id).await, 1);

    let (status, json) = t
        .send("DELETE", &format!("/carts/{cart_id}"), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "success": true }));
    assert_eq!(t.product_quantity(&product_id).await, 5);
}

#[tokio::test]
async fn test_cart_item_endpoints() {
    let t = TestApp::new();
    let staff = t.staff_token().await;
    let (_, alice) = t.register("alice").await;
    let product_id = t.create_product(&staff, "RUN-001", 5).await;
    let cart = t.create_cart(&alice, &product_id, 1).await;
    let cart_id = cart["id"].as_str().unwrap();

    let (status, item) = t
        .send(
            "POST",
            "/cart_item",
            Some(&alice),
            Some(json!({
                "cart_id": cart_id,
                "product_id": product_id,
                "quantity": 2,
                "color": "blue",
                "size": 42
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{item}");
    assert_eq!(item["price_cents"], 2000);
    let item_id = item["id"].as_str().unwrap();

    let (status, item) = t
        .send(
            "PATCH",
            &format!("/cart_item/{item_id}"),
            Some(&alice),
            Some(json!({ "quantity": 4 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["quantity"], 4);
    assert_eq!(item["color"], "blue");
    assert_eq!(item["price_cents"], 4000);

    let (status, _) = t
        .send(
            "PATCH",
            &format!("/cart_item/{item_id}"),
            Some(&alice),
            Some(json!({ "size": 41 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .send("DELETE", &format!("/cart_item/{item_id}"), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t
        .send("GET", &format!("/cart_item/{item_id}"), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_product_writes_are_staff_only() {
    let t = TestApp::new();
    let staff = t.staff_token().await;
    let (_, alice) = t.register("alice").await;
    let product_id = t.create_product(&staff, "RUN-001", 5).await;

    let (status, _) = t
        .send(
            "PATCH",
            &format!("/products/{product_id}"),
            Some(&alice),
            Some(json!({ "price_cents": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = t
        .send(
            "PATCH",
            &format!("/products/{product_id}"),
            Some(&staff),
            Some(json!({ "price_cents": 1500 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["price_cents"], 1500);

    let (status, json) = t
        .send(
            "POST",
            "/products",
            Some(&staff),
            Some(json!({
                "name": "Clone",
                "name_ar": "نسخة",
                "description": "Same sku",
                "description_ar": "نفس",
                "colors": "red",
                "colors_ar": "أحمر",
                "sizes": "40",
                "price_cents": 100,
                "quantity": 1,
                "sku": "RUN-001"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["details"], "sku already exists");
}

#[tokio::test]
async fn test_product_list_filters_and_wishlist_flag() {
    let t = TestApp::new();
    let staff = t.staff_token().await;
    let (_, alice) = t.register("alice").await;
    let low = t.create_product(&staff, "LOW-1", 1).await;
    t.create_product(&staff, "HIGH-1", 50).await;

    let (status, json) = t.send("GET", "/products?quantity_min=10", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let products = json.as_array().unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["sku"], "HIGH-1");
    assert_eq!(products[0]["in_wishlist"], false);

    let (status, _) = t
        .send("POST", "/wishlist", Some(&alice), Some(json!({ "product_id": low })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, json) = t.send("GET", "/products?search=low", Some(&alice), None).await;
    assert_eq!(json[0]["in_wishlist"], true);
}

#[tokio::test]
async fn test_wishlist_uniqueness_and_ownership() {
    let t = TestApp::new();
    let staff = t.staff_token().await;
    let (alice_id, alice) = t.register("alice").await;
    let (_, bob) = t.register("bob").await;
    let product_id = t.create_product(&staff, "RUN-001", 5).await;

    let body = json!({ "product_id": product_id });
    let (status, item) = t
        .send("POST", "/wishlist", Some(&alice), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, json) = t.send("POST", "/wishlist", Some(&alice), Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);

    let (_, list) = t.send("GET", "/wishlist", Some(&alice), None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = t
        .send("GET", &format!("/users/{alice_id}/wishlist"), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t
        .send("GET", &format!("/users/{alice_id}/wishlist"), Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let remove = json!({ "id": item["id"] });
    let (status, _) = t
        .send("DELETE", "/wishlist", Some(&bob), Some(remove.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, json) = t.send("DELETE", "/wishlist", Some(&alice), Some(remove)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
}

#[tokio::test]
async fn test_user_profiles() {
    let t = TestApp::new();
    let (alice_id, alice) = t.register("alice").await;
    let (bob_id, bob) = t.register("bob").await;

    let (status, json) = t
        .send("GET", &format!("/users/{bob_id}"), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["username"], "bob");
    assert!(json.get("api_token").is_none());

    let (status, _) = t
        .send(
            "PATCH",
            &format!("/users/{bob_id}"),
            Some(&alice),
            Some(json!({ "first_name": "Eve" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = t
        .send(
            "PATCH",
            &format!("/users/{alice_id}"),
            Some(&alice),
            Some(json!({ "phone": "+20 100 123 4567" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["phone"], "+20 100 123 4567");

    let (status, _) = t
        .send(
            "POST",
            "/users",
            None,
            Some(json!({ "username": "alice" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Deactivated users can no longer authenticate
    let (status, _) = t
        .send("DELETE", &format!("/users/{bob_id}"), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t.send("GET", "/carts", Some(&bob), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_feedback() {
    let t = TestApp::new();
    let staff = t.staff_token().await;
    let (_, alice) = t.register("alice").await;

    let (status, _) = t
        .send(
            "POST",
            "/feedback",
            None,
            Some(json!({ "email": "visitor@example.com", "message": "Great shoes" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = t
        .send(
            "POST",
            "/feedback",
            None,
            Some(json!({ "email": "not-an-email", "message": "Hi" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.send("GET", "/feedback", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, json) = t.send("GET", "/feedback", Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let t = TestApp::new();
    let (_, alice) = t.register("alice").await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/carts")
                .header("authorization", format!("Bearer {alice}"))
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_cart_is_not_found() {
    let t = TestApp::new();
    let (_, alice) = t.register("alice").await;
    let missing = common::CartId::new();

    let (status, json) = t
        .send("GET", &format!("/carts/{missing}/finish"), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_taxonomy_endpoints_and_product_filters() {
    let t = TestApp::new();
    let staff = t.staff_token().await;
    let (_, alice) = t.register("alice").await;

    let (status, _) = t
        .send(
            "POST",
            "/products/brands",
            Some(&alice),
            Some(json!({ "name": "Acme", "name_ar": "أكمي" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let brand = t
        .create_entry(&staff, "brands", json!({ "name": "Acme", "name_ar": "أكمي" }))
        .await;
    let category = t
        .create_entry(&staff, "categories", json!({ "name": "Shoes", "name_ar": "أحذية" }))
        .await;
    let sub_category = t
        .create_entry(
            &staff,
            "sub-categories",
            json!({ "name": "Running", "name_ar": "جري", "categories": [category] }),
        )
        .await;

    let (status, json) = t
        .send("GET", &format!("/products/sub-categories/{sub_category}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["categories"], json!([category]));

    let mut body = product_body("RUN-001", 5);
    body["brand"] = json!(brand);
    body["category"] = json!(category);
    body["sub_category"] = json!(sub_category);
    let (status, tagged) = t.send("POST", "/products", Some(&staff), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{tagged}");
    t.create_product(&staff, "PLAIN-1", 5).await;

    for query in [
        format!("brand={brand}"),
        format!("category={category}"),
        format!("sub_category={sub_category}"),
    ] {
        let (status, json) = t.send("GET", &format!("/products?{query}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        let products = json.as_array().unwrap();
        assert_eq!(products.len(), 1, "{query}");
        assert_eq!(products[0]["sku"], "RUN-001");
    }

    let mut body = product_body("RUN-002", 5);
    body["brand"] = json!(common::BrandId::new());
    let (status, json) = t.send("POST", "/products", Some(&staff), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["details"], "Referenced brand does not exist");

    let (status, json) = t
        .send(
            "PATCH",
            &format!("/products/categories/{category}"),
            Some(&staff),
            Some(json!({ "name": "Footwear" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Footwear");
    assert_eq!(json["name_ar"], "أحذية");

    let (status, _) = t
        .send("DELETE", &format!("/products/brands/{brand}"), Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t
        .send("GET", &format!("/products/brands/{brand}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let product_id = tagged["id"].as_str().unwrap();
    let (_, json) = t
        .send("GET", &format!("/products/{product_id}"), None, None)
        .await;
    assert_eq!(json["brand"], Value::Null);
    assert_eq!(json["category"], json!(category));
}

#[tokio::test]
async fn test_discounts_drive_discounted_listing() {
    let t = TestApp::new();
    let staff = t.staff_token().await;
    let on_sale = t.create_product(&staff, "SALE-1", 5).await;
    let expired = t.create_product(&staff, "OLD-1", 5).await;

    let discount = t
        .create_entry(
            &staff,
            "discounts",
            json!({ "product_id": on_sale, "finish_date": "2099-01-01", "percentage": 20 }),
        )
        .await;
    t.create_entry(
        &staff,
        "discounts",
        json!({ "product_id": expired, "finish_date": "2000-01-01", "percentage": 20 }),
    )
    .await;

    let (status, json) = t
        .send(
            "POST",
            "/products/discounts",
            Some(&staff),
            Some(json!({ "product_id": on_sale, "finish_date": "2099-01-01", "percentage": 20 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["details"], "discount already exists");

    let (status, _) = t
        .send(
            "POST",
            "/products/discounts",
            Some(&staff),
            Some(json!({ "product_id": on_sale, "finish_date": "2099-01-01", "percentage": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = t.send("GET", "/products/has_discount", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = json.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["sku"], "SALE-1");
    assert_eq!(listed[0]["discounts"][0]["percentage"], 20);

    let (_, json) = t
        .send("GET", &format!("/products/{expired}"), None, None)
        .await;
    assert_eq!(json["discounts"], json!([]));

    let (status, json) = t
        .send(
            "PATCH",
            &format!("/products/discounts/{discount}"),
            Some(&staff),
            Some(json!({ "percentage": 35 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["percentage"], 35);

    let (_, json) = t
        .send("GET", &format!("/products/discounts?product={on_sale}"), None, None)
        .await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (status, _) = t
        .send("DELETE", &format!("/products/discounts/{discount}"), Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = t.send("GET", "/products/has_discount", None, None).await;
    assert!(json.as_array().unwrap().is_empty());
}
