use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use storefront::config::StaffAccount;
use storefront::notify::Outbox;
use storefront::store::memory::MemoryStore;
use storefront::{router, seed, AppState, Config};

const PASSWORD: &str = "Sup3r$ecret";

struct TestApp {
    router: Router,
    outbox: Arc<Outbox>,
}

fn money(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestApp {
    async fn new() -> Self {
        let staff = |email: &str| Some(StaffAccount { email: email.into(), password: PASSWORD.into() });
        let config = Config { product_manager: staff("pm@shop.io"), sales_manager: staff("sm@shop.io"), ..Config::default() };
        let outbox = Arc::new(Outbox::default());
        let state = AppState::new(config, Arc::new(MemoryStore::default()), outbox.clone()).unwrap();
        seed::bootstrap_staff(&state).await.unwrap();
        Self { router: router(state), outbox }
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
        self.call_with(method, uri, token, &[], body).await
    }

    async fn call_with(&self, method: Method, uri: &str, token: Option<&str>, extra: &[(&str, &str)], body: Option<Value>) -> Reply {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in extra {
            req = req.header(*name, *value);
        }
        let req = match body {
            Some(body) => req.header(header::CONTENT_TYPE, "application/json").body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }.unwrap();

        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Reply { status, headers, body }
    }

    async fn login(&self, email: &str, session_key: Option<&str>) -> String {
        let extra: Vec<(&str, &str)> = session_key.map(|k| ("x-session-key", k)).into_iter().collect();
        let res = self.call_with(Method::POST, "/api/auth/login", None, &extra, Some(json!({"email": email, "password": PASSWORD}))).await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        res.body["token"].as_str().unwrap().to_string()
    }

    async fn register(&self, username: &str) -> String {
        let email = format!("{username}@example.com");
        let res = self.call(Method::POST, "/api/auth/register", None, Some(json!({
            "username": username, "email": email, "password": PASSWORD,
        }))).await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
        email
    }

    /// Creates a product as the product manager and prices it as the sales manager.
    async fn listed_product(&self, pm: &str, sm: &str, serial: &str, stock: i64) -> String {
        let res = self.call(Method::POST, "/api/admin/products", Some(pm), Some(json!({
            "name": "Walnut Desk", "serial_number": serial, "quantity_in_stock": stock,
        }))).await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
        assert_eq!(res.body["is_active"], false);
        let id = res.body["id"].as_str().unwrap().to_string();

        let res = self.call(Method::PUT, &format!("/api/admin/products/{id}/pricing"), Some(sm), Some(json!({
            "price": "250.00", "discount_percent": "10",
        }))).await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        assert_eq!(res.body["is_active"], true);
        id
    }
}

#[tokio::test]
async fn health_check() {
    let app = TestApp::new().await;
    let res = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "healthy");
}

#[tokio::test]
async fn purchase_review_and_refund_flow() {
    let app = TestApp::new().await;
    let pm = app.login("pm@shop.io", None).await;
    let sm = app.login("sm@shop.io", None).await;
    let product_id = app.listed_product(&pm, &sm, "DESK-1", 5).await;

    // Anonymous cart, merged at login.
    let res = app.call(Method::POST, "/api/cart/items", None, Some(json!({"product_id": product_id, "quantity": 2}))).await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    let session_key = res.headers.get("x-session-key").unwrap().to_str().unwrap().to_string();
    let email = app.register("alice").await;
    let token = app.login(&email, Some(&session_key)).await;
    let cart = app.call(Method::GET, "/api/cart", Some(&token), None).await;
    assert_eq!(cart.body["lines"].as_array().unwrap().len(), 1);
    assert_eq!(money(&cart.body["subtotal"]), Decimal::new(450, 0));

    // Checkout.
    let res = app.call(Method::POST, "/api/orders", Some(&token), Some(json!({"delivery_address": "1 Main St"}))).await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    assert_eq!(res.body["status"], "processing");
    assert_eq!(money(&res.body["total_price"]), Decimal::new(450, 0));
    let order_id = res.body["id"].as_str().unwrap().to_string();
    let emails = app.outbox.emails().await;
    assert!(emails.iter().any(|m| m.to == email && m.attachments.len() == 1));

    let invoice = app.call(Method::GET, &format!("/api/orders/{order_id}/invoice"), Some(&token), None).await;
    assert_eq!(invoice.status, StatusCode::OK);
    assert_eq!(invoice.headers[header::CONTENT_TYPE], "application/pdf");

    let product = app.call(Method::GET, &format!("/api/products/{product_id}"), None, None).await;
    assert_eq!(product.body["quantity_in_stock"], 3);
    assert_eq!(product.body["in_stock"], true);

    // Reviews wait for delivery.
    let review = json!({"rating": 5, "comment": "Sturdy and handsome"});
    let res = app.call(Method::POST, &format!("/api/products/{product_id}/reviews"), Some(&token), Some(review.clone())).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    for status in ["in_transit", "delivered"] {
        let res = app.call(Method::PUT, &format!("/api/admin/orders/{order_id}/status"), Some(&pm), Some(json!({"status": status}))).await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        assert_eq!(res.body["status"], status);
    }
    let res = app.call(Method::PUT, &format!("/api/admin/orders/{order_id}/status"), Some(&pm), Some(json!({"status": "in_transit"}))).await;
    assert_eq!(res.status, StatusCode::CONFLICT);

    let res = app.call(Method::POST, &format!("/api/products/{product_id}/reviews"), Some(&token), Some(review)).await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    assert_eq!(res.body["status"], "pending");
    let detail = app.call(Method::GET, &format!("/api/products/{product_id}"), None, None).await;
    assert_eq!(detail.body["rating"]["count"], 1);
    assert!(detail.body["reviews"].as_array().unwrap().is_empty());

    // Refund restores stock.
    let res = app.call(Method::POST, &format!("/api/orders/{order_id}/refund"), Some(&token), Some(json!({"reason": "Scratched top"}))).await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    assert_eq!(money(&res.body["amount"]), Decimal::new(450, 0));
    let refund_id = res.body["id"].as_str().unwrap().to_string();

    let res = app.call(Method::POST, &format!("/api/admin/refunds/{refund_id}/approve"), Some(&pm), None).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    let res = app.call(Method::POST, &format!("/api/admin/refunds/{refund_id}/approve"), Some(&sm), None).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["status"], "approved");

    let product = app.call(Method::GET, &format!("/api/products/{product_id}"), None, None).await;
    assert_eq!(product.body["quantity_in_stock"], 5);
    let order = app.call(Method::GET, &format!("/api/orders/{order_id}"), Some(&token), None).await;
    assert_eq!(order.body["status"], "refunded");
    let history = app.call(Method::GET, &format!("/api/orders/{order_id}/refund"), Some(&token), None).await;
    assert_eq!(history.body.as_array().unwrap().len(), 1);

    let report = app.call(Method::GET, "/api/admin/reports/revenue", Some(&sm), None).await;
    assert_eq!(report.status, StatusCode::OK);
    assert_eq!(report.body["orders"], 0);
}

#[tokio::test]
async fn customer_cancels_processing_order() {
    let app = TestApp::new().await;
    let pm = app.login("pm@shop.io", None).await;
    let sm = app.login("sm@shop.io", None).await;
    let product_id = app.listed_product(&pm, &sm, "DESK-2", 1).await;
    let email = app.register("bob").await;
    let token = app.login(&email, None).await;

    let res = app.call(Method::POST, "/api/cart/items", Some(&token), Some(json!({"product_id": product_id, "quantity": 2}))).await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    app.call(Method::POST, "/api/cart/items", Some(&token), Some(json!({"product_id": product_id, "quantity": 1}))).await;
    let order = app.call(Method::POST, "/api/orders", Some(&token), Some(json!({"delivery_address": "2 Side St"}))).await;
    let order_id = order.body["id"].as_str().unwrap().to_string();

    let res = app.call(Method::POST, &format!("/api/orders/{order_id}/cancel"), Some(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "cancelled");
    let res = app.call(Method::POST, &format!("/api/orders/{order_id}/cancel"), Some(&token), None).await;
    assert_eq!(res.status, StatusCode::CONFLICT);

    let product = app.call(Method::GET, &format!("/api/products/{product_id}"), None, None).await;
    assert_eq!(product.body["quantity_in_stock"], 1);
}

#[tokio::test]
async fn access_control_and_input_filtering() {
    let app = TestApp::new().await;
    let email = app.register("carol").await;
    let token = app.login(&email, None).await;

    assert_eq!(app.call(Method::GET, "/api/orders", None, None).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.call(Method::GET, "/api/orders", Some("bogus"), None).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.call(Method::GET, "/api/admin/orders", Some(&token), None).await.status, StatusCode::FORBIDDEN);
    assert_eq!(app.call(Method::GET, "/api/admin/refunds", Some(&token), None).await.status, StatusCode::FORBIDDEN);

    let res = app.call(Method::GET, "/api/products?q=x%3B%20drop%20table%20users", None, None).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    let res = app.call(Method::GET, "/api/products?q=desk&sort=-price", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["total"], 0);

    let res = app.call(Method::POST, "/api/auth/login", None, Some(json!({"email": email, "password": "wrong"}))).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert!(res.body["error"].is_string());

    let res = app.call(Method::PUT, "/api/auth/profile", Some(&token), Some(json!({"home_address": "5 Oak Ave"}))).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["home_address"], "5 Oak Ave");
    assert!(res.body.get("password_hash").is_none());

    assert_eq!(app.call(Method::POST, "/api/auth/logout", Some(&token), None).await.status, StatusCode::NO_CONTENT);
    assert_eq!(app.call(Method::GET, "/api/auth/profile", Some(&token), None).await.status, StatusCode::UNAUTHORIZED);
}
