mod common;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use common::add_product;
use marketplace_checkout::{
    config::AppConfig,
    middleware::auth::{ROLE_ADMIN, ROLE_PAYMENT_GATEWAY, issue_token},
    repository::memory::MemoryCatalog,
    routes::create_app,
    services::inventory::MemoryInventory,
    state::AppState,
};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "http-test-secret";

struct Api {
    app: Router,
    product_id: Uuid,
}

async fn api() -> Api {
    let catalog = Arc::new(MemoryCatalog::new());
    let inventory = Arc::new(MemoryInventory::new(Duration::from_secs(300)));
    let product_id = add_product(&catalog, &inventory, dec!(120), None, 5, None).await;
    let state = AppState::in_memory(AppConfig::for_tests(SECRET), catalog, inventory);
    Api {
        app: create_app(state),
        product_id,
    }
}

fn token(user_id: Uuid, role: &str) -> String {
    issue_token(SECRET, user_id, role, 300).unwrap()
}

enum Caller<'a> {
    Anonymous,
    Guest(&'a str),
    Bearer(String),
}

async fn send(app: &Router, method: Method, uri: &str, caller: Caller<'_>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    match caller {
        Caller::Anonymous => {}
        Caller::Guest(session) => request = request.header("x-session-id", session),
        Caller::Bearer(token) => request = request.header(header::AUTHORIZATION, format!("Bearer {token}")),
    }
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn guest_cart_round_trip() {
    let api = api().await;

    let (status, body) = send(
        &api.app,
        Method::POST,
        "/api/cart/items",
        Caller::Guest("guest-1"),
        Some(json!({ "product_id": api.product_id, "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["quantity"], 2);

    let (status, body) = send(&api.app, Method::GET, "/api/cart", Caller::Guest("guest-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["subtotal"], "240");

    let uri = format!("/api/cart/items/{}", api.product_id);
    let (status, body) = send(
        &api.app,
        Method::PATCH,
        &uri,
        Caller::Guest("guest-1"),
        Some(json!({ "quantity": 50 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["quantity"], 5, "clamped to stock");

    let (status, _) = send(&api.app, Method::DELETE, &uri, Caller::Guest("guest-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&api.app, Method::DELETE, &uri, Caller::Guest("guest-1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["code"], "not_found");
}

#[tokio::test]
async fn cart_without_identity_is_unauthorized() {
    let api = api().await;
    let (status, body) = send(&api.app, Method::GET, "/api/cart", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["data"]["code"], "unauthorized");
}

#[tokio::test]
async fn guest_cannot_check_out() {
    let api = api().await;
    let (status, body) = send(
        &api.app,
        Method::POST,
        "/api/checkout",
        Caller::Guest("guest-2"),
        Some(json!({ "shipping_address": "1 Guest Lane" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["data"]["code"], "unauthorized");
}

#[tokio::test]
async fn empty_cart_checkout_is_a_typed_error() {
    let api = api().await;
    let (status, body) = send(
        &api.app,
        Method::POST,
        "/api/checkout",
        Caller::Bearer(token(Uuid::new_v4(), "user")),
        Some(json!({ "shipping_address": "2 Empty Road" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["code"], "empty_cart");
}

#[tokio::test]
async fn unknown_promo_code_is_unprocessable() {
    let api = api().await;
    let user = token(Uuid::new_v4(), "user");
    send(
        &api.app,
        Method::POST,
        "/api/cart/items",
        Caller::Bearer(user.clone()),
        Some(json!({ "product_id": api.product_id, "quantity": 1 })),
    )
    .await;

    let (status, body) = send(
        &api.app,
        Method::POST,
        "/api/checkout",
        Caller::Bearer(user),
        Some(json!({ "promo_code": "ghost", "shipping_address": "3 Promo St" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["data"]["code"], "invalid_promo_code");
    assert_eq!(body["data"]["details"]["promo_code"], "GHOST");
}

#[tokio::test]
async fn checkout_payment_and_admin_lifecycle() {
    let api = api().await;
    let buyer_id = Uuid::new_v4();
    let buyer = token(buyer_id, "user");
    let admin = token(Uuid::new_v4(), ROLE_ADMIN);
    let gateway = token(Uuid::new_v4(), ROLE_PAYMENT_GATEWAY);

    // Guest fills a cart, then signs in and merges it.
    send(
        &api.app,
        Method::POST,
        "/api/cart/items",
        Caller::Guest("pre-login"),
        Some(json!({ "product_id": api.product_id, "quantity": 2 })),
    )
    .await;
    let merge = Request::builder()
        .method(Method::POST)
        .uri("/api/cart/merge")
        .header(header::AUTHORIZATION, format!("Bearer {buyer}"))
        .header("x-session-id", "pre-login")
        .body(Body::empty())
        .unwrap();
    let response = api.app.clone().oneshot(merge).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, body) = send(
        &api.app,
        Method::POST,
        "/api/checkout",
        Caller::Bearer(buyer.clone()),
        Some(json!({ "shipping_address": "4 Buyer Ave" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["order"]["order"]["grand_total"], "240");
    assert!(
        body["data"]["invoice_number"]
            .as_str()
            .unwrap()
            .starts_with("INV-")
    );

    let (status, body) = send(&api.app, Method::GET, "/api/orders", Caller::Bearer(buyer.clone()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);

    let order_uri = format!("/api/orders/{order_id}");
    let (status, _) = send(
        &api.app,
        Method::GET,
        &order_uri,
        Caller::Bearer(token(Uuid::new_v4(), "user")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "other users cannot see the order");

    let payment_uri = format!("/api/orders/{order_id}/payment");
    let (status, body) = send(
        &api.app,
        Method::POST,
        &payment_uri,
        Caller::Bearer(buyer.clone()),
        Some(json!({ "status": "paid" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["data"]["code"], "forbidden");

    let (status, body) = send(
        &api.app,
        Method::POST,
        &payment_uri,
        Caller::Bearer(gateway),
        Some(json!({ "status": "paid" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order"]["status"], "confirmed");
    assert_eq!(body["data"]["order"]["payment_status"], "paid");

    let status_uri = format!("/api/orders/{order_id}/status");
    let (status, body) = send(
        &api.app,
        Method::PATCH,
        &status_uri,
        Caller::Bearer(admin.clone()),
        Some(json!({ "status": "delivered" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["data"]["code"], "invalid_transition");
    assert_eq!(body["data"]["details"]["from"], "confirmed");

    let (status, _) = send(
        &api.app,
        Method::PATCH,
        &status_uri,
        Caller::Bearer(admin.clone()),
        Some(json!({ "status": "processing" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &api.app,
        Method::POST,
        &format!("/api/orders/{order_id}/cancel"),
        Caller::Bearer(buyer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order"]["status"], "cancelled");

    let (status, body) = send(
        &api.app,
        Method::GET,
        &format!("/api/orders/{order_id}/commissions"),
        Caller::Bearer(admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // The product has no seller, so nothing is owed.
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_route_falls_back_to_not_found() {
    let api = api().await;
    let (status, body) = send(&api.app, Method::GET, "/api/nope", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["path"], "/api/nope");
}
