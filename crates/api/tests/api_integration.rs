//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use checkout::{CheckoutSettings, PaymentMode};
use common::Money;
use domain::{Coupon, Experiment, Product};
use event_log::InMemoryEventRecorder;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{CommerceStore, InMemoryCommerceStore};
use tower::ServiceExt;

type TestState = Arc<AppState<InMemoryCommerceStore, InMemoryEventRecorder>>;

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

fn setup_with_settings(settings: CheckoutSettings) -> (axum::Router, TestState) {
    let state = api::create_default_state(settings);
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

fn setup() -> (axum::Router, TestState) {
    setup_with_settings(CheckoutSettings::default())
}

async fn seed(state: &TestState) {
    state
        .store
        .upsert_product(&Product::limited(
            "SKU-001",
            "Widget",
            Money::from_cents(1000),
            1,
        ))
        .await
        .unwrap();
    state
        .store
        .upsert_product(&Product::unlimited(
            "SKU-002",
            "E-book",
            Money::from_cents(500),
        ))
        .await
        .unwrap();
    state
        .store
        .insert_coupon(&Coupon::percent("TENOFF", 10))
        .await
        .unwrap();
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn checkout_body(token: &str) -> Value {
    json!({
        "cart_token": token,
        "customer": {
            "name": "Grace Hopper",
            "email": "grace@example.com",
            "phone": "555-0100",
            "address": {
                "line1": "1 Navy Yard",
                "city": "Arlington",
                "postal_code": "22202",
                "country": "US"
            }
        }
    })
}

async fn add_item(app: &axum::Router, token: &str, product_id: &str, quantity: u32) {
    let (status, _) = send(
        app,
        "POST",
        &format!("/carts/{token}/items"),
        Some(json!({ "product_id": product_id, "quantity": quantity })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();
    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_cart_item_lifecycle() {
    let (app, state) = setup();
    seed(&state).await;

    add_item(&app, "cart-1", "SKU-002", 2).await;
    add_item(&app, "cart-1", "SKU-002", 1).await;
    let (_, cart) = send(&app, "GET", "/carts/cart-1", None).await;
    assert_eq!(cart["items"][0]["quantity"], 3);
    assert_eq!(cart["subtotal"], 1500);

    let (status, cart) = send(
        &app,
        "PATCH",
        "/carts/cart-1/items/SKU-002",
        Some(json!({ "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["subtotal"], 500);

    let (status, cart) = send(&app, "DELETE", "/carts/cart-1/items/SKU-002", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);

    let (status, _) = send(&app, "DELETE", "/carts/cart-1/items/SKU-002", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_add_unknown_product() {
    let (app, _) = setup();
    let (status, json) = send(
        &app,
        "POST",
        "/carts/cart-1/items",
        Some(json!({ "product_id": "NOPE", "quantity": 1 })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("NOPE"));
}

#[tokio::test]
async fn test_add_item_quantity_overflow_is_rejected() {
    let (app, state) = setup();
    seed(&state).await;
    add_item(&app, "cart-1", "SKU-002", u32::MAX).await;

    let (status, _) = send(
        &app,
        "POST",
        "/carts/cart-1/items",
        Some(json!({ "product_id": "SKU-002", "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, cart) = send(&app, "GET", "/carts/cart-1", None).await;
    assert_eq!(cart["items"][0]["quantity"], u32::MAX);
}

#[tokio::test]
async fn test_apply_and_clear_coupon() {
    let (app, state) = setup();
    seed(&state).await;
    add_item(&app, "cart-1", "SKU-002", 4).await;

    let (status, json) = send(
        &app,
        "POST",
        "/carts/cart-1/coupon",
        Some(json!({ "code": "tenoff" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["code"], "TENOFF");
    assert_eq!(json["discount"], 200);

    let (_, cart) = send(&app, "GET", "/carts/cart-1", None).await;
    assert_eq!(cart["applied_coupon"], "TENOFF");

    let (status, _) = send(&app, "DELETE", "/carts/cart-1/coupon", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, cart) = send(&app, "GET", "/carts/cart-1", None).await;
    assert_eq!(cart["applied_coupon"], Value::Null);
}

#[tokio::test]
async fn test_rejected_coupon_reports_reason() {
    let (app, state) = setup();
    seed(&state).await;
    add_item(&app, "cart-1", "SKU-002", 1).await;

    let (status, json) = send(
        &app,
        "POST",
        "/carts/cart-1/coupon",
        Some(json!({ "code": "EXPIRED" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["status"], "coupon");
    assert_eq!(json["reason"], "not_found");
}

#[tokio::test]
async fn test_checkout_and_get_order() {
    let (app, state) = setup();
    seed(&state).await;
    add_item(&app, "cart-1", "SKU-001", 1).await;
    add_item(&app, "cart-1", "SKU-002", 2).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/checkout")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_string(&checkout_body("cart-1")).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let receipt: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(receipt["redirect"], location.as_str());
    assert_eq!(receipt["total_amount"], 2000);

    let (status, order) = send(&app, "GET", &location, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["payment_status"], "pending");
    assert_eq!(order["order_number"], receipt["order_number"]);
}

#[tokio::test]
async fn test_checkout_out_of_stock() {
    let (app, state) = setup();
    seed(&state).await;
    add_item(&app, "cart-1", "SKU-001", 1).await;
    add_item(&app, "cart-2", "SKU-001", 1).await;

    let (status, _) = send(&app, "POST", "/checkout", Some(checkout_body("cart-1"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = send(&app, "POST", "/checkout", Some(checkout_body("cart-2"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["status"], "stock");
}

#[tokio::test]
async fn test_checkout_failure_statuses() {
    let (app, state) = setup();
    seed(&state).await;

    let (status, json) = send(&app, "POST", "/checkout", Some(checkout_body("empty"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["status"], "empty");

    add_item(&app, "cart-1", "SKU-002", 1).await;
    let mut body = checkout_body("cart-1");
    body["customer"]["phone"] = json!("");
    let (status, json) = send(&app, "POST", "/checkout", Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["status"], "address_required");
}

#[tokio::test]
async fn test_checkout_without_payment_gateway() {
    let (app, state) = setup_with_settings(CheckoutSettings {
        payment: PaymentMode::Gateway { url: None },
        ..CheckoutSettings::default()
    });
    seed(&state).await;
    add_item(&app, "cart-1", "SKU-002", 1).await;

    let (status, json) = send(&app, "POST", "/checkout", Some(checkout_body("cart-1"))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "payment_unavailable");
}

#[tokio::test]
async fn test_payment_status_transitions() {
    let (app, state) = setup();
    seed(&state).await;
    add_item(&app, "cart-1", "SKU-002", 1).await;
    let (_, receipt) = send(&app, "POST", "/checkout", Some(checkout_body("cart-1"))).await;
    let uri = format!("{}/payment", receipt["redirect"].as_str().unwrap());

    let (status, order) = send(&app, "POST", &uri, Some(json!({ "status": "paid" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["payment_status"], "paid");

    let (status, _) = send(&app, "POST", &uri, Some(json!({ "status": "pending" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invalid_order_id_format() {
    let (app, _) = setup();
    let (status, _) = send(&app, "GET", "/orders/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "GET",
        "/orders/00000000-0000-0000-0000-000000000000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_experiment_assignment() {
    let (app, state) = setup();
    let mut experiment = Experiment::new("checkout_promo", "Checkout promo");
    experiment.enabled = true;
    experiment.coupon_code_a = Some("PROMO-A".to_string());
    experiment.coupon_code_b = Some("PROMO-B".to_string());
    state.store.save_experiment(&experiment).await.unwrap();

    let uri = "/experiments/checkout_promo/assignments";
    let (status, first) = send(&app, "POST", uri, Some(json!({ "session_token": "s-1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["assigned"], true);

    let (_, second) = send(&app, "POST", uri, Some(json!({ "session_token": "s-1" }))).await;
    assert_eq!(first["variant"], second["variant"]);

    let (status, _) = send(
        &app,
        "POST",
        "/experiments/missing/assignments",
        Some(json!({ "session_token": "s-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_get_patch_and_promote() {
    let (app, state) = setup();
    state
        .checkout
        .experiments()
        .ensure_definition("checkout_promo", "Checkout promo")
        .await
        .unwrap();
    let uri = "/admin/experiments/checkout_promo";

    let (status, report) = send(&app, "GET", &format!("{uri}?days=500"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["stats"]["windowDays"], 180);
    assert_eq!(report["stats"]["suggestedWinner"], Value::Null);

    let (status, experiment) = send(
        &app,
        "PATCH",
        uri,
        Some(json!({ "enabled": true, "traffic": 150, "couponCodeA": "promo-a" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(experiment["enabled"], true);
    assert_eq!(experiment["traffic_percent"], 100);
    assert_eq!(experiment["split_percent_a"], 50);
    assert_eq!(experiment["coupon_code_a"], "PROMO-A");
    assert_eq!(experiment["version"], 2);

    let (status, json) = send(
        &app,
        "POST",
        uri,
        Some(json!({ "action": "activate_winner", "days": 30 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("tied"));

    let (status, _) = send(&app, "POST", uri, Some(json!({ "action": "explode" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
