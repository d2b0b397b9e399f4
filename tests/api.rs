use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use booking_ledger::api::{self, AppState};
use booking_ledger::gateway::{MemoryGateway, SIGNATURE_HEADER, WebhookVerifier};
use booking_ledger::notify::ChannelNotifier;
use booking_ledger::payments::PaymentSettings;
use booking_ledger::{Ledger, MemoryStore, PaymentService};
use chrono::Utc;
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "whsec_api";

fn app() -> (Router, Arc<MemoryGateway>) {
    let gateway = Arc::new(MemoryGateway::new());
    let (notifier, _notices) = ChannelNotifier::new(16);
    let service = PaymentService::new(
        Ledger::new(Arc::new(MemoryStore::new())),
        gateway.clone(),
        WebhookVerifier::new(SECRET, Duration::from_secs(300)),
        Arc::new(notifier),
        PaymentSettings {
            currency: "usd".into(),
            link_return_url: "https://booking.example/return".into(),
        },
    );
    (api::router(AppState::new(service)), gateway)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn register(app: &Router, id: &str, total: f64) {
    let (status, _) = send(app, post("/bookings", json!({"bookingId": id, "totalAmount": total}))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn health() {
    let (app, _) = app();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn intent_flow_in_major_units() {
    let (app, gateway) = app();
    register(&app, "b1", 90.0).await;

    let (status, created) = send(
        &app,
        post("/payments/create-intent", json!({"bookingId": "b1", "amount": 90.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(created["clientSecret"].is_string());
    let intent_id = created["intentId"].as_str().unwrap().to_string();

    gateway.succeed_intent(&intent_id).await.unwrap();
    let (status, confirmed) = send(
        &app,
        post("/payments/confirm", json!({"bookingId": "b1", "intentId": intent_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["paymentStatus"], "paid");

    let (status, summary) = send(&app, get("/payments/b1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["amountPaid"], 90.0);
    assert_eq!(summary["paymentHistory"][0]["referenceId"], intent_id.as_str());
}

#[tokio::test]
async fn link_and_verify_by_query() {
    let (app, gateway) = app();
    register(&app, "b1", 90.0).await;

    let (status, link) = send(
        &app,
        post("/payments/link", json!({"bookingId": "b1", "option": "second_third"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(link["amount"], 30.0);
    let session_id = link["sessionId"].as_str().unwrap().to_string();

    gateway.complete_session(&session_id).await.unwrap();
    let (status, verified) = send(
        &app,
        get(&format!("/payments/verify-session?session_id={session_id}")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["paymentStatus"], "partially_paid");
    assert_eq!(verified["booking"]["paymentHistory"][0]["id"], link["entryId"]);
    assert_eq!(verified["booking"]["paymentHistory"][0]["status"], "succeeded");
}

#[tokio::test]
async fn checkout_session_and_verify_by_body() {
    let (app, gateway) = app();
    register(&app, "b1", 50.0).await;

    let (status, created) = send(
        &app,
        post(
            "/payments/checkout-session",
            json!({"bookingId": "b1", "amount": 50.0, "returnUrl": "https://booking.example/done"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(created["checkoutUrl"].as_str().unwrap().starts_with("https://"));
    let session_id = created["sessionId"].as_str().unwrap().to_string();

    gateway.complete_session(&session_id).await.unwrap();
    let (status, verified) = send(
        &app,
        post("/payments/verify-session", json!({"sessionId": session_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["paymentStatus"], "paid");
}

#[tokio::test]
async fn signed_webhook_is_acknowledged() {
    let (app, _) = app();
    register(&app, "b1", 90.0).await;

    let body = json!({
        "id": "evt_1",
        "type": "charge.succeeded",
        "data": {"object": {
            "id": "ch_1", "amount": 3000, "currency": "usd",
            "payment_intent": "pi_1", "metadata": {"booking_id": "b1"}
        }}
    })
    .to_string();
    let signature = WebhookVerifier::new(SECRET, Duration::from_secs(300))
        .sign(body.as_bytes(), Utc::now().timestamp());

    let request = Request::post("/payments/webhook")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(body))
        .unwrap();
    let (status, ack) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);
    assert_eq!(ack["applied"], 1);

    let (_, summary) = send(&app, get("/payments/b1")).await;
    assert_eq!(summary["amountPaid"], 30.0);
    assert_eq!(summary["paymentStatus"], "partially_paid");
}

#[tokio::test]
async fn unsigned_and_forged_webhooks_are_rejected() {
    let (app, _) = app();
    let body = json!({"id": "evt_1", "type": "customer.created", "data": {"object": {}}});

    let (status, error) = send(&app, post("/payments/webhook", body.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["kind"], "signature_invalid");

    let request = Request::post("/payments/webhook")
        .header(SIGNATURE_HEADER, "t=1,v1=00")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, error) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["kind"], "signature_invalid");
}

#[tokio::test]
async fn refund_errors_carry_kinds() {
    let (app, gateway) = app();
    register(&app, "b1", 90.0).await;

    let (status, error) = send(&app, post("/payments/refund", json!({"bookingId": "b1"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["kind"], "not_yet_paid");

    let (_, created) = send(
        &app,
        post("/payments/create-intent", json!({"bookingId": "b1", "amount": 30.0})),
    )
    .await;
    let intent_id = created["intentId"].as_str().unwrap().to_string();
    gateway.succeed_intent(&intent_id).await.unwrap();
    send(&app, post("/payments/confirm", json!({"bookingId": "b1", "intentId": intent_id}))).await;

    let (status, error) = send(
        &app,
        post("/payments/refund", json!({"bookingId": "b1", "amount": 60.0, "reason": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["kind"], "invalid_amount");
    assert!(gateway.refunds().await.is_empty());

    let (status, refunded) = send(
        &app,
        post("/payments/refund", json!({"bookingId": "b1", "reason": "cancelled"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refunded["paymentStatus"], "refunded");
    assert!(refunded["refundId"].is_string());

    let (status, error) = send(&app, post("/payments/refund", json!({"bookingId": "b1"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["kind"], "already_refunded");
}

#[tokio::test]
async fn unknown_booking_is_not_found() {
    let (app, _) = app();
    let (status, error) = send(&app, get("/payments/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["kind"], "not_found");

    let (status, error) = send(
        &app,
        post("/payments/create-intent", json!({"bookingId": "missing", "amount": 10.0})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["kind"], "not_found");
}

#[tokio::test]
async fn gateway_outage_is_service_unavailable() {
    let (app, gateway) = app();
    register(&app, "b1", 90.0).await;
    gateway.set_available(false);

    let (status, error) = send(
        &app,
        post("/payments/create-intent", json!({"bookingId": "b1", "amount": 10.0})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error["kind"], "gateway_unavailable");
}
