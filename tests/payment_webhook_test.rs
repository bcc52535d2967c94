mod common;

use axum::http::StatusCode;
use common::{failed_event, response_json, succeeded_event, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use storefront_api::entities::{
    invoice, order, payment_transaction, InvoiceStatus, PaymentStatus, TransactionStatus,
};
use uuid::Uuid;

struct Placed {
    order_id: Uuid,
    intent_id: String,
}

async fn place_order(app: &TestApp) -> Placed {
    let (_, token) = app.user();
    let product = app.seed_product("Field Journal", dec!(90), 5).await;
    app.add_to_cart(&token, product.id, 1).await;
    let response = app.checkout(&token).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    Placed {
        order_id: body["data"]["order"]["id"].as_str().unwrap().parse().unwrap(),
        intent_id: body["data"]["paymentIntent"]["id"].as_str().unwrap().to_string(),
    }
}

async fn transaction_for(app: &TestApp, intent_id: &str) -> payment_transaction::Model {
    payment_transaction::Entity::find()
        .filter(payment_transaction::Column::PaymentIntentId.eq(intent_id))
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("transaction for intent")
}

#[tokio::test]
async fn succeeded_event_settles_order_invoice_and_transaction_idempotently() {
    let app = TestApp::new().await;
    let placed = place_order(&app).await;
    let event = succeeded_event(&placed.intent_id);

    let response = app.webhook(&event, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!({ "received": true }));

    let tx = transaction_for(&app, &placed.intent_id).await;
    assert_eq!(tx.status, TransactionStatus::Successful);
    assert!(tx.paid_at.is_some());
    assert_eq!(tx.charge_id.as_deref(), Some(format!("ch_{}", placed.intent_id).as_str()));
    let first_paid_at = tx.paid_at;

    let db = &*app.state.db;
    let order = order::Entity::find_by_id(placed.order_id)
        .one(db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    let invoice = invoice::Entity::find()
        .filter(invoice::Column::OrderId.eq(placed.order_id))
        .one(db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Paid);
    assert!(invoice.paid_at.is_some());

    // redelivery is acknowledged and changes nothing
    let response = app.webhook(&event, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let tx = transaction_for(&app, &placed.intent_id).await;
    assert_eq!(tx.status, TransactionStatus::Successful);
    assert_eq!(tx.paid_at, first_paid_at);
    assert_eq!(app.count(payment_transaction::Entity).await, 1);

    // a late failure cannot regress a settled payment
    let response = app.webhook(&failed_event(&placed.intent_id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let tx = transaction_for(&app, &placed.intent_id).await;
    assert_eq!(tx.status, TransactionStatus::Successful);
}

#[tokio::test]
async fn failed_event_marks_only_the_transaction() {
    let app = TestApp::new().await;
    let placed = place_order(&app).await;

    let response = app.webhook(&failed_event(&placed.intent_id), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let tx = transaction_for(&app, &placed.intent_id).await;
    assert_eq!(tx.status, TransactionStatus::Failed);
    let order = order::Entity::find_by_id(placed.order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    // the customer retried and the gateway reports success
    app.webhook(&succeeded_event(&placed.intent_id), None).await;
    let tx = transaction_for(&app, &placed.intent_id).await;
    assert_eq!(tx.status, TransactionStatus::Successful);
}

#[tokio::test]
async fn events_for_unknown_intents_are_acknowledged() {
    let app = TestApp::new().await;
    let placed = place_order(&app).await;

    let response = app.webhook(&succeeded_event("pi_from_elsewhere"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["received"], true);

    let tx = transaction_for(&app, &placed.intent_id).await;
    assert_eq!(tx.status, TransactionStatus::Initiated);
}

#[tokio::test]
async fn unrelated_event_types_are_acknowledged() {
    let app = TestApp::new().await;
    let event = json!({
        "id": "evt_customer",
        "type": "customer.created",
        "data": { "object": { "id": "cus_123" } }
    });
    let response = app.webhook(&event, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn bad_signatures_are_rejected_before_any_state_change() {
    let app = TestApp::new().await;
    let placed = place_order(&app).await;
    let event = succeeded_event(&placed.intent_id);

    let forged = format!("t={},v1={}", chrono::Utc::now().timestamp(), "00".repeat(32));
    let response = app.webhook(&event, Some(&forged)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_SIGNATURE");

    let response = app.webhook(&event, Some("garbage")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let ancient = format!("t={},v1={}", i64::MIN, "00".repeat(32));
    let response = app.webhook(&event, Some(&ancient)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(response).await["error"]["code"], "INVALID_SIGNATURE");

    let tx = transaction_for(&app, &placed.intent_id).await;
    assert_eq!(tx.status, TransactionStatus::Initiated);
}

#[tokio::test]
async fn missing_signature_header_is_rejected() {
    let app = TestApp::new().await;
    let response = app
        .request(
            axum::http::Method::POST,
            "/api/v1/payments/webhooks",
            Some(succeeded_event("pi_fake_1")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_SIGNATURE");
}
