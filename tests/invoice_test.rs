mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, response_json, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::{json, Value};
use storefront_api::entities::{invoice_line_item, payment_transaction};
use uuid::Uuid;

async fn invoice_after_checkout(app: &TestApp, token: &str) -> Value {
    let product = app.seed_product("Ceramic Bowl", dec!(70), 10).await;
    app.add_to_cart(token, product.id, 2).await;
    let response = app.checkout(token).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await["data"]["invoice"].clone()
}

#[tokio::test]
async fn owners_list_and_read_their_invoices() {
    let app = TestApp::new().await;
    let (_, token) = app.user();
    let invoice = invoice_after_checkout(&app, &token).await;
    let invoice_id = invoice["id"].as_str().unwrap();

    let mine = response_json(
        app.request(Method::GET, "/api/v1/invoices/my", None, Some(&token)).await,
    )
    .await;
    let listed = mine["data"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], invoice_id);
    assert_eq!(listed[0]["line_items"].as_array().unwrap().len(), 1);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/invoices/{}", invoice_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let line = &body["data"]["line_items"][0];
    assert_eq!(line["product_name"], "Ceramic Bowl");
    assert_eq!(line["quantity"], 2);
    assert_eq!(decimal(&line["total_price"]), dec!(140));
    assert_eq!(decimal(&body["data"]["total_amount"]), dec!(140));
}

#[tokio::test]
async fn other_users_are_denied_but_admins_are_not() {
    let app = TestApp::new().await;
    let (_, owner) = app.user();
    let (_, stranger) = app.user();
    let admin = app.admin_token();
    let invoice = invoice_after_checkout(&app, &owner).await;
    let uri = format!("/api/v1/invoices/{}", invoice["id"].as_str().unwrap());

    let denied = app.request(Method::GET, &uri, None, Some(&stranger)).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let allowed = app.request(Method::GET, &uri, None, Some(&admin)).await;
    assert_eq!(allowed.status(), StatusCode::OK);

    let missing = app
        .request(
            Method::GET,
            &format!("/api/v1/invoices/{}", Uuid::new_v4()),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_listing_is_paginated_and_admin_only() {
    let app = TestApp::new().await;
    let (_, first) = app.user();
    let (_, second) = app.user();
    invoice_after_checkout(&app, &first).await;
    invoice_after_checkout(&app, &second).await;

    let denied = app
        .request(Method::GET, "/api/v1/invoices", None, Some(&first))
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let admin = app.admin_token();
    let body = response_json(
        app.request(Method::GET, "/api/v1/invoices?limit=1", None, Some(&admin))
            .await,
    )
    .await;
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["total_pages"], 2);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn marking_an_invoice_paid_stamps_paid_at() {
    let app = TestApp::new().await;
    let (_, token) = app.user();
    let admin = app.admin_token();
    let invoice = invoice_after_checkout(&app, &token).await;
    assert!(invoice["paid_at"].is_null());
    let uri = format!("/api/v1/invoices/{}/status", invoice["id"].as_str().unwrap());

    let denied = app
        .request(Method::PATCH, &uri, Some(json!({ "status": "paid" })), Some(&token))
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(Method::PATCH, &uri, Some(json!({ "status": "paid" })), Some(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "paid");
    assert!(body["data"]["paid_at"].is_string());

    let unknown = app
        .request(Method::PATCH, &uri, Some(json!({ "status": "overdue" })), Some(&admin))
        .await;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleting_an_invoice_keeps_the_payment_transaction() {
    let app = TestApp::new().await;
    let (_, token) = app.user();
    let admin = app.admin_token();
    let invoice = invoice_after_checkout(&app, &token).await;
    let invoice_id: Uuid = invoice["id"].as_str().unwrap().parse().unwrap();
    let uri = format!("/api/v1/invoices/{}", invoice_id);

    let denied = app.request(Method::DELETE, &uri, None, Some(&token)).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let response = app.request(Method::DELETE, &uri, None, Some(&admin)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);

    let gone = app.request(Method::GET, &uri, None, Some(&admin)).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    let db = &*app.state.db;
    let lines = invoice_line_item::Entity::find()
        .filter(invoice_line_item::Column::InvoiceId.eq(invoice_id))
        .all(db)
        .await
        .unwrap();
    assert!(lines.is_empty());
    let txs = payment_transaction::Entity::find().all(db).await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].invoice_id, None);

    let again = app.request(Method::DELETE, &uri, None, Some(&admin)).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}
