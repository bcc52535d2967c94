mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::{decimal, response_json, shipping_address, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use storefront_api::entities::{
    cart_item, invoice, invoice_line_item, order, order_item, payment_transaction, product,
};
use uuid::Uuid;

#[tokio::test]
async fn checkout_converts_cart_into_order_invoice_and_payment() {
    let app = TestApp::new().await;
    let (user_id, token) = app.user();
    let p1 = app.seed_product("Steel Bottle", dec!(100), 5).await;
    let p2 = app.seed_product("Canvas Tote", dec!(50), 3).await;

    assert_eq!(app.add_to_cart(&token, p1.id, 2).await.status(), StatusCode::OK);
    assert_eq!(app.add_to_cart(&token, p2.id, 1).await.status(), StatusCode::OK);

    let response = app.checkout(&token).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);

    let data = &body["data"];
    assert_eq!(decimal(&data["order"]["total_amount"]), dec!(250));
    assert_eq!(data["order"]["status"], "pending");
    assert_eq!(data["order"]["payment_status"], "pending");
    assert_eq!(data["order"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(decimal(&data["invoice"]["total_amount"]), dec!(250));
    assert_eq!(decimal(&data["invoice"]["sub_total"]), dec!(250));
    assert_eq!(data["invoice"]["status"], "generated");
    assert_eq!(data["invoice"]["currency"], "INR");
    assert!(data["invoice"]["invoice_number"]
        .as_str()
        .unwrap()
        .starts_with("INV-"));
    assert_eq!(data["gatewayCustomerId"], "cus_fake_1");
    let intent_id = data["paymentIntent"]["id"].as_str().unwrap().to_string();
    assert!(intent_id.starts_with("pi_fake_"));
    assert!(data["paymentIntent"]["client_secret"].is_string());

    // stock decremented, cart emptied
    assert_eq!(app.stock_of(p1.id).await, 3);
    assert_eq!(app.stock_of(p2.id).await, 2);
    let cart = response_json(
        app.request(Method::GET, "/api/v1/cart", None, Some(&token)).await,
    )
    .await;
    assert_eq!(cart["data"]["items"].as_array().unwrap().len(), 0);

    let db = &*app.state.db;
    let order_id: Uuid = data["order"]["id"].as_str().unwrap().parse().unwrap();
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(db)
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    let items_total: rust_decimal::Decimal = items.iter().map(|i| i.line_total()).sum();
    assert_eq!(items_total, dec!(250));

    let invoice = invoice::Entity::find()
        .filter(invoice::Column::OrderId.eq(order_id))
        .one(db)
        .await
        .unwrap()
        .expect("invoice for order");
    assert_eq!(invoice.user_id, user_id);
    let lines = invoice_line_item::Entity::find()
        .filter(invoice_line_item::Column::InvoiceId.eq(invoice.id))
        .all(db)
        .await
        .unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().any(|l| l.product_name == "Steel Bottle"));

    let txs = payment_transaction::Entity::find()
        .filter(payment_transaction::Column::OrderId.eq(order_id))
        .all(db)
        .await
        .unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].status, payment_transaction::TransactionStatus::Initiated);
    assert_eq!(txs[0].payment_intent_id.as_deref(), Some(intent_id.as_str()));
    assert_eq!(txs[0].invoice_id, Some(invoice.id));
    assert_eq!(txs[0].amount, dec!(250));
}

#[tokio::test]
async fn checkout_with_insufficient_stock_changes_nothing() {
    let app = TestApp::new().await;
    let (user_id, token) = app.user();
    let product = app.seed_product("Clay Mug", dec!(40), 5).await;

    // the cart endpoint refuses this quantity, so stage the line directly
    let now = Utc::now();
    cart_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        product_id: Set(product.id),
        quantity: Set(10),
        price_at_time: Set(product.price),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*app.state.db)
    .await
    .unwrap();

    let response = app.checkout(&token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_STOCK");
    assert_eq!(body["message"], "Insufficient stock for product: Clay Mug");

    assert_eq!(app.stock_of(product.id).await, 5);
    assert_eq!(app.count(order::Entity).await, 0);
    assert_eq!(app.count(invoice::Entity).await, 0);
    assert_eq!(app.count(cart_item::Entity).await, 1);
    assert_eq!(app.gateway.intents_created(), 0);
}

#[tokio::test]
async fn checkout_with_empty_cart_is_rejected() {
    let app = TestApp::new().await;
    let (_, token) = app.user();

    let response = app.checkout(&token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], "CART_EMPTY");
    assert_eq!(app.count(order::Entity).await, 0);
}

#[tokio::test]
async fn gateway_failure_rolls_back_the_whole_checkout() {
    let app = TestApp::new().await;
    let (_, token) = app.user();
    let product = app.seed_product("Desk Lamp", dec!(120), 4).await;
    app.add_to_cart(&token, product.id, 2).await;

    app.gateway.fail_payment_intents(true);
    let response = app.checkout(&token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], "GATEWAY_ERROR");

    assert_eq!(app.stock_of(product.id).await, 4);
    assert_eq!(app.count(order::Entity).await, 0);
    assert_eq!(app.count(order_item::Entity).await, 0);
    assert_eq!(app.count(invoice::Entity).await, 0);
    assert_eq!(app.count(invoice_line_item::Entity).await, 0);
    assert_eq!(app.count(payment_transaction::Entity).await, 0);
    assert_eq!(app.count(cart_item::Entity).await, 1);

    // a retry once the gateway recovers goes through
    app.gateway.fail_payment_intents(false);
    let response = app.checkout(&token).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(app.stock_of(product.id).await, 2);
}

#[tokio::test]
async fn checkout_requires_a_complete_shipping_address() {
    let app = TestApp::new().await;
    let (_, token) = app.user();
    let product = app.seed_product("Notebook", dec!(15), 10).await;
    app.add_to_cart(&token, product.id, 1).await;

    let mut address = shipping_address();
    address["phone"] = json!("123");
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "shipping_address": address })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(app.stock_of(product.id).await, 10);
}

#[tokio::test]
async fn checkout_without_email_cannot_create_gateway_customer() {
    let app = TestApp::new().await;
    let product = app.seed_product("Pencil Case", dec!(30), 10).await;
    let token = app.token_without_email(Uuid::new_v4());
    app.add_to_cart(&token, product.id, 1).await;

    let response = app.checkout(&token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(app.stock_of(product.id).await, 10);
    assert_eq!(app.count(order::Entity).await, 0);
}

#[tokio::test]
async fn second_checkout_reuses_gateway_customer() {
    let app = TestApp::new().await;
    let (_, token) = app.user();
    let product = app.seed_product("Tea Tin", dec!(20), 10).await;

    app.add_to_cart(&token, product.id, 1).await;
    let first = response_json(app.checkout(&token).await).await;
    app.add_to_cart(&token, product.id, 1).await;
    let second = response_json(app.checkout(&token).await).await;

    assert_eq!(
        first["data"]["gatewayCustomerId"],
        second["data"]["gatewayCustomerId"]
    );
    assert_eq!(app.gateway.customers_created(), 1);
    assert_eq!(app.gateway.intents_created(), 2);
    assert_eq!(app.stock_of(product.id).await, 8);
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell() {
    let app = Arc::new(TestApp::new().await);
    let product = app.seed_product("Camp Stove", dec!(80), 5).await;
    let (_, alice) = app.user();
    let (_, bob) = app.user();
    assert_eq!(app.add_to_cart(&alice, product.id, 3).await.status(), StatusCode::OK);
    assert_eq!(app.add_to_cart(&bob, product.id, 3).await.status(), StatusCode::OK);

    let handles: Vec<_> = [alice, bob]
        .into_iter()
        .map(|token| {
            let app = app.clone();
            tokio::spawn(async move {
                let response = app.checkout(&token).await;
                let status = response.status();
                (status, response_json(response).await)
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    let created = outcomes
        .iter()
        .filter(|(status, _)| *status == StatusCode::CREATED)
        .count();
    assert_eq!(created, 1);
    let (status, body) = outcomes
        .iter()
        .find(|(status, _)| *status != StatusCode::CREATED)
        .unwrap();
    assert_eq!(*status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_STOCK");

    assert_eq!(app.stock_of(product.id).await, 2);
    assert_eq!(app.count(order::Entity).await, 1);
    assert_eq!(app.count(payment_transaction::Entity).await, 1);
}

#[tokio::test]
async fn checkout_charges_the_price_captured_in_the_cart() {
    let app = TestApp::new().await;
    let (_, token) = app.user();
    let lantern = app.seed_product("Lantern", dec!(100), 10).await;
    assert_eq!(app.add_to_cart(&token, lantern.id, 2).await.status(), StatusCode::OK);

    let mut repriced: product::ActiveModel = lantern.clone().into();
    repriced.price = Set(dec!(150));
    repriced.update(&*app.state.db).await.unwrap();

    let response = app.checkout(&token).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let data = &body["data"];
    assert_eq!(decimal(&data["order"]["total_amount"]), dec!(200));
    assert_eq!(decimal(&data["invoice"]["total_amount"]), dec!(200));

    let db = &*app.state.db;
    let order_id: Uuid = data["order"]["id"].as_str().unwrap().parse().unwrap();
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(db)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].price, dec!(100));

    let invoice = invoice::Entity::find()
        .filter(invoice::Column::OrderId.eq(order_id))
        .one(db)
        .await
        .unwrap()
        .unwrap();
    let lines = invoice_line_item::Entity::find()
        .filter(invoice_line_item::Column::InvoiceId.eq(invoice.id))
        .all(db)
        .await
        .unwrap();
    assert_eq!(lines[0].price, dec!(100));
    assert_eq!(lines[0].total_price, dec!(200));

    let intent_id = data["paymentIntent"]["id"].as_str().unwrap();
    let intent = app.gateway.intent(intent_id).await.unwrap();
    assert_eq!(intent.amount, 20_000);
}
