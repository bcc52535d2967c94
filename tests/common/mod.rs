#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Duration;
use rust_decimal::Decimal;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::{json, Value};
use storefront_api::{
    auth::{Claims, UserProfile, ADMIN_ROLE},
    config::AppConfig,
    db,
    entities::product,
    gateway::{FakeGateway, PaymentGateway},
    services::catalog::CreateProductInput,
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Application wired to a throwaway SQLite file and the in-memory gateway.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    _dir: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // a single connection serializes SQLite writers
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let gateway = Arc::new(FakeGateway::new());
        let state = AppState::new(
            Arc::new(pool),
            cfg,
            gateway.clone() as Arc<dyn PaymentGateway>,
        );
        let router = storefront_api::build_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _dir: dir,
        }
    }

    pub fn token_for(&self, user_id: Uuid, email: &str) -> String {
        let claims = Claims::new(user_id, email, "user", Duration::hours(1)).with_profile(
            UserProfile {
                full_name: Some("Asha Rao".to_string()),
                ..Default::default()
            },
        );
        self.state.auth.sign(&claims).expect("sign user token")
    }

    /// A fresh user and their bearer token
    pub fn user(&self) -> (Uuid, String) {
        let user_id = Uuid::new_v4();
        let token = self.token_for(user_id, &format!("{}@example.com", user_id.simple()));
        (user_id, token)
    }

    /// Token whose claims carry no email address
    pub fn token_without_email(&self, user_id: Uuid) -> String {
        let mut claims = Claims::new(user_id, "", "user", Duration::hours(1));
        claims.email = None;
        self.state.auth.sign(&claims).expect("sign token without email")
    }

    pub fn admin_token(&self) -> String {
        let claims = Claims::new(Uuid::new_v4(), "admin@example.com", ADMIN_ROLE, Duration::hours(1));
        self.state.auth.sign(&claims).expect("sign admin token")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Delivers a webhook body, signed unless `signature` overrides it.
    pub async fn webhook(&self, payload: &Value, signature: Option<&str>) -> Response {
        let raw = serde_json::to_vec(payload).expect("serialize webhook");
        let header = match signature {
            Some(sig) => sig.to_string(),
            None => self.gateway.sign_webhook(&raw).expect("sign webhook"),
        };
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhooks")
            .header("content-type", "application/json")
            .header("stripe-signature", header)
            .body(Body::from(raw))
            .expect("failed to build webhook request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during webhook request")
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        self.state
            .services
            .catalog
            .create_product(CreateProductInput {
                name: name.to_string(),
                description: Some("Seeded for integration tests".to_string()),
                price,
                stock,
                category_id: None,
                image_url: None,
                is_active: true,
            })
            .await
            .expect("seed product for tests")
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
            .stock
    }

    pub async fn count<E: EntityTrait>(&self, _entity: E) -> u64
    where
        E::Model: Sync,
    {
        E::find()
            .count(&*self.state.db)
            .await
            .expect("count rows")
    }

    pub async fn add_to_cart(&self, token: &str, product_id: Uuid, quantity: i32) -> Response {
        self.request(
            Method::POST,
            "/api/v1/cart",
            Some(json!({ "product_id": product_id, "quantity": quantity })),
            Some(token),
        )
        .await
    }

    pub async fn checkout(&self, token: &str) -> Response {
        self.request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "shipping_address": shipping_address(),
                "payment_method": "credit_card"
            })),
            Some(token),
        )
        .await
    }
}

pub fn shipping_address() -> Value {
    json!({
        "full_name": "Asha Rao",
        "phone": "+919876543210",
        "address_line1": "12 MG Road",
        "city": "Bengaluru",
        "state": "Karnataka",
        "pincode": "560001",
        "country": "India"
    })
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Decimals travel as JSON strings
pub fn decimal(value: &Value) -> Decimal {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Decimal::from_str(&raw).expect("parse decimal")
}

pub fn succeeded_event(intent_id: &str) -> Value {
    json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id, "object": "payment_intent", "latest_charge": format!("ch_{}", intent_id) } }
    })
}

pub fn failed_event(intent_id: &str) -> Value {
    json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": intent_id, "object": "payment_intent" } }
    })
}
