//! Storefront API library
//!
//! Catalog, carts, transactional checkout, invoicing and payment-gateway
//! reconciliation behind an axum HTTP surface.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod dto;
pub mod entities;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    http::HeaderValue,
    response::Json,
    routing::{get, patch, post, put},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use utoipa::ToSchema;

use crate::auth::JwtVerifier;
use crate::config::AppConfig;
use crate::gateway::PaymentGateway;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub services: handlers::AppServices,
    pub auth: Arc<JwtVerifier>,
}

impl AppState {
    /// Builds every service once over the shared pool and gateway client.
    pub fn new(db: Arc<DatabaseConnection>, config: AppConfig, gateway: Arc<dyn PaymentGateway>) -> Self {
        let services = handlers::AppServices::new(db.clone(), gateway, &config);
        let auth = Arc::new(JwtVerifier::new(&config.jwt_secret));
        Self {
            db,
            config: Arc::new(config),
            services,
            auth,
        }
    }
}

/// Success envelope shared by every JSON endpoint except the gateway webhook
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// Success without a payload
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Every `/api/v1` route. Authentication is enforced per handler by the
/// `AuthUser` / `AdminUser` extractors.
pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{cart, health, invoices, orders, payment_webhooks, payments, products};

    let catalog = Router::new()
        .route(
            "/products",
            get(products::list_products).post(products::create_product),
        )
        .route("/products/:id", get(products::get_product));

    let cart = Router::new()
        .route(
            "/cart",
            get(cart::get_cart)
                .post(cart::add_to_cart)
                .delete(cart::clear_cart),
        )
        .route(
            "/cart/:product_id",
            put(cart::update_cart_item).delete(cart::remove_from_cart),
        );

    let orders = Router::new()
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/cancel", patch(orders::cancel_order))
        .route("/orders/:id/status", patch(orders::update_order_status))
        .route(
            "/orders/:id/payment-status",
            patch(orders::update_payment_status),
        );

    let invoices = Router::new()
        .route("/invoices", get(invoices::list_all_invoices))
        .route("/invoices/my", get(invoices::list_my_invoices))
        .route(
            "/invoices/:id",
            get(invoices::get_invoice).delete(invoices::delete_invoice),
        )
        .route("/invoices/:id/status", patch(invoices::update_invoice_status));

    let payments = Router::new()
        .route("/payments/customers", post(payments::get_or_create_customer))
        .route(
            "/payments/customers/:id/cards",
            get(payments::list_customer_cards),
        )
        .route("/payments/setup-intents", post(payments::create_setup_intent))
        .route(
            "/payments/payment-intents",
            post(payments::create_payment_intent),
        )
        .route("/payments/process", post(payments::process_payment))
        .route("/payments/webhooks", post(payment_webhooks::payment_webhook));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(catalog)
        .merge(cart)
        .merge(orders)
        .merge(invoices)
        .merge(payments)
}

/// The complete application: API, Swagger UI and the HTTP middleware stack.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let request_timeout = state.config.request_timeout();

    Router::new()
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CompressionLayer::new())
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if config.is_development() {
        ::tracing::info!("Using permissive CORS because no origins are configured (development)");
        CorsLayer::permissive()
    } else {
        ::tracing::warn!("No CORS origins configured; cross-origin requests will be refused");
        CorsLayer::new()
    }
}
