use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront API

Catalog browsing, carts, transactional checkout, invoicing and payment-gateway reconciliation.

## Authentication

Bearer tokens are issued by the identity provider and signed with the shared HS256 secret:

```
Authorization: Bearer <your-jwt-token>
```

Routes marked admin additionally require the `admin` role.

## Responses

Successful calls answer `{ "success": true, "message": "...", "data": ... }`.
Failures answer `{ "success": false, "message": "...", "error": { "code": "...", "details": ... } }`.

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 10, max 100).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Products", description = "Catalog endpoints"),
        (name = "Cart", description = "Shopping cart endpoints"),
        (name = "Orders", description = "Checkout and order lifecycle endpoints"),
        (name = "Invoices", description = "Invoice endpoints"),
        (name = "Payments", description = "Payment gateway endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        handlers::health::health_check,
        // Catalog
        handlers::products::list_products,
        handlers::products::get_product,
        handlers::products::create_product,
        // Cart
        handlers::cart::add_to_cart,
        handlers::cart::get_cart,
        handlers::cart::update_cart_item,
        handlers::cart::remove_from_cart,
        handlers::cart::clear_cart,
        // Orders
        handlers::orders::create_order,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::cancel_order,
        handlers::orders::update_order_status,
        handlers::orders::update_payment_status,
        // Invoices
        handlers::invoices::list_my_invoices,
        handlers::invoices::get_invoice,
        handlers::invoices::list_all_invoices,
        handlers::invoices::update_invoice_status,
        handlers::invoices::delete_invoice,
        // Payments
        handlers::payments::get_or_create_customer,
        handlers::payments::create_setup_intent,
        handlers::payments::create_payment_intent,
        handlers::payments::process_payment,
        handlers::payments::list_customer_cards,
        // Webhooks
        handlers::payment_webhooks::payment_webhook,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::errors::ErrorDetail,
            crate::services::orders::ShippingAddress,
            crate::entities::OrderStatus,
            crate::entities::PaymentStatus,
            crate::entities::InvoiceStatus,
            crate::entities::TransactionStatus,
            crate::entities::PaymentMethodType,
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}
