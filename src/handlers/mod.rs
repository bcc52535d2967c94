pub mod cart;
pub mod common;
pub mod health;
pub mod invoices;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;
pub mod products;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::gateway::PaymentGateway;
use crate::services::{
    cart::CartService, catalog::CatalogService, customers::CustomerService,
    invoicing::InvoiceService, orders::OrderService, payments::PaymentService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: CatalogService,
    pub cart: CartService,
    pub customers: CustomerService,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub invoices: InvoiceService,
}

impl AppServices {
    /// Wires every service onto one pool and one gateway client.
    pub fn new(db_pool: Arc<DbPool>, gateway: Arc<dyn PaymentGateway>, config: &AppConfig) -> Self {
        let currency = config.default_currency.clone();
        let customers = CustomerService::new(db_pool.clone(), gateway.clone());

        Self {
            catalog: CatalogService::new(db_pool.clone()),
            cart: CartService::new(db_pool.clone()),
            orders: OrderService::new(
                db_pool.clone(),
                customers.clone(),
                gateway.clone(),
                currency.clone(),
            ),
            payments: PaymentService::new(db_pool.clone(), gateway, customers.clone(), currency),
            invoices: InvoiceService::new(db_pool),
            customers,
        }
    }
}
