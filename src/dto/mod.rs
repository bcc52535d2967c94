//! Wire representations of entities. Entities stay free of OpenAPI and
//! presentation concerns; handlers convert into these before responding.

pub mod catalog;
pub mod invoices;
pub mod orders;
pub mod payments;

pub use catalog::{CartItemResponse, CartResponse, ProductResponse};
pub use invoices::{InvoiceLineItemResponse, InvoiceResponse};
pub use orders::{
    CheckoutResponse, OrderItemResponse, OrderResponse, PaymentIntentSummary, TransactionSummary,
};
pub use payments::{GatewayCustomerResponse, PaymentResultResponse, WebhookAck};
