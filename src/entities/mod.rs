//! Relational rows backing the storefront. Each module is a plain sea-orm
//! entity; business rules live in `crate::services`.

pub mod cart_item;
pub mod category;
pub mod gateway_customer;
pub mod invoice;
pub mod invoice_line_item;
pub mod order;
pub mod order_item;
pub mod payment_transaction;
pub mod product;

pub use invoice::InvoiceStatus;
pub use order::{OrderStatus, PaymentStatus};
pub use payment_transaction::{PaymentMethodType, TransactionStatus};
