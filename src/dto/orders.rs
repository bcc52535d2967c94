use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::invoices::InvoiceResponse;
use crate::entities::{
    order, order_item, payment_transaction, product, OrderStatus, PaymentMethodType,
    PaymentStatus, TransactionStatus,
};
use crate::gateway::PaymentIntent;
use crate::services::orders::{CheckoutOutcome, OrderDetails};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: Option<String>,
    pub quantity: i32,
    /// Unit price at the time of ordering
    #[schema(value_type = String, example = "100.00")]
    pub price: Decimal,
    #[schema(value_type = String, example = "200.00")]
    pub line_total: Decimal,
}

impl OrderItemResponse {
    fn build(item: order_item::Model, product: Option<&product::Model>) -> Self {
        Self {
            line_total: item.line_total(),
            id: item.id,
            product_id: item.product_id,
            product_name: product.map(|p| p.name.clone()),
            quantity: item.quantity,
            price: item.price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionSummary {
    pub id: Uuid,
    pub transaction_reference: String,
    pub payment_method: PaymentMethodType,
    #[schema(value_type = String, example = "250.00")]
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<payment_transaction::Model> for TransactionSummary {
    fn from(tx: payment_transaction::Model) -> Self {
        Self {
            id: tx.id,
            transaction_reference: tx.transaction_reference,
            payment_method: tx.payment_method,
            amount: tx.amount,
            currency: tx.currency,
            status: tx.status,
            payment_intent_id: tx.payment_intent_id,
            charge_id: tx.charge_id,
            initiated_at: tx.initiated_at,
            paid_at: tx.paid_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(value_type = String, example = "250.00")]
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethodType>,
    #[schema(value_type = Object)]
    pub shipping_address: Value,
    #[serde(default)]
    pub items: Vec<OrderItemResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice: Option<InvoiceResponse>,
    #[serde(default)]
    pub transactions: Vec<TransactionSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<order::Model> for OrderResponse {
    fn from(model: order::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            total_amount: model.total_amount,
            status: model.status,
            payment_status: model.payment_status,
            payment_method: model.payment_method,
            shipping_address: model.shipping_address,
            items: Vec::new(),
            invoice: None,
            transactions: Vec::new(),
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<OrderDetails> for OrderResponse {
    fn from(details: OrderDetails) -> Self {
        let mut response = OrderResponse::from(details.order);
        response.items = details
            .items
            .into_iter()
            .map(|(item, product)| OrderItemResponse::build(item, product.as_ref()))
            .collect();
        response.invoice = details.invoice.map(InvoiceResponse::from);
        response.transactions = details
            .transactions
            .into_iter()
            .map(TransactionSummary::from)
            .collect();
        response
    }
}

/// The part of a payment intent the client needs to complete payment
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentIntentSummary {
    pub id: String,
    pub client_secret: Option<String>,
}

impl From<PaymentIntent> for PaymentIntentSummary {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            id: intent.id,
            client_secret: intent.client_secret,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    pub invoice: InvoiceResponse,
    #[serde(rename = "gatewayCustomerId")]
    pub gateway_customer_id: String,
    #[serde(rename = "paymentIntent")]
    pub payment_intent: PaymentIntentSummary,
}

impl From<CheckoutOutcome> for CheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        let mut order = OrderResponse::from(outcome.order);
        order.items = outcome
            .order_items
            .into_iter()
            .map(|item| {
                // checkout line items carry the product name snapshot
                let name = outcome
                    .invoice_line_items
                    .iter()
                    .find(|line| line.product_id == Some(item.product_id))
                    .map(|line| line.product_name.clone());
                let mut response = OrderItemResponse::build(item, None);
                response.product_name = name;
                response
            })
            .collect();
        order.transactions = vec![TransactionSummary::from(outcome.payment_transaction)];

        Self {
            order,
            invoice: InvoiceResponse::with_lines(outcome.invoice, outcome.invoice_line_items),
            gateway_customer_id: outcome.gateway_customer_id,
            payment_intent: outcome.payment_intent.into(),
        }
    }
}
