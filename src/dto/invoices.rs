use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{invoice, invoice_line_item, InvoiceStatus};
use crate::services::invoicing::InvoiceDetails;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceLineItemResponse {
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    #[schema(value_type = String, example = "100.00")]
    pub price: Decimal,
    #[schema(value_type = String, example = "200.00")]
    pub total_price: Decimal,
    #[schema(value_type = String, example = "0.00")]
    pub tax_rate: Decimal,
    #[schema(value_type = String, example = "0.00")]
    pub tax_amount: Decimal,
}

impl From<invoice_line_item::Model> for InvoiceLineItemResponse {
    fn from(line: invoice_line_item::Model) -> Self {
        Self {
            id: line.id,
            product_id: line.product_id,
            product_name: line.product_name,
            quantity: line.quantity,
            price: line.price,
            total_price: line.total_price,
            tax_rate: line.tax_rate,
            tax_amount: line.tax_amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceResponse {
    pub id: Uuid,
    #[schema(example = "INV-1700000000123-5fe0c8")]
    pub invoice_number: String,
    pub order_id: Uuid,
    pub user_id: Uuid,
    #[schema(value_type = String, example = "250.00")]
    pub sub_total: Decimal,
    #[schema(value_type = String, example = "0.00")]
    pub tax_amount: Decimal,
    #[schema(value_type = String, example = "0.00")]
    pub discount_amount: Decimal,
    #[schema(value_type = String, example = "250.00")]
    pub total_amount: Decimal,
    pub currency: String,
    pub status: InvoiceStatus,
    pub issued_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Omitted in order listings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub line_items: Vec<InvoiceLineItemResponse>,
}

impl InvoiceResponse {
    pub fn with_lines(invoice: invoice::Model, lines: Vec<invoice_line_item::Model>) -> Self {
        let mut response = Self::from(invoice);
        response.line_items = lines.into_iter().map(Into::into).collect();
        response
    }
}

impl From<invoice::Model> for InvoiceResponse {
    fn from(model: invoice::Model) -> Self {
        Self {
            id: model.id,
            invoice_number: model.invoice_number,
            order_id: model.order_id,
            user_id: model.user_id,
            sub_total: model.sub_total,
            tax_amount: model.tax_amount,
            discount_amount: model.discount_amount,
            total_amount: model.total_amount,
            currency: model.currency,
            status: model.status,
            issued_at: model.issued_at,
            paid_at: model.paid_at,
            line_items: Vec::new(),
        }
    }
}

impl From<InvoiceDetails> for InvoiceResponse {
    fn from(details: InvoiceDetails) -> Self {
        Self::with_lines(details.invoice, details.line_items)
    }
}
