use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::product;
use crate::services::cart::{CartLine, CartView};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = String, example = "100.00")]
    pub price: Decimal,
    pub stock: i32,
    pub category_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<product::Model> for ProductResponse {
    fn from(model: product::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            price: model.price,
            stock: model.stock,
            category_id: model.category_id,
            image_url: model.image_url,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    /// Unit price captured when the product was first added
    #[schema(value_type = String, example = "100.00")]
    pub price_at_time: Decimal,
    #[schema(value_type = String, example = "200.00")]
    pub line_total: Decimal,
    /// Absent when the product has since been removed from the catalog
    pub product: Option<ProductResponse>,
}

impl From<CartLine> for CartItemResponse {
    fn from(line: CartLine) -> Self {
        let line_total = line.line_total();
        Self {
            id: line.item.id,
            product_id: line.item.product_id,
            quantity: line.item.quantity,
            price_at_time: line.item.price_at_time,
            line_total,
            product: line.product.map(ProductResponse::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartResponse {
    pub items: Vec<CartItemResponse>,
    #[schema(value_type = String, example = "250.00")]
    pub total: Decimal,
    pub item_count: usize,
}

impl From<CartView> for CartResponse {
    fn from(view: CartView) -> Self {
        let items: Vec<CartItemResponse> = view.lines.into_iter().map(Into::into).collect();
        Self {
            item_count: items.len(),
            items,
            total: view.total,
        }
    }
}
