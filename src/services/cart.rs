use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{cart_item, product};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItemInput {
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

/// A cart line joined with its (possibly deleted) product
#[derive(Debug, Clone)]
pub struct CartLine {
    pub item: cart_item::Model,
    pub product: Option<product::Model>,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.item.price_at_time * Decimal::from(self.item.quantity)
    }
}

#[derive(Debug, Clone)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub total: Decimal,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Adds a product or bumps the quantity of an existing line. The unit
    /// price is snapshotted only when the line is first created.
    #[instrument(skip(self, input), fields(product_id = %input.product_id, quantity = input.quantity))]
    pub async fn add_to_cart(
        &self,
        user_id: Uuid,
        input: AddToCartInput,
    ) -> Result<cart_item::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;

        let product = product::Entity::find_by_id(input.product_id)
            .one(db)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        if product.stock < input.quantity {
            return Err(ServiceError::InsufficientStock("Insufficient stock".to_string()));
        }

        let now = Utc::now();
        let item = match find_line(db, user_id, input.product_id).await? {
            Some(existing) => {
                let quantity = existing
                    .quantity
                    .checked_add(input.quantity)
                    .filter(|quantity| *quantity <= product.stock)
                    .ok_or_else(|| ServiceError::InsufficientStock("Insufficient stock".to_string()))?;
                let mut active: cart_item::ActiveModel = existing.into();
                active.quantity = Set(quantity);
                active.updated_at = Set(now);
                active.update(db).await?
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(product.id),
                    quantity: Set(input.quantity),
                    price_at_time: Set(product.price),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(db)
                .await?
            }
        };

        info!(cart_item_id = %item.id, "cart updated");
        Ok(item)
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let rows = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .find_also_related(product::Entity)
            .order_by_desc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let lines: Vec<CartLine> = rows
            .into_iter()
            .map(|(item, product)| CartLine { item, product })
            .collect();
        let total = lines.iter().map(CartLine::line_total).sum();
        Ok(CartView { lines, total })
    }

    #[instrument(skip(self, input))]
    pub async fn update_cart_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        input: UpdateCartItemInput,
    ) -> Result<cart_item::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;

        let existing = find_line(db, user_id, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))?;

        let in_stock = product::Entity::find_by_id(product_id)
            .one(db)
            .await?
            .map(|p| p.stock >= input.quantity)
            .unwrap_or(false);
        if !in_stock {
            return Err(ServiceError::InsufficientStock("Insufficient stock".to_string()));
        }

        let mut active: cart_item::ActiveModel = existing.into();
        active.quantity = Set(input.quantity);
        active.updated_at = Set(Utc::now());
        Ok(active.update(db).await?)
    }

    #[instrument(skip(self))]
    pub async fn remove_from_cart(&self, user_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        let result = cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Cart item not found".to_string()));
        }
        Ok(())
    }

    pub async fn clear(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        clear_cart(&*self.db, user_id).await
    }

    pub async fn cart_total(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        let items = list_cart_items(&*self.db, user_id).await?;
        Ok(items
            .iter()
            .map(|i| i.price_at_time * Decimal::from(i.quantity))
            .sum())
    }
}

async fn find_line<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    product_id: Uuid,
) -> Result<Option<cart_item::Model>, ServiceError> {
    Ok(cart_item::Entity::find()
        .filter(cart_item::Column::UserId.eq(user_id))
        .filter(cart_item::Column::ProductId.eq(product_id))
        .one(conn)
        .await?)
}

/// Cart lines in insertion order
pub async fn list_cart_items<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Vec<cart_item::Model>, ServiceError> {
    Ok(cart_item::Entity::find()
        .filter(cart_item::Column::UserId.eq(user_id))
        .order_by_asc(cart_item::Column::CreatedAt)
        .all(conn)
        .await?)
}

pub async fn clear_cart<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<u64, ServiceError> {
    let result = cart_item::Entity::delete_many()
        .filter(cart_item::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}
