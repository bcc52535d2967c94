use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DbBackend, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::entities::{category, product};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    #[schema(value_type = String, example = "100.00")]
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub stock: i32,
    pub category_id: Option<Uuid>,
    #[validate(url)]
    pub image_url: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() || price.is_zero() {
        return Err(ValidationError::new("price_must_be_positive"));
    }
    Ok(())
}

/// Product catalog plus the stock counter primitives used by checkout and
/// cancellation. The stock functions are generic over the connection so they
/// run inside the caller's transaction.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    /// Active products, newest first. Returns the page and the total count.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let paginator = product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((products, total))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        if let Some(category_id) = input.category_id {
            category::Entity::find_by_id(category_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound("Category not found".to_string()))?;
        }

        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            stock: Set(input.stock),
            category_id: Set(input.category_id),
            image_url: Set(input.image_url),
            is_active: Set(input.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(product_id = %product.id, "product created");
        Ok(product)
    }
}

/// Reads a product row, taking a row lock on backends that support it.
pub async fn lock_product<C>(conn: &C, product_id: Uuid) -> Result<Option<product::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    let mut query = product::Entity::find_by_id(product_id);
    if conn.get_database_backend() == DbBackend::Postgres {
        query = query.lock_exclusive();
    }
    Ok(query.one(conn).await?)
}

/// `UPDATE products SET stock = stock - qty WHERE id = ? AND stock >= qty`.
/// No matching row means the stock would go negative.
pub async fn decrement_stock<C>(conn: &C, product_id: Uuid, quantity: i32) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let name = product::Entity::find_by_id(product_id)
            .one(conn)
            .await?
            .map(|p| p.name)
            .unwrap_or_else(|| product_id.to_string());
        return Err(insufficient_stock(&name));
    }
    Ok(())
}

pub async fn increment_stock<C>(conn: &C, product_id: Uuid, quantity: i32) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).add(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::NotFound("Product not found".to_string()));
    }
    Ok(())
}

pub fn insufficient_stock(product_name: &str) -> ServiceError {
    ServiceError::InsufficientStock(format!("Insufficient stock for product: {}", product_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{memory_db, seed_product};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn decrement_refuses_to_go_negative() {
        let db = memory_db().await;
        let lamp = seed_product(&db, "Desk Lamp", dec!(100), 5).await;

        decrement_stock(&db, lamp.id, 3).await.unwrap();
        let err = decrement_stock(&db, lamp.id, 3).await.unwrap_err();
        assert_matches!(err, ServiceError::InsufficientStock(msg) if msg == "Insufficient stock for product: Desk Lamp");

        let after = product::Entity::find_by_id(lamp.id).one(&db).await.unwrap().unwrap();
        assert_eq!(after.stock, 2);
    }

    #[tokio::test]
    async fn increment_restores_stock() {
        let db = memory_db().await;
        let lamp = seed_product(&db, "Desk Lamp", dec!(100), 1).await;

        increment_stock(&db, lamp.id, 4).await.unwrap();
        let after = lock_product(&db, lamp.id).await.unwrap().unwrap();
        assert_eq!(after.stock, 5);
    }

    #[tokio::test]
    async fn create_product_rejects_non_positive_price() {
        let db = Arc::new(memory_db().await);
        let service = CatalogService::new(db);
        let err = service
            .create_product(CreateProductInput {
                name: "Free Lunch".into(),
                description: None,
                price: Decimal::ZERO,
                stock: 1,
                category_id: None,
                image_url: None,
                is_active: true,
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(details) if details.contains("price"));
    }

    #[tokio::test]
    async fn list_products_pages_active_products() {
        let db = Arc::new(memory_db().await);
        for i in 0..3 {
            seed_product(&db, &format!("Item {i}"), dec!(10), 1).await;
        }
        let service = CatalogService::new(db);
        let (page, total) = service.list_products(1, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
    }
}
