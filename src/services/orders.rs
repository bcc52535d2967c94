use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::cart::{clear_cart, list_cart_items};
use super::catalog::{decrement_stock, increment_stock, insufficient_stock, lock_product};
use super::customers::{CustomerIdentity, CustomerService};
use crate::db::with_transaction;
use crate::entities::{
    cart_item, invoice, invoice_line_item, order, order_item, payment_transaction, product,
    InvoiceStatus, OrderStatus, PaymentMethodType, PaymentStatus, TransactionStatus,
};
use crate::errors::ServiceError;
use crate::gateway::{invoice_number, to_minor_units, PaymentGateway, PaymentIntent, PaymentIntentRequest};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShippingAddress {
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: String,
    #[validate(length(min = 1, max = 200))]
    pub address_line1: String,
    #[validate(length(max = 200))]
    pub address_line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 3, max = 12))]
    pub pincode: String,
    #[validate(length(min = 2, max = 100))]
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderInput {
    #[validate]
    pub shipping_address: ShippingAddress,
    pub payment_method: Option<PaymentMethodType>,
}

/// Everything written by a successful checkout
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: order::Model,
    pub order_items: Vec<order_item::Model>,
    pub invoice: invoice::Model,
    pub invoice_line_items: Vec<invoice_line_item::Model>,
    pub payment_transaction: payment_transaction::Model,
    pub payment_intent: PaymentIntent,
    pub gateway_customer_id: String,
}

#[derive(Debug, Clone)]
pub struct OrderDetails {
    pub order: order::Model,
    pub items: Vec<(order_item::Model, Option<product::Model>)>,
    pub invoice: Option<invoice::Model>,
    pub transactions: Vec<payment_transaction::Model>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    customers: CustomerService,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        customers: CustomerService,
        gateway: Arc<dyn PaymentGateway>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            db,
            customers,
            gateway,
            currency: currency.into(),
        }
    }

    /// Converts the user's cart into an order, invoice and payment intent.
    ///
    /// All writes share one transaction: any failure, including a gateway
    /// error after the rows were staged, leaves stock, cart and order tables
    /// exactly as they were.
    #[instrument(skip(self, identity, input), fields(user_id = %identity.user_id))]
    pub async fn create_order_from_cart(
        &self,
        identity: CustomerIdentity,
        input: CreateOrderInput,
    ) -> Result<CheckoutOutcome, ServiceError> {
        input.validate()?;

        let pending_lines = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(identity.user_id))
            .count(&*self.db)
            .await?;
        if pending_lines == 0 {
            return Err(ServiceError::CartEmpty);
        }

        let shipping_address = serde_json::to_value(&input.shipping_address)?;
        let payment_method = input.payment_method;
        let this = self.clone();

        let result = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                this.checkout(txn, identity, shipping_address, payment_method)
                    .await
            })
        })
        .await;

        match &result {
            Ok(outcome) => {
                counter!("storefront.checkout.completed", 1);
                info!(
                    order_id = %outcome.order.id,
                    invoice_number = %outcome.invoice.invoice_number,
                    total = %outcome.order.total_amount,
                    "checkout completed"
                );
            }
            Err(err) => {
                counter!("storefront.checkout.failed", 1);
                warn!(error = %err, "checkout rolled back");
            }
        }
        result
    }

    async fn checkout(
        &self,
        txn: &DatabaseTransaction,
        identity: CustomerIdentity,
        shipping_address: serde_json::Value,
        payment_method: Option<PaymentMethodType>,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let user_id = identity.user_id;

        // Re-read inside the transaction; a concurrent checkout may have
        // emptied the cart since the pre-check.
        let lines = list_cart_items(txn, user_id).await?;
        if lines.is_empty() {
            return Err(ServiceError::CartEmpty);
        }

        let mut names = HashMap::with_capacity(lines.len());
        for line in lock_order(&lines) {
            let product = lock_product(txn, line.product_id)
                .await?
                .ok_or_else(|| insufficient_stock(&line.product_id.to_string()))?;
            if product.stock < line.quantity {
                return Err(insufficient_stock(&product.name));
            }
            names.insert(product.id, product.name);
        }

        let total: Decimal = lines
            .iter()
            .map(|l| l.price_at_time * Decimal::from(l.quantity))
            .sum();
        let now = Utc::now();

        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            total_amount: Set(total),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            payment_method: Set(payment_method),
            shipping_address: Set(shipping_address),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;

        let mut order_items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                price: Set(line.price_at_time),
                created_at: Set(now),
            }
            .insert(txn)
            .await?;
            order_items.push(item);
        }

        for line in &lines {
            decrement_stock(txn, line.product_id, line.quantity).await?;
        }

        let stored_currency = self.currency.to_ascii_uppercase();
        let invoice = invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_number: Set(invoice_number(order.id, now)),
            order_id: Set(order.id),
            user_id: Set(user_id),
            sub_total: Set(total),
            tax_amount: Set(Decimal::ZERO),
            discount_amount: Set(Decimal::ZERO),
            total_amount: Set(total),
            currency: Set(stored_currency.clone()),
            status: Set(InvoiceStatus::Generated),
            gateway_invoice_id: Set(None),
            issued_at: Set(now),
            paid_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;

        let mut invoice_line_items = Vec::with_capacity(order_items.len());
        for item in &order_items {
            let line = invoice_line_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                invoice_id: Set(invoice.id),
                product_id: Set(Some(item.product_id)),
                product_name: Set(names
                    .get(&item.product_id)
                    .cloned()
                    .unwrap_or_else(|| "Unknown Product".to_string())),
                quantity: Set(item.quantity),
                price: Set(item.price),
                total_price: Set(item.line_total()),
                tax_rate: Set(Decimal::ZERO),
                tax_amount: Set(Decimal::ZERO),
                created_at: Set(now),
            }
            .insert(txn)
            .await?;
            invoice_line_items.push(line);
        }

        let gateway_customer_id = self.customers.get_or_create_customer(txn, &identity).await?;

        let payment_intent = self
            .gateway
            .create_payment_intent(PaymentIntentRequest {
                amount: to_minor_units(total)?,
                currency: self.currency.to_ascii_lowercase(),
                customer: Some(gateway_customer_id.clone()),
                payment_method: None,
                metadata: HashMap::from([
                    ("order_id".to_string(), order.id.to_string()),
                    ("invoice_id".to_string(), invoice.id.to_string()),
                    ("user_id".to_string(), user_id.to_string()),
                ]),
            })
            .await?;

        let payment_transaction = payment_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            invoice_id: Set(Some(invoice.id)),
            user_id: Set(user_id),
            transaction_reference: Set(payment_intent.id.clone()),
            payment_method: Set(payment_method.unwrap_or(PaymentMethodType::CreditCard)),
            amount: Set(total),
            currency: Set(stored_currency),
            status: Set(TransactionStatus::Initiated),
            gateway_response: Set(None),
            payment_intent_id: Set(Some(payment_intent.id.clone())),
            charge_id: Set(None),
            gateway_customer_id: Set(Some(gateway_customer_id.clone())),
            gateway_payment_method_id: Set(None),
            initiated_at: Set(now),
            processed_at: Set(None),
            paid_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;

        clear_cart(txn, user_id).await?;

        Ok(CheckoutOutcome {
            order,
            order_items,
            invoice,
            invoice_line_items,
            payment_transaction,
            payment_intent,
            gateway_customer_id,
        })
    }

    /// Cancels a pending order owned by `user_id` and puts its stock back.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let cancelled = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let order = order::Entity::find_by_id(order_id)
                    .filter(order::Column::UserId.eq(user_id))
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

                if order.status != OrderStatus::Pending {
                    return Err(ServiceError::OrderNotCancellable);
                }

                // the status guard makes a racing second cancel a no-op
                let flipped = order::Entity::update_many()
                    .col_expr(order::Column::Status, Expr::value(OrderStatus::Cancelled))
                    .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::Status.eq(OrderStatus::Pending))
                    .exec(txn)
                    .await?;
                if flipped.rows_affected == 0 {
                    return Err(ServiceError::OrderNotCancellable);
                }

                let items = order.find_related(order_item::Entity).all(txn).await?;
                for item in &items {
                    increment_stock(txn, item.product_id, item.quantity).await?;
                }

                order::Entity::find_by_id(order_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))
            })
        })
        .await?;

        info!(order_id = %cancelled.id, "order cancelled, stock restored");
        Ok(cancelled)
    }

    /// Administrative override: any status may be set. Moves out of a
    /// terminal status are allowed but logged.
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let existing = self.find(order_id).await?;
        if existing.status.is_terminal() && existing.status != status {
            warn!(from = %existing.status, to = %status, "order status moved out of a terminal state");
        }

        let mut active: order::ActiveModel = existing.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        info!(order_id = %updated.id, status = %updated.status, "order status updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        order_id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<order::Model, ServiceError> {
        let existing = self.find(order_id).await?;
        if existing.payment_status == PaymentStatus::Paid && payment_status != PaymentStatus::Paid {
            warn!(to = %payment_status, "payment status moved away from paid");
        }

        let mut active: order::ActiveModel = existing.into();
        active.payment_status = Set(payment_status);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// The user's orders, newest first, with items, invoice and transactions.
    #[instrument(skip(self))]
    pub async fn get_order_history(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderDetails>, u64), ServiceError> {
        let db = &*self.db;
        let paginator = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, limit.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let mut details = Vec::with_capacity(orders.len());
        for order in orders {
            details.push(load_details(db, order).await?);
        }
        Ok((details, total))
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid, user_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let db = &*self.db;
        let order = order::Entity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
        load_details(db, order).await
    }

    async fn find(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, %order_id, "order lookup failed");
                ServiceError::from(e)
            })?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))
    }
}

/// Cart lines in the order their product rows must be locked. A single
/// global order (by product id) keeps overlapping checkouts from deadlocking.
fn lock_order(lines: &[cart_item::Model]) -> Vec<&cart_item::Model> {
    let mut ordered: Vec<&cart_item::Model> = lines.iter().collect();
    ordered.sort_by_key(|line| line.product_id);
    ordered
}

async fn load_details<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> Result<OrderDetails, ServiceError> {
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .find_also_related(product::Entity)
        .all(conn)
        .await?;
    let invoice = order.find_related(invoice::Entity).one(conn).await?;
    let transactions = order
        .find_related(payment_transaction::Entity)
        .order_by_asc(payment_transaction::Column::CreatedAt)
        .all(conn)
        .await?;
    Ok(OrderDetails {
        order,
        items,
        invoice,
        transactions,
    })
}
