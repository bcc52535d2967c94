use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::customers::{CustomerIdentity, CustomerService};
use crate::db::with_transaction;
use crate::entities::{
    invoice, order, payment_transaction, InvoiceStatus, PaymentStatus, TransactionStatus,
};
use crate::errors::ServiceError;
use crate::gateway::webhook::{PAYMENT_INTENT_FAILED, PAYMENT_INTENT_SUCCEEDED};
use crate::gateway::{
    to_minor_units, CardSummary, GatewayEvent, PaymentGateway, PaymentIntent, PaymentIntentRequest,
    SetupIntent,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ProcessPaymentInput {
    #[validate(length(min = 1, max = 255))]
    pub payment_intent_id: String,
    #[validate(length(min = 1, max = 255))]
    pub payment_method_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreatePaymentIntentInput {
    #[validate(custom = "validate_amount")]
    #[schema(value_type = String, example = "250.00")]
    pub amount: Decimal,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    pub payment_method_id: Option<String>,
}

/// Largest amount accepted for an ad hoc payment intent (99,999,999.99).
// Mantissa 9_999_999_999 split into (lo, mid) words since `Decimal::new` is not const.
const MAX_PAYMENT_AMOUNT: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

fn validate_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("amount_must_be_positive"));
    }
    if *amount > MAX_PAYMENT_AMOUNT {
        return Err(ValidationError::new("amount_too_large"));
    }
    Ok(())
}

/// What a webhook delivery did to local state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Applied(TransactionStatus),
    /// Transaction already terminal; nothing written
    AlreadySettled,
    /// Unknown intent or uninteresting event type
    Ignored,
}

#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub status: TransactionStatus,
    pub payment_intent: PaymentIntent,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    customers: CustomerService,
    currency: String,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        customers: CustomerService,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            db,
            gateway,
            customers,
            currency: currency.into(),
        }
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.gateway
    }

    /// Applies a verified gateway event. Events for intents this service
    /// never created are acknowledged without touching anything.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn handle_gateway_event(
        &self,
        event: GatewayEvent,
    ) -> Result<Reconciliation, ServiceError> {
        counter!("storefront.webhook.received", 1);

        let succeeded = match event.event_type.as_str() {
            PAYMENT_INTENT_SUCCEEDED => true,
            PAYMENT_INTENT_FAILED => false,
            other => {
                debug!(event_type = other, "ignoring gateway event");
                return Ok(Reconciliation::Ignored);
            }
        };

        let Some(intent_id) = event.object_id().map(str::to_string) else {
            warn!("gateway event without object id");
            counter!("storefront.webhook.ignored", 1);
            return Ok(Reconciliation::Ignored);
        };
        let charge_id = event.object_str("latest_charge").map(str::to_string);
        let payload = event.data.object;

        let lookup_id = intent_id.clone();
        let outcome = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let Some(tx) = find_by_intent(txn, &lookup_id).await? else {
                    return Ok(Reconciliation::Ignored);
                };
                if succeeded {
                    mark_succeeded(txn, tx, payload, charge_id).await
                } else {
                    mark_failed(txn, tx, payload).await
                }
            })
        })
        .await?;

        match outcome {
            Reconciliation::Ignored => {
                counter!("storefront.webhook.ignored", 1);
                warn!(%intent_id, "no payment transaction for intent, event ignored");
            }
            Reconciliation::AlreadySettled => {
                info!(%intent_id, "payment already settled, event is a no-op");
            }
            Reconciliation::Applied(status) => {
                info!(%intent_id, %status, "payment reconciled");
            }
        }
        Ok(outcome)
    }

    /// Confirms an intent synchronously on behalf of its owner and applies
    /// the resulting state the same way the webhook path would.
    #[instrument(skip(self, input), fields(intent_id = %input.payment_intent_id))]
    pub async fn process_payment(
        &self,
        user_id: Uuid,
        input: ProcessPaymentInput,
    ) -> Result<PaymentOutcome, ServiceError> {
        input.validate()?;

        let tx = find_by_intent(&*self.db, &input.payment_intent_id)
            .await?
            .filter(|tx| tx.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound("Payment transaction not found".to_string()))?;

        if tx.status.is_terminal() {
            let payment_intent = self
                .gateway
                .retrieve_payment_intent(&input.payment_intent_id)
                .await?;
            return Ok(PaymentOutcome {
                status: tx.status,
                payment_intent,
            });
        }

        let confirmed = self
            .gateway
            .confirm_payment_intent(&input.payment_intent_id, &input.payment_method_id)
            .await;

        let payment_intent = match confirmed {
            Ok(intent) => intent,
            Err(err) => {
                let message = err.to_string();
                let tx_id = tx.id;
                let detail = message.clone();
                with_transaction(&self.db, move |txn| {
                    Box::pin(async move {
                        let current = payment_transaction::Entity::find_by_id(tx_id)
                            .one(txn)
                            .await?;
                        if let Some(tx) = current {
                            mark_failed(txn, tx, json!({ "error": detail })).await?;
                        }
                        Ok::<_, ServiceError>(())
                    })
                })
                .await?;
                warn!(error = %message, "payment confirmation failed");
                return Err(ServiceError::PaymentError(message));
            }
        };

        let tx_id = tx.id;
        let intent = payment_intent.clone();
        let method_id = input.payment_method_id.clone();
        let status = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let tx = payment_transaction::Entity::find_by_id(tx_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound("Payment transaction not found".to_string())
                    })?;
                let response = serde_json::to_value(&intent)?;

                let mut active: payment_transaction::ActiveModel = tx.clone().into();
                active.gateway_payment_method_id = Set(Some(method_id));
                let tx = active.update(txn).await?;
                let current = tx.status;

                let outcome = match intent.status.as_str() {
                    "succeeded" => {
                        mark_succeeded(txn, tx, response, intent.latest_charge.clone()).await?
                    }
                    "requires_action" => {
                        mark_in_flight(txn, tx, TransactionStatus::RequiresAction, response).await?
                    }
                    "processing" => {
                        mark_in_flight(txn, tx, TransactionStatus::Processing, response).await?
                    }
                    _ => mark_failed(txn, tx, response).await?,
                };
                Ok::<_, ServiceError>(match outcome {
                    Reconciliation::Applied(status) => status,
                    _ => current,
                })
            })
        })
        .await?;

        if status == TransactionStatus::Failed {
            return Err(ServiceError::PaymentError("Payment failed".to_string()));
        }
        info!(%status, "payment processed");
        Ok(PaymentOutcome {
            status,
            payment_intent,
        })
    }

    /// Ad-hoc intent outside checkout, tied to the caller's gateway customer.
    #[instrument(skip(self, identity, input), fields(user_id = %identity.user_id))]
    pub async fn create_payment_intent(
        &self,
        identity: &CustomerIdentity,
        input: CreatePaymentIntentInput,
    ) -> Result<PaymentIntent, ServiceError> {
        input.validate()?;
        let customer = self.customers.resolve(identity).await?;
        let currency = input
            .currency
            .unwrap_or_else(|| self.currency.clone())
            .to_ascii_lowercase();

        self.gateway
            .create_payment_intent(PaymentIntentRequest {
                amount: to_minor_units(input.amount)?,
                currency,
                customer: Some(customer),
                payment_method: input.payment_method_id,
                metadata: HashMap::from([("user_id".to_string(), identity.user_id.to_string())]),
            })
            .await
    }

    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn create_setup_intent(
        &self,
        identity: &CustomerIdentity,
    ) -> Result<SetupIntent, ServiceError> {
        let customer = self.customers.resolve(identity).await?;
        self.gateway.create_setup_intent(&customer).await
    }

    /// Saved cards of a gateway customer. Only the customer's own user may list them.
    #[instrument(skip(self))]
    pub async fn list_cards(
        &self,
        user_id: Uuid,
        gateway_customer_id: &str,
    ) -> Result<Vec<CardSummary>, ServiceError> {
        let owned = self.customers.get_customer_id(user_id).await?;
        if owned.as_deref() != Some(gateway_customer_id) {
            return Err(ServiceError::Forbidden("Access denied".to_string()));
        }
        self.gateway.list_customer_cards(gateway_customer_id).await
    }
}

async fn find_by_intent<C: ConnectionTrait>(
    conn: &C,
    intent_id: &str,
) -> Result<Option<payment_transaction::Model>, ServiceError> {
    Ok(payment_transaction::Entity::find()
        .filter(payment_transaction::Column::PaymentIntentId.eq(intent_id))
        .one(conn)
        .await?)
}

/// Transaction successful, order paid, invoice paid. A transaction that is
/// already terminal is left untouched.
async fn mark_succeeded<C: ConnectionTrait>(
    conn: &C,
    tx: payment_transaction::Model,
    gateway_response: serde_json::Value,
    charge_id: Option<String>,
) -> Result<Reconciliation, ServiceError> {
    if tx.status.is_terminal() {
        return Ok(Reconciliation::AlreadySettled);
    }
    let now = Utc::now();
    let order_id = tx.order_id;
    let invoice_id = tx.invoice_id;

    let mut active: payment_transaction::ActiveModel = tx.into();
    active.status = Set(TransactionStatus::Successful);
    active.gateway_response = Set(Some(gateway_response));
    active.charge_id = Set(charge_id);
    active.processed_at = Set(Some(now));
    active.paid_at = Set(Some(now));
    active.updated_at = Set(now);
    active.update(conn).await?;

    if let Some(order) = order::Entity::find_by_id(order_id).one(conn).await? {
        let mut order: order::ActiveModel = order.into();
        order.payment_status = Set(PaymentStatus::Paid);
        order.updated_at = Set(now);
        order.update(conn).await?;
    }

    if let Some(invoice_id) = invoice_id {
        if let Some(invoice) = invoice::Entity::find_by_id(invoice_id).one(conn).await? {
            let mut invoice: invoice::ActiveModel = invoice.into();
            invoice.status = Set(InvoiceStatus::Paid);
            invoice.paid_at = Set(Some(now));
            invoice.updated_at = Set(now);
            invoice.update(conn).await?;
        }
    }

    Ok(Reconciliation::Applied(TransactionStatus::Successful))
}

/// Marks the attempt failed. Order and invoice stay as they are so a retry
/// can still settle them.
async fn mark_failed<C: ConnectionTrait>(
    conn: &C,
    tx: payment_transaction::Model,
    gateway_response: serde_json::Value,
) -> Result<Reconciliation, ServiceError> {
    if tx.status.is_terminal() {
        return Ok(Reconciliation::AlreadySettled);
    }
    let now = Utc::now();
    let mut active: payment_transaction::ActiveModel = tx.into();
    active.status = Set(TransactionStatus::Failed);
    active.gateway_response = Set(Some(gateway_response));
    active.processed_at = Set(Some(now));
    active.updated_at = Set(now);
    active.update(conn).await?;
    Ok(Reconciliation::Applied(TransactionStatus::Failed))
}

async fn mark_in_flight<C: ConnectionTrait>(
    conn: &C,
    tx: payment_transaction::Model,
    status: TransactionStatus,
    gateway_response: serde_json::Value,
) -> Result<Reconciliation, ServiceError> {
    if tx.status.is_terminal() {
        return Ok(Reconciliation::AlreadySettled);
    }
    let mut active: payment_transaction::ActiveModel = tx.into();
    active.status = Set(status);
    active.gateway_response = Set(Some(gateway_response));
    active.updated_at = Set(Utc::now());
    active.update(conn).await?;
    Ok(Reconciliation::Applied(status))
}
