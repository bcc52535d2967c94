//! Payment gateway boundary.
//!
//! Services talk to the processor only through [`PaymentGateway`]. The
//! production implementation is [`StripeGateway`]; [`FakeGateway`] is an
//! in-process stand-in used by the test harness and local development.

mod fake;
mod stripe;
pub mod webhook;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;

pub use fake::FakeGateway;
pub use stripe::StripeGateway;
pub use webhook::{GatewayEvent, WebhookVerifier};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCustomer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentIntentRequest {
    /// Amount in minor currency units
    pub amount: i64,
    /// Lower-case ISO currency code
    pub currency: String,
    pub customer: Option<String>,
    pub payment_method: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub latest_charge: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SetupIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
}

/// Saved card as shown to the customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CardSummary {
    pub id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<GatewayCustomer, ServiceError>;

    async fn retrieve_customer(&self, customer_id: &str) -> Result<GatewayCustomer, ServiceError>;

    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError>;

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, ServiceError>;

    /// Confirms synchronously. The returned status may still be
    /// `requires_action` or `processing`.
    async fn confirm_payment_intent(
        &self,
        intent_id: &str,
        payment_method_id: &str,
    ) -> Result<PaymentIntent, ServiceError>;

    async fn create_setup_intent(&self, customer_id: &str) -> Result<SetupIntent, ServiceError>;

    async fn list_customer_cards(
        &self,
        customer_id: &str,
    ) -> Result<Vec<CardSummary>, ServiceError>;

    /// Verifies a webhook signature header against the raw body and decodes
    /// the event.
    fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, ServiceError>;
}

/// Converts a decimal amount to integer minor units, rounding half away from zero.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    let out_of_range = || ServiceError::ValidationError(format!("amount out of range: {}", amount));
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(out_of_range)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(out_of_range)
}

/// `INV-{unix millis}-{last six hex chars of the order id}`
pub fn invoice_number(order_id: Uuid, issued_at: DateTime<Utc>) -> String {
    let simple = order_id.simple().to_string();
    format!(
        "INV-{}-{}",
        issued_at.timestamp_millis(),
        &simple[simple.len() - 6..]
    )
}
