use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::TransactionStatus;
use crate::gateway::{GatewayCustomer, PaymentIntent};
use crate::services::payments::PaymentOutcome;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GatewayCustomerResponse {
    #[serde(rename = "customerId")]
    pub customer_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl From<GatewayCustomer> for GatewayCustomerResponse {
    fn from(customer: GatewayCustomer) -> Self {
        Self {
            customer_id: customer.id,
            email: customer.email,
            name: customer.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentResultResponse {
    pub status: TransactionStatus,
    #[serde(rename = "paymentIntent")]
    pub payment_intent: PaymentIntent,
}

impl From<PaymentOutcome> for PaymentResultResponse {
    fn from(outcome: PaymentOutcome) -> Self {
        Self {
            status: outcome.status,
            payment_intent: outcome.payment_intent,
        }
    }
}

/// Bare acknowledgement returned to the gateway
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}
