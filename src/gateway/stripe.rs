use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use super::{
    CardSummary, CreateCustomerRequest, GatewayCustomer, PaymentGateway, PaymentIntent,
    PaymentIntentRequest, SetupIntent,
};
use super::webhook::{GatewayEvent, WebhookVerifier};
use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Stripe REST client. Requests are form-encoded and authenticated with the
/// secret key; every call is bounded by the configured gateway timeout.
#[derive(Clone)]
pub struct StripeGateway {
    secret_key: String,
    api_base: String,
    client: reqwest::Client,
    verifier: WebhookVerifier,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodList {
    data: Vec<PaymentMethodObject>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodObject {
    id: String,
    card: Option<CardDetails>,
}

#[derive(Debug, Deserialize)]
struct CardDetails {
    brand: String,
    last4: String,
    exp_month: u32,
    exp_year: u32,
}

impl StripeGateway {
    pub fn new(
        secret_key: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
        verifier: WebhookVerifier,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self {
            secret_key: secret_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
            verifier,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            config.stripe_secret_key.clone(),
            config.stripe_api_base.clone(),
            config.gateway_timeout(),
            WebhookVerifier::new(
                config.payment_webhook_secret.clone(),
                config.payment_webhook_tolerance_secs,
            ),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, ServiceError> {
        let response = self
            .client
            .post(self.url(path))
            .basic_auth(&self.secret_key, Some(""))
            .form(form)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ServiceError> {
        let response = self
            .client
            .get(self.url(path))
            .basic_auth(&self.secret_key, Some(""))
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }
}

fn transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::GatewayError("Payment gateway timed out".to_string())
    } else {
        ServiceError::GatewayError(format!("Payment gateway unavailable: {}", err))
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .and_then(|b| {
                if let Some(code) = &b.error.code {
                    warn!(%status, code, "gateway rejected request");
                }
                b.error.message
            })
            .unwrap_or_else(|| format!("Payment gateway returned {}", status));
        return Err(ServiceError::GatewayError(message));
    }

    response
        .json()
        .await
        .map_err(|e| ServiceError::GatewayError(format!("Unreadable gateway response: {}", e)))
}

fn metadata_fields(
    form: &mut Vec<(String, String)>,
    metadata: &std::collections::HashMap<String, String>,
) {
    let mut keys: Vec<_> = metadata.keys().collect();
    keys.sort();
    for key in keys {
        form.push((format!("metadata[{}]", key), metadata[key].clone()));
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(email = %request.email))]
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<GatewayCustomer, ServiceError> {
        let mut form = vec![
            ("name".to_string(), request.name),
            ("email".to_string(), request.email),
        ];
        if let Some(phone) = request.phone {
            form.push(("phone".to_string(), phone));
        }
        metadata_fields(&mut form, &request.metadata);

        let customer: GatewayCustomer = self.post_form("customers", &form).await?;
        info!(customer_id = %customer.id, "gateway customer created");
        Ok(customer)
    }

    #[instrument(skip(self))]
    async fn retrieve_customer(&self, customer_id: &str) -> Result<GatewayCustomer, ServiceError> {
        self.get(&format!("customers/{}", customer_id), &[]).await
    }

    #[instrument(skip(self, request), fields(amount = request.amount, currency = %request.currency))]
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let mut form = vec![
            ("amount".to_string(), request.amount.to_string()),
            ("currency".to_string(), request.currency),
        ];
        if let Some(customer) = request.customer {
            form.push(("customer".to_string(), customer));
        }
        match request.payment_method {
            Some(payment_method) => form.push(("payment_method".to_string(), payment_method)),
            None => form.push((
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            )),
        }
        metadata_fields(&mut form, &request.metadata);

        let intent: PaymentIntent = self.post_form("payment_intents", &form).await?;
        info!(intent_id = %intent.id, status = %intent.status, "payment intent created");
        Ok(intent)
    }

    #[instrument(skip(self))]
    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, ServiceError> {
        self.get(&format!("payment_intents/{}", intent_id), &[]).await
    }

    #[instrument(skip(self, payment_method_id))]
    async fn confirm_payment_intent(
        &self,
        intent_id: &str,
        payment_method_id: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        let form = vec![(
            "payment_method".to_string(),
            payment_method_id.to_string(),
        )];
        self.post_form(&format!("payment_intents/{}/confirm", intent_id), &form)
            .await
    }

    #[instrument(skip(self))]
    async fn create_setup_intent(&self, customer_id: &str) -> Result<SetupIntent, ServiceError> {
        let form = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("payment_method_types[]".to_string(), "card".to_string()),
        ];
        self.post_form("setup_intents", &form).await
    }

    #[instrument(skip(self))]
    async fn list_customer_cards(
        &self,
        customer_id: &str,
    ) -> Result<Vec<CardSummary>, ServiceError> {
        let list: PaymentMethodList = self
            .get(
                "payment_methods",
                &[("customer", customer_id), ("type", "card")],
            )
            .await?;

        Ok(list
            .data
            .into_iter()
            .filter_map(|pm| {
                pm.card.map(|card| CardSummary {
                    id: pm.id,
                    brand: card.brand,
                    last4: card.last4,
                    exp_month: card.exp_month,
                    exp_year: card.exp_year,
                })
            })
            .collect())
    }

    fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, ServiceError> {
        self.verifier.construct_event(payload, signature_header)
    }
}
