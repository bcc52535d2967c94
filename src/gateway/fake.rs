use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    CardSummary, CreateCustomerRequest, GatewayCustomer, PaymentGateway, PaymentIntent,
    PaymentIntentRequest, SetupIntent,
};
use super::webhook::{GatewayEvent, WebhookVerifier};
use crate::errors::ServiceError;

/// In-memory gateway with deterministic ids (`cus_fake_1`, `pi_fake_1`, ...).
/// Confirmation outcome, latency and failures are switchable at runtime so
/// checkout and payment flows can be driven without network access.
#[derive(Debug)]
pub struct FakeGateway {
    customers_created: AtomicUsize,
    intents_created: AtomicUsize,
    setup_intents_created: AtomicUsize,
    fail_intents: AtomicBool,
    fail_confirm: AtomicBool,
    confirm_status: Mutex<String>,
    customer_delay: Mutex<Duration>,
    customers: Mutex<HashMap<String, GatewayCustomer>>,
    intents: Mutex<HashMap<String, PaymentIntent>>,
    cards: Mutex<HashMap<String, Vec<CardSummary>>>,
    verifier: WebhookVerifier,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            customers_created: AtomicUsize::new(0),
            intents_created: AtomicUsize::new(0),
            setup_intents_created: AtomicUsize::new(0),
            fail_intents: AtomicBool::new(false),
            fail_confirm: AtomicBool::new(false),
            confirm_status: Mutex::new("succeeded".to_string()),
            customer_delay: Mutex::new(Duration::ZERO),
            customers: Mutex::new(HashMap::new()),
            intents: Mutex::new(HashMap::new()),
            cards: Mutex::new(HashMap::new()),
            verifier: WebhookVerifier::new(Self::WEBHOOK_SECRET, 300),
        }
    }
}

impl FakeGateway {
    pub const WEBHOOK_SECRET: &'static str = "whsec_fake_gateway";

    pub fn new() -> Self {
        Self::default()
    }

    /// Signs a webhook body the way the real gateway would.
    pub fn sign_webhook(&self, payload: &[u8]) -> Result<String, ServiceError> {
        self.verifier.sign(payload, chrono::Utc::now().timestamp())
    }

    pub fn customers_created(&self) -> usize {
        self.customers_created.load(Ordering::SeqCst)
    }

    pub fn intents_created(&self) -> usize {
        self.intents_created.load(Ordering::SeqCst)
    }

    pub fn setup_intents_created(&self) -> usize {
        self.setup_intents_created.load(Ordering::SeqCst)
    }

    pub fn fail_payment_intents(&self, fail: bool) {
        self.fail_intents.store(fail, Ordering::SeqCst);
    }

    pub fn fail_confirmations(&self, fail: bool) {
        self.fail_confirm.store(fail, Ordering::SeqCst);
    }

    /// Status reported by subsequent confirmations
    pub async fn set_confirm_status(&self, status: &str) {
        *self.confirm_status.lock().await = status.to_string();
    }

    /// Latency added to customer creation, widening race windows in tests
    pub async fn set_customer_delay(&self, delay: Duration) {
        *self.customer_delay.lock().await = delay;
    }

    pub async fn add_card(&self, customer_id: &str, card: CardSummary) {
        self.cards
            .lock()
            .await
            .entry(customer_id.to_string())
            .or_default()
            .push(card);
    }

    pub async fn intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.intents.lock().await.get(intent_id).cloned()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<GatewayCustomer, ServiceError> {
        let delay = *self.customer_delay.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let n = self.customers_created.fetch_add(1, Ordering::SeqCst) + 1;
        let customer = GatewayCustomer {
            id: format!("cus_fake_{}", n),
            email: Some(request.email),
            name: Some(request.name),
        };
        self.customers
            .lock()
            .await
            .insert(customer.id.clone(), customer.clone());
        Ok(customer)
    }

    async fn retrieve_customer(&self, customer_id: &str) -> Result<GatewayCustomer, ServiceError> {
        self.customers
            .lock()
            .await
            .get(customer_id)
            .cloned()
            .ok_or_else(|| ServiceError::GatewayError(format!("No such customer: '{}'", customer_id)))
    }

    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        if self.fail_intents.load(Ordering::SeqCst) {
            return Err(ServiceError::GatewayError(
                "Payment gateway unavailable".to_string(),
            ));
        }
        let n = self.intents_created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("pi_fake_{}", n);
        let intent = PaymentIntent {
            client_secret: Some(format!("{}_secret", id)),
            id: id.clone(),
            status: "requires_payment_method".to_string(),
            amount: request.amount,
            currency: request.currency,
            customer: request.customer,
            latest_charge: None,
        };
        self.intents.lock().await.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, ServiceError> {
        self.intent(intent_id)
            .await
            .ok_or_else(|| ServiceError::GatewayError(format!("No such payment_intent: {}", intent_id)))
    }

    async fn confirm_payment_intent(
        &self,
        intent_id: &str,
        _payment_method_id: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        if self.fail_confirm.load(Ordering::SeqCst) {
            return Err(ServiceError::GatewayError(
                "Your card was declined.".to_string(),
            ));
        }
        let status = self.confirm_status.lock().await.clone();
        let mut intents = self.intents.lock().await;
        let intent = intents.get_mut(intent_id).ok_or_else(|| {
            ServiceError::GatewayError(format!("No such payment_intent: {}", intent_id))
        })?;
        intent.status = status;
        if intent.status == "succeeded" {
            intent.latest_charge = Some(format!("ch_{}", intent_id));
        }
        Ok(intent.clone())
    }

    async fn create_setup_intent(&self, customer_id: &str) -> Result<SetupIntent, ServiceError> {
        let n = self.setup_intents_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SetupIntent {
            id: format!("seti_fake_{}", n),
            client_secret: Some(format!("seti_fake_{}_secret", n)),
            customer: Some(customer_id.to_string()),
        })
    }

    async fn list_customer_cards(
        &self,
        customer_id: &str,
    ) -> Result<Vec<CardSummary>, ServiceError> {
        Ok(self
            .cards
            .lock()
            .await
            .get(customer_id)
            .cloned()
            .unwrap_or_default())
    }

    fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, ServiceError> {
        self.verifier.construct_event(payload, signature_header)
    }
}
