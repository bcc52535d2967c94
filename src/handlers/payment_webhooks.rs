use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;
use tracing::{info, warn};

use crate::dto::WebhookAck;
use crate::errors::ServiceError;
use crate::services::payments::Reconciliation;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

// POST /api/v1/payments/webhooks
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhooks",
    summary = "Gateway webhook",
    description = "Signature-verified gateway events. Unknown intents and event types are acknowledged without side effects.",
    request_body(content = String, content_type = "application/json"),
    params(("Stripe-Signature" = String, Header, description = "t=<unix>,v1=<hex hmac>")),
    responses(
        (status = 200, description = "Webhook accepted", body = WebhookAck),
        (status = 400, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ServiceError::WebhookSignature("Missing signature header".to_string()))?;

    let payments = &state.services.payments;
    let event = payments
        .gateway()
        .construct_event(&body, signature)
        .map_err(|err| {
            warn!(error = %err, "payment webhook rejected");
            err
        })?;

    let event_id = event.id.clone();
    match payments.handle_gateway_event(event).await? {
        Reconciliation::Applied(status) => {
            info!(%event_id, %status, "payment webhook applied");
        }
        Reconciliation::AlreadySettled => {
            info!(%event_id, "payment webhook for settled transaction");
        }
        Reconciliation::Ignored => {}
    }

    Ok(Json(WebhookAck { received: true }))
}
