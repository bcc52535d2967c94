use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_INTENT_FAILED: &str = "payment_intent.payment_failed";

/// Asynchronous notification pushed by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: GatewayEventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEventData {
    pub object: serde_json::Value,
}

impl GatewayEvent {
    /// Id of the object the event is about (the payment intent for
    /// `payment_intent.*` events).
    pub fn object_id(&self) -> Option<&str> {
        self.data.object.get("id").and_then(|v| v.as_str())
    }

    pub fn object_str(&self, field: &str) -> Option<&str> {
        self.data.object.get(field).and_then(|v| v.as_str())
    }
}

/// Verifies `Stripe-Signature` style headers: `t=<unix secs>,v1=<hex hmac>`
/// where the HMAC-SHA256 covers `"{t}.{raw body}"`.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Verifies the signature against the raw body and decodes the event.
    pub fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, ServiceError> {
        self.verify_at(payload, signature_header, Utc::now().timestamp())?;
        serde_json::from_slice(payload).map_err(|e| {
            ServiceError::WebhookSignature(format!("Invalid webhook payload: {}", e))
        })
    }

    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<(), ServiceError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(invalid_header)?;
        if signatures.is_empty() {
            return Err(invalid_header());
        }
        let issued_at: i64 = timestamp.parse().map_err(|_| invalid_header())?;
        if now.abs_diff(issued_at) > self.tolerance_secs {
            return Err(ServiceError::WebhookSignature(
                "Webhook timestamp outside tolerance".to_string(),
            ));
        }

        let matched = signatures.iter().any(|candidate| {
            let Ok(expected) = hex::decode(candidate) else {
                return false;
            };
            let Ok(mut mac) = self.mac() else {
                return false;
            };
            mac.update(timestamp.as_bytes());
            mac.update(b".");
            mac.update(payload);
            // constant-time comparison
            mac.verify_slice(&expected).is_ok()
        });

        if matched {
            Ok(())
        } else {
            Err(ServiceError::WebhookSignature(
                "Webhook signature mismatch".to_string(),
            ))
        }
    }

    /// Builds a header the verifier accepts. Used by the fake gateway and tests.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, ServiceError> {
        let mut mac = self.mac()?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(format!(
            "t={},v1={}",
            timestamp,
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    fn mac(&self) -> Result<HmacSha256, ServiceError> {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ServiceError::InternalError(format!("invalid webhook secret: {}", e)))
    }
}

fn invalid_header() -> ServiceError {
    ServiceError::WebhookSignature("Invalid signature header".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const BODY: &[u8] = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new("whsec_test", 300)
    }

    #[test]
    fn accepts_own_signature() {
        let v = verifier();
        let header = v.sign(BODY, 1_000).unwrap();
        assert!(v.verify_at(BODY, &header, 1_100).is_ok());
    }

    #[test]
    fn rejects_tampered_body() {
        let v = verifier();
        let header = v.sign(BODY, 1_000).unwrap();
        let tampered = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_2"}}}"#;
        assert_matches!(
            v.verify_at(tampered, &header, 1_000),
            Err(ServiceError::WebhookSignature(msg)) if msg.contains("mismatch")
        );
    }

    #[test]
    fn rejects_other_secret() {
        let header = WebhookVerifier::new("whsec_other", 300).sign(BODY, 1_000).unwrap();
        assert!(verifier().verify_at(BODY, &header, 1_000).is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let v = verifier();
        let header = v.sign(BODY, 1_000).unwrap();
        assert_matches!(
            v.verify_at(BODY, &header, 1_301),
            Err(ServiceError::WebhookSignature(msg)) if msg.contains("tolerance")
        );
    }

    #[test]
    fn rejects_malformed_headers() {
        let v = verifier();
        for header in [
            "",
            "t=abc,v1=00",
            "v1=deadbeef",
            "t=1000",
            "t=-9223372036854775808,v1=00",
            "t=9223372036854775807,v1=00",
        ] {
            assert!(v.verify_at(BODY, header, 1_000).is_err(), "{header}");
        }
    }

    #[test]
    fn extreme_timestamps_fall_outside_tolerance() {
        let v = verifier();
        assert_matches!(
            v.verify_at(BODY, "t=-9223372036854775808,v1=00", i64::MAX),
            Err(ServiceError::WebhookSignature(msg)) if msg.contains("tolerance")
        );
        let header = v.sign(BODY, i64::MIN).unwrap();
        assert!(v.verify_at(BODY, &header, i64::MIN + 300).is_ok());
    }

    #[test]
    fn any_v1_candidate_may_match() {
        let v = verifier();
        let good = v.sign(BODY, 1_000).unwrap();
        let sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t=1000,v1=00ff,v1={}", sig);
        assert!(v.verify_at(BODY, &header, 1_000).is_ok());
    }

    #[test]
    fn construct_event_decodes_payload() {
        let v = verifier();
        let header = v.sign(BODY, Utc::now().timestamp()).unwrap();
        let event = v.construct_event(BODY, &header).unwrap();
        assert_eq!(event.event_type, PAYMENT_INTENT_SUCCEEDED);
        assert_eq!(event.object_id(), Some("pi_1"));
    }
}
