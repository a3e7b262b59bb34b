use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::signature::SignatureError;

pub const BOOKING_ID_KEY: &str = "booking_id";
pub const BOOKING_NUMBER_KEY: &str = "booking_number";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

/// A pending charge registered with the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeIntent {
    pub id: String, // Provider's ID (e.g., pi_123)
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub client_secret: Option<String>,
    pub failure_reason: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl ChargeIntent {
    pub fn booking_id(&self) -> Option<Uuid> {
        self.metadata
            .get(BOOKING_ID_KEY)
            .and_then(|v| Uuid::parse_str(v).ok())
    }

    /// Terminal outcome of the intent, `None` while the provider is still working on it.
    pub fn outcome(&self) -> Option<PaymentOutcome> {
        match self.status {
            IntentStatus::Succeeded => Some(PaymentOutcome::Succeeded {
                transaction_id: self.id.clone(),
                amount: self.amount,
                method: Some("card".to_string()),
            }),
            IntentStatus::Failed | IntentStatus::Canceled => Some(PaymentOutcome::Failed {
                reason: self
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| format!("intent {} {:?}", self.id, self.status)),
            }),
            IntentStatus::RequiresPaymentMethod | IntentStatus::Processing => None,
        }
    }
}

/// Result of a charge as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded {
        transaction_id: String,
        amount: i64,
        method: Option<String>,
    },
    Failed {
        reason: String,
    },
}

/// A webhook delivery after its signature has been checked.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub intent_id: String,
    pub booking_id: Uuid,
    /// `None` for event types that carry no payment result.
    pub outcome: Option<PaymentOutcome>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment provider unreachable: {0}")]
    Unavailable(String),
    #[error("Payment intent not found: {0}")]
    IntentNotFound(String),
    #[error("Payment provider rejected the request: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register a charge and obtain the client secret the browser confirms it with.
    async fn create_charge_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<ChargeIntent, GatewayError>;

    /// Current provider-side state of an intent.
    async fn retrieve_intent(&self, intent_id: &str) -> Result<ChargeIntent, GatewayError>;

    /// Check the signature over the raw body, then decode it.
    fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, SignatureError>;
}

// Provider webhook body: {"id", "type", "data": {"object": <payment intent>}}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    id: String,
    #[serde(rename = "type")]
    type_: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: PaymentIntentObject,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentObject {
    id: String,
    #[serde(default)]
    amount: i64,
    amount_received: Option<i64>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    last_payment_error: Option<LastPaymentError>,
    #[serde(default)]
    payment_method_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LastPaymentError {
    message: Option<String>,
}

/// Decode a signature-checked webhook body.
pub fn parse_webhook_payload(raw_body: &[u8]) -> Result<WebhookEvent, SignatureError> {
    let payload: WebhookPayload = serde_json::from_slice(raw_body)
        .map_err(|e| SignatureError::MalformedPayload(e.to_string()))?;

    let intent = payload.data.object;
    let booking_id = intent
        .metadata
        .get(BOOKING_ID_KEY)
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| SignatureError::MalformedPayload("missing booking_id metadata".to_string()))?;

    let outcome = match payload.type_.as_str() {
        "payment_intent.succeeded" => Some(PaymentOutcome::Succeeded {
            transaction_id: intent.id.clone(),
            amount: intent.amount_received.unwrap_or(intent.amount),
            method: intent.payment_method_types.first().cloned(),
        }),
        "payment_intent.payment_failed" | "payment_intent.canceled" => Some(PaymentOutcome::Failed {
            reason: intent
                .last_payment_error
                .and_then(|e| e.message)
                .unwrap_or_else(|| payload.type_.clone()),
        }),
        _ => None,
    };

    Ok(WebhookEvent {
        event_id: payload.id,
        event_type: payload.type_,
        intent_id: intent.id,
        booking_id,
        outcome,
    })
}
