use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tourdesk_core::payment::{parse_webhook_payload, BOOKING_ID_KEY, BOOKING_NUMBER_KEY};
use tourdesk_core::{
    BookingError, BookingResult, ChargeIntent, Clock, GatewayError, IntentStatus, PaymentGateway,
    PaymentOutcome, SignatureError, WebhookEvent, WebhookVerifier,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::manager::BookingManager;
use crate::models::{Booking, BookingStatus, PaymentStatus, Requester};
use crate::reconciliation::Reconciliation;

pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    manager: Arc<BookingManager>,
}

impl PaymentOrchestrator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, manager: Arc<BookingManager>) -> Self {
        Self { gateway, manager }
    }

    /// Register a charge for the booking total with the provider.
    pub async fn create_payment_intent(
        &self,
        requester: &Requester,
        booking_id: Uuid,
    ) -> BookingResult<ChargeIntent> {
        let booking = self.manager.get_booking(requester, booking_id).await?;

        if booking.status != BookingStatus::Pending || booking.payment.status == PaymentStatus::Paid {
            return Err(BookingError::InvalidState(format!(
                "booking {} is not awaiting payment",
                booking.booking_number
            )));
        }

        let mut metadata = BTreeMap::new();
        metadata.insert(BOOKING_ID_KEY.to_string(), booking.id.to_string());
        metadata.insert(BOOKING_NUMBER_KEY.to_string(), booking.booking_number.clone());

        let intent = self
            .gateway
            .create_charge_intent(booking.pricing.total_amount, &booking.pricing.currency, metadata)
            .await?;

        info!(
            "Payment intent {} created for booking {} ({} {})",
            intent.id, booking.booking_number, intent.amount, intent.currency
        );
        Ok(intent)
    }

    /// Pull the intent state from the provider and apply it. A non-terminal
    /// intent leaves the booking untouched.
    pub async fn confirm_payment(
        &self,
        requester: &Requester,
        booking_id: Uuid,
        intent_id: &str,
    ) -> BookingResult<Booking> {
        let booking = self.manager.get_booking(requester, booking_id).await?;
        let intent = self.gateway.retrieve_intent(intent_id).await?;

        if intent.booking_id() != Some(booking.id) {
            return Err(BookingError::Validation(format!(
                "payment intent {} does not belong to booking {}",
                intent_id, booking.booking_number
            )));
        }

        let Some(outcome) = intent.outcome() else {
            return Ok(booking);
        };
        warn_on_amount_mismatch(&booking, &outcome);

        let (booking, _) = self.manager.apply_payment_result(booking.id, &outcome).await?;
        Ok(booking)
    }

    /// Verify and apply a provider webhook. Deliveries for unknown bookings are
    /// acknowledged so the provider stops redelivering them.
    pub async fn handle_webhook(&self, raw_body: &[u8], signature_header: &str) -> BookingResult<Reconciliation> {
        let event: WebhookEvent = self.gateway.verify_and_parse_webhook(raw_body, signature_header)?;

        let Some(outcome) = event.outcome else {
            info!("Webhook {} ({}) has no payment result", event.event_id, event.event_type);
            return Ok(Reconciliation::Ignored("event type not handled"));
        };

        match self.manager.apply_payment_result(event.booking_id, &outcome).await {
            Ok((_, result)) => {
                info!(
                    "Webhook {} for intent {} reconciled: {:?}",
                    event.event_id, event.intent_id, result
                );
                Ok(result)
            }
            Err(BookingError::NotFound(_)) => {
                warn!("Webhook {} references unknown booking {}", event.event_id, event.booking_id);
                Ok(Reconciliation::Ignored("unknown booking"))
            }
            Err(e) => Err(e),
        }
    }
}

fn warn_on_amount_mismatch(booking: &Booking, outcome: &PaymentOutcome) {
    if let PaymentOutcome::Succeeded { amount, .. } = outcome {
        if *amount != booking.pricing.total_amount {
            warn!(
                "Booking {} charged {} but total is {}",
                booking.booking_number, amount, booking.pricing.total_amount
            );
        }
    }
}

/// In-process payment provider for development and tests. Intents live in
/// memory and are settled explicitly with [`SandboxGateway::settle`].
pub struct SandboxGateway {
    verifier: WebhookVerifier,
    clock: Arc<dyn Clock>,
    intents: Mutex<HashMap<String, ChargeIntent>>,
}

impl SandboxGateway {
    pub fn new(verifier: WebhookVerifier, clock: Arc<dyn Clock>) -> Self {
        Self {
            verifier,
            clock,
            intents: Mutex::new(HashMap::new()),
        }
    }

    /// Move an intent to a terminal (or processing) state, as the provider would
    /// once the customer completes checkout.
    pub fn settle(
        &self,
        intent_id: &str,
        status: IntentStatus,
        failure_reason: Option<String>,
    ) -> Result<ChargeIntent, GatewayError> {
        let mut intents = self.intents()?;
        let intent = intents
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::IntentNotFound(intent_id.to_string()))?;
        intent.status = status;
        intent.failure_reason = failure_reason;
        Ok(intent.clone())
    }

    /// Body and signature header of the webhook the provider would send for
    /// the intent's current state.
    pub fn webhook_for(&self, intent_id: &str) -> Result<(Vec<u8>, String), GatewayError> {
        let intent = self
            .intents()?
            .get(intent_id)
            .cloned()
            .ok_or_else(|| GatewayError::IntentNotFound(intent_id.to_string()))?;

        let event_type = match intent.status {
            IntentStatus::Succeeded => "payment_intent.succeeded",
            IntentStatus::Failed => "payment_intent.payment_failed",
            IntentStatus::Canceled => "payment_intent.canceled",
            IntentStatus::Processing => "payment_intent.processing",
            IntentStatus::RequiresPaymentMethod => "payment_intent.created",
        };
        let received = if intent.status == IntentStatus::Succeeded { Some(intent.amount) } else { None };

        let body = json!({
            "id": format!("evt_{}", Uuid::new_v4().simple()),
            "type": event_type,
            "data": {
                "object": {
                    "id": intent.id,
                    "amount": intent.amount,
                    "amount_received": received,
                    "currency": intent.currency.to_lowercase(),
                    "metadata": intent.metadata,
                    "payment_method_types": ["card"],
                    "last_payment_error": intent.failure_reason.as_ref().map(|m| json!({ "message": m })),
                }
            }
        })
        .to_string()
        .into_bytes();

        let header = self.verifier.sign(&body, self.clock.now().timestamp());
        Ok((body, header))
    }

    fn intents(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, ChargeIntent>>, GatewayError> {
        self.intents
            .lock()
            .map_err(|_| GatewayError::Unavailable("sandbox state poisoned".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_charge_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<ChargeIntent, GatewayError> {
        if amount <= 0 {
            return Err(GatewayError::Rejected(format!("invalid amount {}", amount)));
        }

        let id = format!("pi_sandbox_{}", Uuid::new_v4().simple());
        let intent = ChargeIntent {
            client_secret: Some(format!("{}_secret_{}", id, Uuid::new_v4().simple())),
            id: id.clone(),
            amount,
            currency: currency.to_uppercase(),
            status: IntentStatus::RequiresPaymentMethod,
            failure_reason: None,
            metadata,
            created_at: self.clock.now(),
        };

        self.intents()?.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<ChargeIntent, GatewayError> {
        self.intents()?
            .get(intent_id)
            .cloned()
            .ok_or_else(|| GatewayError::IntentNotFound(intent_id.to_string()))
    }

    fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, SignatureError> {
        self.verifier.verify(raw_body, signature_header, self.clock.now())?;
        parse_webhook_payload(raw_body)
    }
}
