use chrono::{DateTime, Utc};
use tourdesk_core::PaymentOutcome;

use crate::models::{Booking, BookingStatus, PaymentStatus};

pub const GATEWAY_AUTHOR: &str = "payment-gateway";

/// What applying a payment outcome did to a booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The booking changed and must be persisted.
    Applied { confirmed: bool },
    /// Same result already recorded; nothing to do.
    Duplicate,
    /// Outcome arrived after a conflicting settled state and was dropped.
    Ignored(&'static str),
}

impl Reconciliation {
    pub fn changed(&self) -> bool {
        matches!(self, Reconciliation::Applied { .. })
    }
}

/// Fold a provider outcome into `booking`.
///
/// Replaying the same outcome, or a failure after a success, leaves the booking as is,
/// so deliveries can repeat and arrive in any order.
pub fn reconcile(booking: &mut Booking, outcome: &PaymentOutcome, now: DateTime<Utc>) -> Reconciliation {
    match outcome {
        PaymentOutcome::Succeeded {
            transaction_id,
            amount,
            method,
        } => {
            if matches!(booking.payment.status, PaymentStatus::Paid | PaymentStatus::Refunded) {
                return if booking.payment.transaction_id.as_deref() == Some(transaction_id.as_str()) {
                    Reconciliation::Duplicate
                } else {
                    Reconciliation::Ignored("booking already settled by another transaction")
                };
            }

            booking.payment.status = PaymentStatus::Paid;
            booking.payment.transaction_id = Some(transaction_id.clone());
            booking.payment.paid_amount = *amount;
            booking.payment.payment_date = Some(now);
            if method.is_some() {
                booking.payment.method = method.clone();
            }
            booking.add_note(
                format!(
                    "Payment {} received: {} {}",
                    transaction_id, amount, booking.pricing.currency
                ),
                GATEWAY_AUTHOR,
                now,
            );

            let confirmed = booking.status == BookingStatus::Pending;
            if confirmed {
                booking.status = BookingStatus::Confirmed;
            }
            Reconciliation::Applied { confirmed }
        }
        PaymentOutcome::Failed { reason } => match booking.payment.status {
            PaymentStatus::Paid | PaymentStatus::Refunded => {
                Reconciliation::Ignored("failure reported after payment settled")
            }
            PaymentStatus::Failed | PaymentStatus::Pending => {
                let note = format!("Payment failed: {}", reason);
                // Each distinct decline is kept; a redelivered one is not.
                if booking.notes.iter().any(|n| n.author == GATEWAY_AUTHOR && n.content == note) {
                    return Reconciliation::Duplicate;
                }
                booking.payment.status = PaymentStatus::Failed;
                booking.add_note(note, GATEWAY_AUTHOR, now);
                Reconciliation::Applied { confirmed: false }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaymentRecord, PricingSnapshot, Traveler, TravelerType};
    use chrono::{NaiveDate, TimeZone};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 5, 1, 10, 0, 0).unwrap()
    }

    fn booking() -> Booking {
        let start = NaiveDate::from_ymd_opt(2030, 6, 1).unwrap();
        Booking {
            id: Uuid::new_v4(),
            booking_number: "TD-300501-AAAA0001".to_string(),
            customer_id: "cust-1".to_string(),
            catalog_item_id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
            travelers: vec![Traveler {
                name: "Ann".to_string(),
                traveler_type: TravelerType::Adult,
                age: None,
            }],
            total_travelers: 1,
            start_date: start,
            end_date: start,
            pricing: PricingSnapshot {
                base_price: 15000,
                subtotal: 15000,
                taxes: 1500,
                total_amount: 16500,
                currency: "USD".to_string(),
            },
            payment: PaymentRecord::pending(),
            status: BookingStatus::Pending,
            notes: vec![],
            special_requests: None,
            emergency_contact: None,
            contact_email: None,
            version: 0,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn success(txn: &str) -> PaymentOutcome {
        PaymentOutcome::Succeeded {
            transaction_id: txn.to_string(),
            amount: 16500,
            method: Some("card".to_string()),
        }
    }

    #[test]
    fn test_success_confirms_pending_booking() {
        let mut b = booking();
        assert_eq!(reconcile(&mut b, &success("abc"), now()), Reconciliation::Applied { confirmed: true });

        assert_eq!(b.status, BookingStatus::Confirmed);
        assert_eq!(b.payment.status, PaymentStatus::Paid);
        assert_eq!(b.payment.paid_amount, 16500);
        assert_eq!(b.payment.transaction_id.as_deref(), Some("abc"));
        assert_eq!(b.payment.payment_date, Some(now()));
        assert_eq!(b.notes.len(), 1);
    }

    #[test]
    fn test_replayed_success_is_a_no_op() {
        let mut b = booking();
        reconcile(&mut b, &success("abc"), now());
        let snapshot = serde_json::to_value(&b).unwrap();

        assert_eq!(reconcile(&mut b, &success("abc"), now()), Reconciliation::Duplicate);
        assert_eq!(serde_json::to_value(&b).unwrap(), snapshot);
    }

    #[test]
    fn test_failure_after_success_is_ignored() {
        let mut b = booking();
        reconcile(&mut b, &success("abc"), now());
        let failed = PaymentOutcome::Failed { reason: "late".to_string() };

        assert!(matches!(reconcile(&mut b, &failed, now()), Reconciliation::Ignored(_)));
        assert_eq!(b.payment.status, PaymentStatus::Paid);
        assert_eq!(b.status, BookingStatus::Confirmed);
    }

    #[test]
    fn test_failure_keeps_booking_status() {
        let mut b = booking();
        let failed = PaymentOutcome::Failed { reason: "card declined".to_string() };

        assert_eq!(reconcile(&mut b, &failed, now()), Reconciliation::Applied { confirmed: false });
        assert_eq!(b.payment.status, PaymentStatus::Failed);
        assert_eq!(b.status, BookingStatus::Pending);
        assert_eq!(reconcile(&mut b, &failed, now()), Reconciliation::Duplicate);
        assert_eq!(b.notes.len(), 1);

        // A retried charge may still succeed.
        assert_eq!(reconcile(&mut b, &success("retry"), now()), Reconciliation::Applied { confirmed: true });
    }

    #[test]
    fn test_each_distinct_decline_is_noted_once() {
        let mut b = booking();
        let declined = PaymentOutcome::Failed { reason: "card declined".to_string() };
        let expired = PaymentOutcome::Failed { reason: "card expired".to_string() };

        reconcile(&mut b, &declined, now());
        assert_eq!(reconcile(&mut b, &expired, now()), Reconciliation::Applied { confirmed: false });
        assert_eq!(reconcile(&mut b, &expired, now()), Reconciliation::Duplicate);
        assert_eq!(reconcile(&mut b, &declined, now()), Reconciliation::Duplicate);

        let contents: Vec<&str> = b.notes.iter().map(|n| n.content.as_str()).collect();
        assert_eq!(contents, vec!["Payment failed: card declined", "Payment failed: card expired"]);
        assert_eq!(b.payment.status, PaymentStatus::Failed);
    }

    #[test]
    fn test_success_on_cancelled_booking_records_payment_only() {
        let mut b = booking();
        b.status = BookingStatus::Cancelled;

        assert_eq!(reconcile(&mut b, &success("abc"), now()), Reconciliation::Applied { confirmed: false });
        assert_eq!(b.status, BookingStatus::Cancelled);
        assert_eq!(b.payment.status, PaymentStatus::Paid);
    }

    #[test]
    fn test_second_transaction_is_ignored() {
        let mut b = booking();
        reconcile(&mut b, &success("abc"), now());

        assert!(matches!(reconcile(&mut b, &success("other"), now()), Reconciliation::Ignored(_)));
        assert_eq!(b.payment.transaction_id.as_deref(), Some("abc"));
    }
}
