use chrono::Duration;
use std::sync::Arc;
use tourdesk_catalog::inventory::{self, Availability};
use tourdesk_catalog::{CatalogItem, PricingCalculator};
use tourdesk_core::{BookingError, BookingResult, CapacityReason, Clock, PaymentOutcome};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    generate_booking_number, Booking, BookingRequest, BookingStatus, PaymentRecord, PaymentStatus,
    PricingSnapshot, Requester,
};
use crate::notifier::{dispatch, Notification, Notifier};
use crate::reconciliation::{reconcile, Reconciliation};
use crate::repository::{BookingRepository, CatalogRepository, StoreError};

/// Re-reads allowed when an optimistic write loses a race.
const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct LifecycleRules {
    /// Minimum notice before `start_date` for a cancellation.
    pub cancellation_window: Duration,
    /// Upper bound on the reserve-and-insert step.
    pub reservation_timeout: std::time::Duration,
}

impl Default for LifecycleRules {
    fn default() -> Self {
        Self {
            cancellation_window: Duration::hours(24),
            reservation_timeout: std::time::Duration::from_secs(3),
        }
    }
}

/// Manages booking lifecycle and state transitions
pub struct BookingManager {
    catalog: Arc<dyn CatalogRepository>,
    bookings: Arc<dyn BookingRepository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    pricing: PricingCalculator,
    rules: LifecycleRules,
}

impl BookingManager {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        bookings: Arc<dyn BookingRepository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        pricing: PricingCalculator,
        rules: LifecycleRules,
    ) -> Self {
        Self {
            catalog,
            bookings,
            notifier,
            clock,
            pricing,
            rules,
        }
    }

    /// Validate, price and persist a new booking, taking its places from the slot.
    pub async fn create_booking(&self, requester: &Requester, req: BookingRequest) -> BookingResult<Booking> {
        req.validate(self.clock.today())?;

        let item = self.load_item(req.catalog_item_id).await?;
        let party_size = req.party_size();

        let slot_id = match inventory::check(&item, req.date, party_size) {
            Availability::Available { slot_id, .. } => slot_id,
            Availability::NoInventory => {
                return Err(BookingError::Capacity(CapacityReason::NoInventory { date: req.date }))
            }
            Availability::Insufficient { remaining, .. } => {
                return Err(BookingError::Capacity(CapacityReason::SoldOut {
                    requested: party_size,
                    available: remaining,
                }))
            }
        };

        let quote = self
            .pricing
            .compute_price(&item, req.date, party_size)
            .map_err(|e| BookingError::Validation(e.to_string()))?;

        let now = self.clock.now();
        let mut booking = Booking {
            id: Uuid::new_v4(),
            booking_number: generate_booking_number(now),
            customer_id: requester.id.clone(),
            catalog_item_id: item.id,
            slot_id,
            travelers: req.travelers,
            total_travelers: party_size,
            start_date: req.date,
            end_date: item.end_date_for(req.date),
            pricing: PricingSnapshot {
                base_price: quote.base_price,
                subtotal: quote.subtotal,
                taxes: quote.taxes,
                total_amount: quote.total,
                currency: quote.currency,
            },
            payment: PaymentRecord::pending(),
            status: BookingStatus::Pending,
            notes: Vec::new(),
            special_requests: req.special_requests.filter(|s| !s.trim().is_empty()),
            emergency_contact: req.emergency_contact,
            contact_email: requester.email.clone(),
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let reserved = match tokio::time::timeout(
                self.rules.reservation_timeout,
                self.bookings.insert_with_reservation(&booking),
            )
            .await
            {
                Ok(reserved) => reserved,
                Err(_) => self.settle_timed_out_reservation(&booking).await,
            };

            match reserved {
                Ok(()) => break,
                Err(StoreError::DuplicateBookingNumber(number)) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!("Booking number {} taken, regenerating", number);
                    booking.booking_number = generate_booking_number(now);
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            "Booking {} created: {} travelers on {} ({}), total {} {}",
            booking.booking_number,
            booking.total_travelers,
            item.title,
            booking.start_date,
            booking.pricing.total_amount,
            booking.pricing.currency
        );

        dispatch(self.notifier.clone(), Notification::Created, booking.clone(), item);
        Ok(booking)
    }

    pub async fn get_booking(&self, requester: &Requester, booking_id: Uuid) -> BookingResult<Booking> {
        let booking = self.load_booking(booking_id).await?;
        // Someone else's booking looks exactly like a missing one.
        if !requester.can_access(&booking) {
            return Err(not_found(booking_id));
        }
        Ok(booking)
    }

    pub async fn list_bookings(&self, requester: &Requester) -> BookingResult<Vec<Booking>> {
        let bookings = if requester.is_admin() {
            self.bookings.list_all().await?
        } else {
            self.bookings.list_for_customer(&requester.id).await?
        };
        Ok(bookings)
    }

    /// Cancel at least `cancellation_window` before the start and release the places.
    pub async fn cancel_booking(
        &self,
        requester: &Requester,
        booking_id: Uuid,
        reason: &str,
    ) -> BookingResult<Booking> {
        let mut booking = self.get_booking(requester, booking_id).await?;

        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::InvalidState("booking is already cancelled".to_string()));
        }
        if !booking.status.is_cancellable() {
            return Err(BookingError::InvalidState(format!(
                "a booking in status {} cannot be cancelled",
                booking.status.as_str()
            )));
        }

        let now = self.clock.now();
        if booking.starts_at() - now < self.rules.cancellation_window {
            return Err(BookingError::Policy(format!(
                "bookings can only be cancelled at least {} hours before the start date",
                self.rules.cancellation_window.num_hours()
            )));
        }

        let reason = reason.trim();
        let reason = if reason.is_empty() { "no reason given" } else { reason };
        booking.status = BookingStatus::Cancelled;
        booking.add_note(format!("Booking cancelled: {}", reason), requester.id.clone(), now);
        let expected = booking.touch(now);

        self.bookings.cancel_with_release(&booking, expected).await?;

        info!(
            "Booking {} cancelled by {}, {} places released",
            booking.booking_number, requester.id, booking.total_travelers
        );
        if booking.payment.status == PaymentStatus::Paid {
            info!("Booking {} was paid; refund pending", booking.booking_number);
        }
        Ok(booking)
    }

    /// Admin-driven forward transition (confirmed → in_progress → completed).
    pub async fn advance_status(
        &self,
        requester: &Requester,
        booking_id: Uuid,
        target: BookingStatus,
    ) -> BookingResult<Booking> {
        require_admin(requester)?;
        let mut booking = self.load_booking(booking_id).await?;

        if !booking.status.can_advance_to(target) {
            return Err(BookingError::InvalidState(format!(
                "cannot move booking from {} to {}",
                booking.status.as_str(),
                target.as_str()
            )));
        }

        let now = self.clock.now();
        let from = booking.status;
        booking.status = target;
        booking.add_note(
            format!("Status changed from {} to {}", from.as_str(), target.as_str()),
            requester.id.clone(),
            now,
        );
        let expected = booking.touch(now);
        self.bookings.update_booking(&booking, expected).await?;

        info!("Booking {} moved {} -> {}", booking.booking_number, from.as_str(), target.as_str());
        Ok(booking)
    }

    /// Mark the payment of a cancelled booking as refunded.
    pub async fn record_refund(&self, requester: &Requester, booking_id: Uuid) -> BookingResult<Booking> {
        require_admin(requester)?;
        let mut booking = self.load_booking(booking_id).await?;

        if booking.status != BookingStatus::Cancelled || booking.payment.status != PaymentStatus::Paid {
            return Err(BookingError::InvalidState(
                "only paid, cancelled bookings can be refunded".to_string(),
            ));
        }

        let now = self.clock.now();
        booking.payment.status = PaymentStatus::Refunded;
        booking.add_note(
            format!(
                "Refunded {} {}",
                booking.payment.paid_amount, booking.pricing.currency
            ),
            requester.id.clone(),
            now,
        );
        let expected = booking.touch(now);
        self.bookings.update_booking(&booking, expected).await?;

        Ok(booking)
    }

    /// Apply a provider outcome. Safe to call repeatedly with the same outcome.
    pub async fn apply_payment_result(
        &self,
        booking_id: Uuid,
        outcome: &PaymentOutcome,
    ) -> BookingResult<(Booking, Reconciliation)> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut booking = self.load_booking(booking_id).await?;
            let now = self.clock.now();

            let result = reconcile(&mut booking, outcome, now);
            if !result.changed() {
                debug!("Payment outcome for {} not applied: {:?}", booking.booking_number, result);
                return Ok((booking, result));
            }

            let expected = booking.touch(now);
            match self.bookings.update_booking(&booking, expected).await {
                Ok(()) => {
                    info!(
                        "Booking {} payment {} (status {})",
                        booking.booking_number,
                        booking.payment.status.as_str(),
                        booking.status.as_str()
                    );
                    if booking.payment.status == PaymentStatus::Paid && booking.status == BookingStatus::Cancelled {
                        warn!("Booking {} paid after cancellation; refund required", booking.booking_number);
                    }
                    if result == (Reconciliation::Applied { confirmed: true }) {
                        self.notify_confirmed(&booking).await;
                    }
                    return Ok((booking, result));
                }
                Err(StoreError::Conflict(_)) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!("Concurrent update on booking {}, retrying reconciliation", booking_id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(BookingError::Conflict(format!("booking {} kept changing", booking_id)))
    }

    /// The deadline can fire after the store has already committed. A stored
    /// booking is the outcome; anything else was rolled back.
    async fn settle_timed_out_reservation(&self, booking: &Booking) -> Result<(), StoreError> {
        match self.bookings.get_booking(booking.id).await {
            Ok(Some(_)) => {
                warn!("Booking {} committed after the reservation deadline", booking.booking_number);
                Ok(())
            }
            Ok(None) => Err(StoreError::Timeout("reservation timed out".to_string())),
            Err(e) => {
                warn!("Could not verify timed-out reservation {}: {}", booking.booking_number, e);
                Err(StoreError::Timeout("reservation timed out".to_string()))
            }
        }
    }

    async fn notify_confirmed(&self, booking: &Booking) {
        match self.catalog.get_item(booking.catalog_item_id).await {
            Ok(Some(item)) => {
                dispatch(self.notifier.clone(), Notification::Confirmed, booking.clone(), item);
            }
            Ok(None) => warn!("Catalog item {} missing, confirmation not sent", booking.catalog_item_id),
            Err(e) => warn!("Could not load catalog item for confirmation: {}", e),
        }
    }

    async fn load_item(&self, item_id: Uuid) -> BookingResult<CatalogItem> {
        self.catalog
            .get_item(item_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("catalog item {}", item_id)))
    }

    async fn load_booking(&self, booking_id: Uuid) -> BookingResult<Booking> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| not_found(booking_id))
    }
}

pub(crate) fn require_admin(requester: &Requester) -> BookingResult<()> {
    if requester.is_admin() {
        Ok(())
    } else {
        Err(BookingError::Forbidden("admin role required".to_string()))
    }
}

fn not_found(booking_id: Uuid) -> BookingError {
    BookingError::NotFound(format!("booking {}", booking_id))
}
