use async_trait::async_trait;
use std::sync::Arc;
use tourdesk_catalog::CatalogItem;
use tourdesk_shared::models::events::{BookingConfirmedEvent, BookingCreatedEvent};
use tourdesk_shared::Masked;
use tracing::{info, warn};

use crate::models::Booking;

#[derive(Debug, Clone)]
pub struct Customer {
    pub id: String,
    pub email: Option<Masked<String>>,
}

impl Customer {
    pub fn of(booking: &Booking) -> Self {
        Self {
            id: booking.customer_id.clone(),
            email: booking.contact_email.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Customer-facing messages (email, SMS). Best effort only.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_booking_created(
        &self,
        booking: &Booking,
        customer: &Customer,
        item: &CatalogItem,
    ) -> Result<(), NotifyError>;

    async fn notify_booking_confirmed(
        &self,
        booking: &Booking,
        customer: &Customer,
        item: &CatalogItem,
    ) -> Result<(), NotifyError>;
}

/// Writes notifications to the log; used when no broker is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_booking_created(
        &self,
        booking: &Booking,
        customer: &Customer,
        item: &CatalogItem,
    ) -> Result<(), NotifyError> {
        info!(
            "Booking {} received for {} ({}), customer {} {:?}",
            booking.booking_number, item.title, booking.start_date, customer.id, customer.email
        );
        Ok(())
    }

    async fn notify_booking_confirmed(
        &self,
        booking: &Booking,
        customer: &Customer,
        item: &CatalogItem,
    ) -> Result<(), NotifyError> {
        info!(
            "Booking {} confirmed for {} ({}), customer {} {:?}",
            booking.booking_number, item.title, booking.start_date, customer.id, customer.email
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Created,
    Confirmed,
}

/// Send on a detached task. Failures are logged and never reach the caller.
pub fn dispatch(
    notifier: Arc<dyn Notifier>,
    kind: Notification,
    booking: Booking,
    item: CatalogItem,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let customer = Customer::of(&booking);
        let result = match kind {
            Notification::Created => notifier.notify_booking_created(&booking, &customer, &item).await,
            Notification::Confirmed => notifier.notify_booking_confirmed(&booking, &customer, &item).await,
        };
        if let Err(e) = result {
            warn!("{:?} notification for booking {} not delivered: {}", kind, booking.booking_number, e);
        }
    })
}

pub fn created_event(booking: &Booking, item: &CatalogItem) -> BookingCreatedEvent {
    BookingCreatedEvent {
        booking_id: booking.id,
        booking_number: booking.booking_number.clone(),
        customer_id: booking.customer_id.clone(),
        catalog_item_id: item.id,
        item_title: item.title.clone(),
        start_date: booking.start_date,
        total_travelers: booking.total_travelers,
        total_amount: booking.pricing.total_amount,
        currency: booking.pricing.currency.clone(),
        contact_email: booking.contact_email.clone(),
        timestamp: booking.created_at.timestamp(),
    }
}

pub fn confirmed_event(booking: &Booking, item: &CatalogItem) -> BookingConfirmedEvent {
    BookingConfirmedEvent {
        booking_id: booking.id,
        booking_number: booking.booking_number.clone(),
        customer_id: booking.customer_id.clone(),
        catalog_item_id: item.id,
        item_title: item.title.clone(),
        start_date: booking.start_date,
        end_date: booking.end_date,
        transaction_id: booking.payment.transaction_id.clone(),
        paid_amount: booking.payment.paid_amount,
        currency: booking.pricing.currency.clone(),
        contact_email: booking.contact_email.clone(),
        timestamp: booking.updated_at.timestamp(),
    }
}
