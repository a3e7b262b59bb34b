use async_trait::async_trait;
use tourdesk_booking::notifier::{confirmed_event, created_event, Customer, NotifyError};
use tourdesk_booking::{Booking, Notifier};
use tourdesk_catalog::CatalogItem;

use crate::events::{BookingEvent, EventProducer};

/// Publishes booking events for the downstream mailer, keyed by booking number.
pub struct KafkaNotifier {
    producer: EventProducer,
}

impl KafkaNotifier {
    pub fn new(producer: EventProducer) -> Self {
        Self { producer }
    }

    async fn send<E: BookingEvent>(&self, event: &E) -> Result<(), NotifyError> {
        self.producer
            .publish(event)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn notify_booking_created(
        &self,
        booking: &Booking,
        _customer: &Customer,
        item: &CatalogItem,
    ) -> Result<(), NotifyError> {
        self.send(&created_event(booking, item)).await
    }

    async fn notify_booking_confirmed(
        &self,
        booking: &Booking,
        _customer: &Customer,
        item: &CatalogItem,
    ) -> Result<(), NotifyError> {
        self.send(&confirmed_event(booking, item)).await
    }
}
