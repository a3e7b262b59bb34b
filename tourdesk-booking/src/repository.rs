use async_trait::async_trait;
use tourdesk_catalog::{AvailabilitySlot, CatalogItem};
use tourdesk_core::{BookingError, CapacityReason};
use uuid::Uuid;

use crate::models::Booking;

/// Storage failures, independent of the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Availability slot not found: {0}")]
    SlotNotFound(Uuid),

    #[error("Insufficient inventory: requested {requested}, available {available}")]
    CapacityExceeded { requested: u32, available: u32 },

    #[error("Capacity {capacity} is below {booked} places already booked")]
    CapacityBelowBooked { capacity: u32, booked: u32 },

    #[error("Version conflict on {0}")]
    Conflict(String),

    #[error("Booking number already taken: {0}")]
    DuplicateBookingNumber(String),

    #[error("Still referenced by open bookings: {0}")]
    Referenced(String),

    #[error("Storage deadline exceeded: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Backend(String),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => BookingError::NotFound(what),
            StoreError::SlotNotFound(id) => BookingError::NotFound(format!("availability slot {}", id)),
            StoreError::CapacityExceeded { requested, available } => {
                BookingError::Capacity(CapacityReason::SoldOut { requested, available })
            }
            e @ StoreError::CapacityBelowBooked { .. } => BookingError::Validation(e.to_string()),
            e @ StoreError::Conflict(_) => BookingError::Conflict(e.to_string()),
            e @ StoreError::DuplicateBookingNumber(_) => BookingError::Conflict(e.to_string()),
            e @ StoreError::Referenced(_) => BookingError::InvalidState(e.to_string()),
            StoreError::Timeout(msg) => BookingError::Retryable(msg),
            StoreError::Backend(msg) => BookingError::Internal(msg),
        }
    }
}

/// Catalog persistence. Slot `booked_count` is only ever changed through
/// [`BookingRepository`] so the capacity invariant lives in one place.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn create_item(&self, item: &CatalogItem) -> Result<(), StoreError>;

    async fn get_item(&self, id: Uuid) -> Result<Option<CatalogItem>, StoreError>;

    async fn list_items(&self) -> Result<Vec<CatalogItem>, StoreError>;

    /// Persist admin edits (title, price, capacity, tiers, active flag).
    /// Fails with `CapacityBelowBooked` if any stored slot holds more places than the new capacity.
    async fn update_item(&self, item: &CatalogItem) -> Result<(), StoreError>;

    async fn add_slot(&self, item_id: Uuid, slot: &AvailabilitySlot) -> Result<(), StoreError>;

    /// Fails with `Referenced` while open bookings point at the item.
    async fn delete_item(&self, id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Insert `booking` and add `total_travelers` to its slot as one atomic unit.
    /// The increment is conditional: `CapacityExceeded` if the slot cannot take the party.
    async fn insert_with_reservation(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<Booking>, StoreError>;

    async fn list_all(&self) -> Result<Vec<Booking>, StoreError>;

    /// Overwrite the booking if the stored version still equals `expected_version`.
    async fn update_booking(&self, booking: &Booking, expected_version: i64) -> Result<(), StoreError>;

    /// Like `update_booking`, and give the travelers' places back to the slot (clamped at 0).
    async fn cancel_with_release(&self, booking: &Booking, expected_version: i64) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_taxonomy() {
        let capacity: BookingError = StoreError::CapacityExceeded { requested: 2, available: 1 }.into();
        assert_eq!(capacity.code(), "CAPACITY_EXCEEDED");

        let conflict: BookingError = StoreError::Conflict("booking".into()).into();
        assert_eq!(conflict.code(), "CONFLICT");

        let backend: BookingError = StoreError::Backend("pool closed".into()).into();
        assert_eq!(backend.code(), "INTERNAL_ERROR");

        let referenced: BookingError = StoreError::Referenced("item".into()).into();
        assert_eq!(referenced.code(), "INVALID_STATE");

        let timeout: BookingError = StoreError::Timeout("statement timeout".into()).into();
        assert_eq!(timeout.code(), "RETRY");
    }
}
