use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tourdesk_catalog::{AvailabilitySlot, CatalogError, CatalogItem, InventoryError};
use tourdesk_core::{Clock, SystemClock};
use uuid::Uuid;

use crate::models::Booking;
use crate::repository::{BookingRepository, CatalogRepository, StoreError};

#[derive(Default)]
struct MemoryState {
    items: HashMap<Uuid, CatalogItem>,
    bookings: HashMap<Uuid, Booking>,
    booking_numbers: HashSet<String>,
}

/// Process-local store backing both repositories.
///
/// One lock covers catalog and bookings, so check-and-increment on a slot and the
/// booking insert happen as a single step.
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            clock,
        }
    }
}

fn newest_first(mut bookings: Vec<Booking>) -> Vec<Booking> {
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    bookings
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn create_item(&self, item: &CatalogItem) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.items.contains_key(&item.id) {
            return Err(StoreError::Conflict(format!("catalog item {}", item.id)));
        }
        state.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<CatalogItem>, StoreError> {
        Ok(self.state.lock().await.items.get(&id).cloned())
    }

    async fn list_items(&self) -> Result<Vec<CatalogItem>, StoreError> {
        let state = self.state.lock().await;
        let mut items: Vec<CatalogItem> = state.items.values().cloned().collect();
        items.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(items)
    }

    async fn update_item(&self, item: &CatalogItem) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let stored = state
            .items
            .get_mut(&item.id)
            .ok_or_else(|| StoreError::NotFound(format!("catalog item {}", item.id)))?;

        let booked = stored.max_booked();
        if item.capacity_per_slot < booked {
            return Err(StoreError::CapacityBelowBooked {
                capacity: item.capacity_per_slot,
                booked,
            });
        }

        // Slots keep their stored counts; only admin-editable fields are copied.
        stored.title = item.title.clone();
        stored.description = item.description.clone();
        stored.base_price = item.base_price;
        stored.capacity_per_slot = item.capacity_per_slot;
        stored.price_tiers = item.price_tiers.clone();
        stored.is_active = item.is_active;
        stored.updated_at = item.updated_at;
        Ok(())
    }

    async fn add_slot(&self, item_id: Uuid, slot: &AvailabilitySlot) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let stored = state
            .items
            .get_mut(&item_id)
            .ok_or_else(|| StoreError::NotFound(format!("catalog item {}", item_id)))?;

        stored.add_slot(slot.clone(), self.clock.now()).map_err(|e| match e {
            CatalogError::CapacityBelowBooked { capacity, booked } => {
                StoreError::CapacityBelowBooked { capacity, booked }
            }
            other => StoreError::Conflict(other.to_string()),
        })
    }

    async fn delete_item(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let referenced = state
            .bookings
            .values()
            .any(|b| b.catalog_item_id == id && b.status.is_open());
        if referenced {
            return Err(StoreError::Referenced(format!("catalog item {}", id)));
        }

        state
            .items
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("catalog item {}", id)))
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn insert_with_reservation(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.booking_numbers.contains(&booking.booking_number) {
            return Err(StoreError::DuplicateBookingNumber(booking.booking_number.clone()));
        }

        let item = state
            .items
            .get_mut(&booking.catalog_item_id)
            .ok_or_else(|| StoreError::NotFound(format!("catalog item {}", booking.catalog_item_id)))?;
        let capacity = item.capacity_per_slot;
        let slot = item
            .slot_mut(booking.slot_id)
            .ok_or(StoreError::SlotNotFound(booking.slot_id))?;

        slot.reserve(capacity, booking.total_travelers).map_err(|e| match e {
            InventoryError::InsufficientInventory { requested, available } => {
                StoreError::CapacityExceeded { requested, available }
            }
            InventoryError::SlotNotFound(id) => StoreError::SlotNotFound(id),
        })?;

        state.booking_numbers.insert(booking.booking_number.clone());
        state.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<Booking>, StoreError> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state
                .bookings
                .values()
                .filter(|b| b.customer_id == customer_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_all(&self) -> Result<Vec<Booking>, StoreError> {
        let state = self.state.lock().await;
        Ok(newest_first(state.bookings.values().cloned().collect()))
    }

    async fn update_booking(&self, booking: &Booking, expected_version: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let stored = state
            .bookings
            .get_mut(&booking.id)
            .ok_or_else(|| StoreError::NotFound(format!("booking {}", booking.id)))?;
        if stored.version != expected_version {
            return Err(StoreError::Conflict(format!("booking {}", booking.id)));
        }

        *stored = booking.clone();
        Ok(())
    }

    async fn cancel_with_release(&self, booking: &Booking, expected_version: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let stored_version = state
            .bookings
            .get(&booking.id)
            .map(|b| b.version)
            .ok_or_else(|| StoreError::NotFound(format!("booking {}", booking.id)))?;
        if stored_version != expected_version {
            return Err(StoreError::Conflict(format!("booking {}", booking.id)));
        }

        if let Some(slot) = state
            .items
            .get_mut(&booking.catalog_item_id)
            .and_then(|item| item.slot_mut(booking.slot_id))
        {
            slot.release(booking.total_travelers);
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(())
    }
}
