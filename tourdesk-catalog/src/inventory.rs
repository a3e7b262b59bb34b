use chrono::NaiveDate;
use uuid::Uuid;

use crate::product::{AvailabilitySlot, CatalogItem};

/// Answer to "can this party go on this date?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available { slot_id: Uuid, remaining: u32 },
    /// No slot covers the date, or the item is switched off.
    NoInventory,
    Insufficient { slot_id: Uuid, remaining: u32 },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available { .. })
    }
}

/// Slot-based availability for `party_size` travelers on `date`. Pure.
pub fn check(item: &CatalogItem, date: NaiveDate, party_size: u32) -> Availability {
    if !item.is_active {
        return Availability::NoInventory;
    }

    let Some(slot) = item.slot_for(date) else {
        return Availability::NoInventory;
    };

    let remaining = slot.remaining(item.capacity_per_slot);
    if party_size <= remaining {
        Availability::Available { slot_id: slot.id, remaining }
    } else {
        Availability::Insufficient { slot_id: slot.id, remaining }
    }
}

pub fn check_availability(item: &CatalogItem, date: NaiveDate, party_size: u32) -> bool {
    party_size >= 1 && check(item, date, party_size).is_available()
}

impl AvailabilitySlot {
    pub fn remaining(&self, capacity: u32) -> u32 {
        capacity.saturating_sub(self.booked_count)
    }

    /// Take `quantity` places, never exceeding `capacity`.
    pub fn reserve(&mut self, capacity: u32, quantity: u32) -> Result<(), InventoryError> {
        let available = self.remaining(capacity);
        if quantity > available {
            return Err(InventoryError::InsufficientInventory {
                requested: quantity,
                available,
            });
        }

        self.booked_count += quantity;
        Ok(())
    }

    /// Give back `quantity` places, clamped at zero.
    pub fn release(&mut self, quantity: u32) {
        self.booked_count = self.booked_count.saturating_sub(quantity);
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("Slot not found: {0}")]
    SlotNotFound(Uuid),

    #[error("Insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory { requested: u32, available: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::tests::{date, tour};
    use chrono::Utc;

    fn tour_with_slot(capacity: u32) -> CatalogItem {
        let mut item = tour(10000, capacity);
        item.add_slot(AvailabilitySlot::new(date(2030, 6, 1), date(2030, 6, 30)), Utc::now())
            .unwrap();
        item
    }

    #[test]
    fn test_slot_lifecycle() {
        let mut slot = AvailabilitySlot::new(date(2030, 6, 1), date(2030, 6, 1));

        slot.reserve(2, 1).unwrap();
        slot.reserve(2, 1).unwrap();
        assert_eq!(slot.booked_count, 2);
        assert_eq!(
            slot.reserve(2, 1),
            Err(InventoryError::InsufficientInventory { requested: 1, available: 0 })
        );

        slot.release(5);
        assert_eq!(slot.booked_count, 0);
    }

    #[test]
    fn test_inclusive_slot_bounds() {
        let item = tour_with_slot(2);
        assert!(check_availability(&item, date(2030, 6, 1), 2));
        assert!(check_availability(&item, date(2030, 6, 30), 2));
        assert!(!check_availability(&item, date(2030, 7, 1), 1));
        assert!(!check_availability(&item, date(2030, 5, 31), 1));
    }

    #[test]
    fn test_party_larger_than_remaining() {
        let mut item = tour_with_slot(3);
        let slot_id = item.availability_slots[0].id;
        item.slot_mut(slot_id).unwrap().reserve(3, 2).unwrap();

        assert_eq!(
            check(&item, date(2030, 6, 15), 2),
            Availability::Insufficient { slot_id, remaining: 1 }
        );
        assert_eq!(
            check(&item, date(2030, 6, 15), 1),
            Availability::Available { slot_id, remaining: 1 }
        );
    }

    #[test]
    fn test_item_without_slots_has_no_inventory() {
        let item = tour(10000, 10);
        assert_eq!(check(&item, date(2030, 6, 15), 1), Availability::NoInventory);
    }

    #[test]
    fn test_inactive_item_is_unavailable() {
        let mut item = tour_with_slot(5);
        item.is_active = false;
        assert!(!check_availability(&item, date(2030, 6, 15), 1));
    }

    #[test]
    fn test_zero_party_is_never_available() {
        let item = tour_with_slot(5);
        assert!(!check_availability(&item, date(2030, 6, 15), 0));
    }
}
