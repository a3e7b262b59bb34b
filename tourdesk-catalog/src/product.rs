use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of bookable catalog entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Tour,
    Service,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Tour => "tour",
            ItemKind::Service => "service",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tour" => Some(ItemKind::Tour),
            "service" => Some(ItemKind::Service),
            _ => None,
        }
    }
}

/// Seasonal price override, inclusive on both ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceTier {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price: i64,
}

impl PriceTier {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// Bookable date range sharing one capacity pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailabilitySlot {
    pub id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub booked_count: u32,
}

impl AvailabilitySlot {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_date,
            end_date,
            booked_count: 0,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && start <= self.end_date
    }
}

/// A tour or service that customers book places on.
///
/// Prices are integer minor units (cents) in `currency`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: Uuid,
    pub kind: ItemKind,
    pub title: String,
    pub description: Option<String>,
    pub base_price: i64,
    pub currency: String,
    pub capacity_per_slot: u32,
    pub duration_days: u32,
    pub price_tiers: Vec<PriceTier>,
    pub availability_slots: Vec<AvailabilitySlot>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCatalogItem {
    pub kind: ItemKind,
    pub title: String,
    pub description: Option<String>,
    pub base_price: i64,
    /// Empty means the deployment's default currency.
    #[serde(default)]
    pub currency: String,
    pub capacity_per_slot: u32,
    #[serde(default = "default_duration")]
    pub duration_days: u32,
    #[serde(default)]
    pub price_tiers: Vec<PriceTier>,
}

fn default_duration() -> u32 {
    1
}

/// Admin edit; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogItemUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub base_price: Option<i64>,
    pub capacity_per_slot: Option<u32>,
    pub price_tiers: Option<Vec<PriceTier>>,
    pub is_active: Option<bool>,
}

impl CatalogItem {
    pub fn new(draft: NewCatalogItem, now: DateTime<Utc>) -> Result<Self, CatalogError> {
        if draft.title.trim().is_empty() {
            return Err(CatalogError::Invalid("title is required".to_string()));
        }
        if draft.base_price < 0 {
            return Err(CatalogError::Invalid("base_price must not be negative".to_string()));
        }
        if draft.capacity_per_slot < 1 {
            return Err(CatalogError::Invalid("capacity_per_slot must be at least 1".to_string()));
        }
        if draft.duration_days < 1 {
            return Err(CatalogError::Invalid("duration_days must be at least 1".to_string()));
        }
        let currency = draft.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CatalogError::Invalid(format!("invalid currency code: {}", draft.currency)));
        }
        validate_tiers(&draft.price_tiers)?;

        Ok(Self {
            id: Uuid::new_v4(),
            kind: draft.kind,
            title: draft.title.trim().to_string(),
            description: draft.description,
            base_price: draft.base_price,
            currency,
            capacity_per_slot: draft.capacity_per_slot,
            duration_days: draft.duration_days,
            price_tiers: draft.price_tiers,
            availability_slots: Vec::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Slot whose inclusive range contains `date`.
    pub fn slot_for(&self, date: NaiveDate) -> Option<&AvailabilitySlot> {
        self.availability_slots.iter().find(|s| s.contains(date))
    }

    pub fn slot(&self, slot_id: Uuid) -> Option<&AvailabilitySlot> {
        self.availability_slots.iter().find(|s| s.id == slot_id)
    }

    pub fn slot_mut(&mut self, slot_id: Uuid) -> Option<&mut AvailabilitySlot> {
        self.availability_slots.iter_mut().find(|s| s.id == slot_id)
    }

    /// Last day of a trip starting on `start`.
    pub fn end_date_for(&self, start: NaiveDate) -> NaiveDate {
        let extra = u64::from(self.duration_days.saturating_sub(1));
        start.checked_add_days(Days::new(extra)).unwrap_or(start)
    }

    /// Open a new slot. Slots may not overlap, so every date maps to at most one pool.
    pub fn add_slot(&mut self, slot: AvailabilitySlot, now: DateTime<Utc>) -> Result<(), CatalogError> {
        if slot.end_date < slot.start_date {
            return Err(CatalogError::Invalid("slot end_date precedes start_date".to_string()));
        }
        if slot.booked_count > self.capacity_per_slot {
            return Err(CatalogError::CapacityBelowBooked {
                capacity: self.capacity_per_slot,
                booked: slot.booked_count,
            });
        }
        if let Some(existing) = self
            .availability_slots
            .iter()
            .find(|s| s.overlaps(slot.start_date, slot.end_date))
        {
            return Err(CatalogError::SlotOverlap {
                existing: existing.id,
            });
        }

        self.availability_slots.push(slot);
        self.availability_slots.sort_by_key(|s| s.start_date);
        self.updated_at = now;
        Ok(())
    }

    pub fn apply_update(&mut self, update: CatalogItemUpdate, now: DateTime<Utc>) -> Result<(), CatalogError> {
        if let Some(capacity) = update.capacity_per_slot {
            if capacity < 1 {
                return Err(CatalogError::Invalid("capacity_per_slot must be at least 1".to_string()));
            }
            let booked = self.max_booked();
            if capacity < booked {
                return Err(CatalogError::CapacityBelowBooked { capacity, booked });
            }
        }
        if let Some(price) = update.base_price {
            if price < 0 {
                return Err(CatalogError::Invalid("base_price must not be negative".to_string()));
            }
        }
        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                return Err(CatalogError::Invalid("title is required".to_string()));
            }
        }
        if let Some(tiers) = &update.price_tiers {
            validate_tiers(tiers)?;
        }

        if let Some(title) = update.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(price) = update.base_price {
            self.base_price = price;
        }
        if let Some(capacity) = update.capacity_per_slot {
            self.capacity_per_slot = capacity;
        }
        if let Some(tiers) = update.price_tiers {
            self.price_tiers = tiers;
        }
        if let Some(active) = update.is_active {
            self.is_active = active;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn max_booked(&self) -> u32 {
        self.availability_slots
            .iter()
            .map(|s| s.booked_count)
            .max()
            .unwrap_or(0)
    }
}

fn validate_tiers(tiers: &[PriceTier]) -> Result<(), CatalogError> {
    for (i, tier) in tiers.iter().enumerate() {
        if tier.end_date < tier.start_date {
            return Err(CatalogError::Invalid("price tier end_date precedes start_date".to_string()));
        }
        if tier.price < 0 {
            return Err(CatalogError::Invalid("price tier must not be negative".to_string()));
        }
        let overlapping = tiers[i + 1..]
            .iter()
            .any(|other| other.start_date <= tier.end_date && tier.start_date <= other.end_date);
        if overlapping {
            return Err(CatalogError::Invalid("price tiers overlap".to_string()));
        }
    }
    Ok(())
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Invalid catalog item: {0}")]
    Invalid(String),

    #[error("Slot overlaps existing slot {existing}")]
    SlotOverlap { existing: Uuid },

    #[error("Capacity {capacity} is below {booked} places already booked")]
    CapacityBelowBooked { capacity: u32, booked: u32 },
}
