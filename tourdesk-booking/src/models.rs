use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tourdesk_core::BookingError;
use tourdesk_shared::Masked;
use uuid::Uuid;

const MAX_TRAVELERS: usize = 50;
const MAX_NAME_LEN: usize = 100;
const MAX_SPECIAL_REQUESTS_LEN: usize = 1000;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "in_progress" => Some(BookingStatus::InProgress),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// Still holds inventory and may change.
    pub fn is_open(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    /// Forward moves only: pending → confirmed → in_progress → completed.
    pub fn can_advance_to(&self, target: BookingStatus) -> bool {
        matches!(
            (self, target),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Confirmed, BookingStatus::InProgress)
                | (BookingStatus::InProgress, BookingStatus::Completed)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TravelerType {
    Adult,
    Child,
    Infant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Traveler {
    pub name: String,
    #[serde(rename = "type")]
    pub traveler_type: TravelerType,
    pub age: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: Masked<String>,
    pub phone: Masked<String>,
    pub relationship: Option<String>,
}

/// Prices frozen at creation; catalog edits never touch them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricingSnapshot {
    pub base_price: i64,
    pub subtotal: i64,
    pub taxes: i64,
    pub total_amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentRecord {
    pub status: PaymentStatus,
    pub method: Option<String>,
    pub transaction_id: Option<String>,
    pub paid_amount: i64,
    pub payment_date: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    pub fn pending() -> Self {
        Self {
            status: PaymentStatus::Pending,
            method: None,
            transaction_id: None,
            paid_amount: 0,
            payment_date: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    pub content: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// A customer's reservation of places on a catalog item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub booking_number: String,
    pub customer_id: String,
    pub catalog_item_id: Uuid,
    pub slot_id: Uuid,
    pub travelers: Vec<Traveler>,
    pub total_travelers: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub pricing: PricingSnapshot,
    pub payment: PaymentRecord,
    pub status: BookingStatus,
    pub notes: Vec<Note>,
    pub special_requests: Option<String>,
    pub emergency_contact: Option<EmergencyContact>,
    pub contact_email: Option<Masked<String>>,
    /// Bumped on every write; guards against lost updates.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Notes are append-only.
    pub fn add_note(&mut self, content: impl Into<String>, author: impl Into<String>, now: DateTime<Utc>) {
        self.notes.push(Note {
            content: content.into(),
            author: author.into(),
            created_at: now,
        });
    }

    /// Prepare for a write; returns the version the store must still hold.
    pub fn touch(&mut self, now: DateTime<Utc>) -> i64 {
        let expected = self.version;
        self.version += 1;
        self.updated_at = now;
        expected
    }

    /// Trips start at 00:00 UTC on `start_date`.
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.start_date.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    pub fn pricing_is_consistent(&self) -> bool {
        self.pricing.subtotal == self.pricing.base_price * i64::from(self.total_travelers)
            && self.pricing.total_amount == self.pricing.subtotal + self.pricing.taxes
            && self.total_travelers as usize == self.travelers.len()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Admin,
}

/// Authenticated caller of a booking operation.
#[derive(Debug, Clone)]
pub struct Requester {
    pub id: String,
    pub role: Role,
    pub email: Option<Masked<String>>,
}

impl Requester {
    pub fn customer(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Customer,
            email: None,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Admin,
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(Masked::new(email.into()));
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can_access(&self, booking: &Booking) -> bool {
        self.is_admin() || booking.customer_id == self.id
    }
}

/// Typed input of `create_booking`.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub catalog_item_id: Uuid,
    pub date: NaiveDate,
    pub travelers: Vec<Traveler>,
    pub emergency_contact: Option<EmergencyContact>,
    pub special_requests: Option<String>,
}

impl BookingRequest {
    /// Party size: every traveler, infants included.
    pub fn party_size(&self) -> u32 {
        u32::try_from(self.travelers.len()).unwrap_or(u32::MAX)
    }

    pub fn validate(&self, today: NaiveDate) -> Result<(), BookingError> {
        if self.date < today {
            return Err(BookingError::Validation(format!("date {} is in the past", self.date)));
        }
        if self.travelers.is_empty() {
            return Err(BookingError::Validation("at least one traveler is required".to_string()));
        }
        if self.travelers.len() > MAX_TRAVELERS {
            return Err(BookingError::Validation(format!(
                "at most {} travelers per booking",
                MAX_TRAVELERS
            )));
        }
        if !self.travelers.iter().any(|t| t.traveler_type == TravelerType::Adult) {
            return Err(BookingError::Validation("at least one adult is required".to_string()));
        }

        for (index, traveler) in self.travelers.iter().enumerate() {
            validate_traveler(index, traveler)?;
        }

        if let Some(contact) = &self.emergency_contact {
            if contact.name.expose().trim().is_empty() || contact.phone.expose().trim().is_empty() {
                return Err(BookingError::Validation(
                    "emergency contact needs a name and a phone number".to_string(),
                ));
            }
        }
        if let Some(requests) = &self.special_requests {
            if requests.chars().count() > MAX_SPECIAL_REQUESTS_LEN {
                return Err(BookingError::Validation("special_requests is too long".to_string()));
            }
        }
        Ok(())
    }
}

fn validate_traveler(index: usize, traveler: &Traveler) -> Result<(), BookingError> {
    let name = traveler.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(BookingError::Validation(format!("traveler {}: invalid name", index)));
    }

    // Infants are under 2, children 2-11, adults 12 and up.
    if let Some(age) = traveler.age {
        let fits = match traveler.traveler_type {
            TravelerType::Infant => age < 2,
            TravelerType::Child => (2..12).contains(&age),
            TravelerType::Adult => (12..=120).contains(&age),
        };
        if !fits {
            return Err(BookingError::Validation(format!(
                "traveler {}: age {} does not match type {:?}",
                index, age, traveler.traveler_type
            )));
        }
    }
    Ok(())
}

/// Human-readable reference such as `TD-300601-9F3A1C07`.
pub fn generate_booking_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_ascii_uppercase();
    format!("TD-{}-{}", now.format("%y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traveler(name: &str, traveler_type: TravelerType, age: Option<u8>) -> Traveler {
        Traveler {
            name: name.to_string(),
            traveler_type,
            age,
        }
    }

    fn request(travelers: Vec<Traveler>) -> BookingRequest {
        BookingRequest {
            catalog_item_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
            travelers,
            emergency_contact: None,
            special_requests: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 5, 1).unwrap()
    }

    #[test]
    fn test_party_counts_every_traveler() {
        let req = request(vec![
            traveler("Ann", TravelerType::Adult, None),
            traveler("Bob", TravelerType::Adult, Some(40)),
            traveler("Cy", TravelerType::Child, Some(7)),
            traveler("Di", TravelerType::Infant, Some(1)),
        ]);
        assert!(req.validate(today()).is_ok());
        assert_eq!(req.party_size(), 4);
    }

    #[test]
    fn test_adult_required() {
        let req = request(vec![traveler("Cy", TravelerType::Child, Some(7))]);
        assert!(matches!(req.validate(today()), Err(BookingError::Validation(_))));

        let empty = request(vec![]);
        assert!(matches!(empty.validate(today()), Err(BookingError::Validation(_))));
    }

    #[test]
    fn test_rejects_malformed_travelers() {
        let blank = request(vec![traveler("  ", TravelerType::Adult, None)]);
        assert!(blank.validate(today()).is_err());

        let old_infant = request(vec![
            traveler("Ann", TravelerType::Adult, None),
            traveler("Di", TravelerType::Infant, Some(5)),
        ]);
        assert!(old_infant.validate(today()).is_err());
    }

    #[test]
    fn test_rejects_past_dates() {
        let req = request(vec![traveler("Ann", TravelerType::Adult, None)]);
        let later = NaiveDate::from_ymd_opt(2030, 6, 2).unwrap();
        assert!(matches!(req.validate(later), Err(BookingError::Validation(_))));
        assert!(req.validate(NaiveDate::from_ymd_opt(2030, 6, 1).unwrap()).is_ok());
    }

    #[test]
    fn test_status_transitions() {
        assert!(BookingStatus::Pending.can_advance_to(BookingStatus::Confirmed));
        assert!(BookingStatus::Confirmed.can_advance_to(BookingStatus::InProgress));
        assert!(BookingStatus::InProgress.can_advance_to(BookingStatus::Completed));
        assert!(!BookingStatus::Pending.can_advance_to(BookingStatus::Completed));
        assert!(!BookingStatus::Cancelled.can_advance_to(BookingStatus::Confirmed));
        assert!(!BookingStatus::Completed.is_cancellable());
        assert!(!BookingStatus::InProgress.is_cancellable());
        assert_eq!(BookingStatus::parse("in_progress"), Some(BookingStatus::InProgress));
    }

    #[test]
    fn test_booking_number_format() {
        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2030, 6, 1, 8, 0, 0).unwrap();
        let number = generate_booking_number(now);
        assert!(number.starts_with("TD-300601-"));
        assert_eq!(number.len(), "TD-300601-".len() + 8);
        assert_ne!(number, generate_booking_number(now));
    }
}
