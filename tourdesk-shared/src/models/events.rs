use chrono::NaiveDate;
use uuid::Uuid;

/// Published after a booking has been committed in `pending` state.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCreatedEvent {
    pub booking_id: Uuid,
    pub booking_number: String,
    pub customer_id: String,
    pub catalog_item_id: Uuid,
    pub item_title: String,
    pub start_date: NaiveDate,
    pub total_travelers: u32,
    pub total_amount: i64,
    pub currency: String,
    pub contact_email: Option<crate::pii::Masked<String>>,
    pub timestamp: i64,
}

/// Published once payment reconciliation moved a booking to `confirmed`.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub booking_number: String,
    pub customer_id: String,
    pub catalog_item_id: Uuid,
    pub item_title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub transaction_id: Option<String>,
    pub paid_amount: i64,
    pub currency: String,
    pub contact_email: Option<crate::pii::Masked<String>>,
    pub timestamp: i64,
}
