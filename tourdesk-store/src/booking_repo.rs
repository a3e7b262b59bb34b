use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tourdesk_booking::models::{
    Booking, BookingStatus, EmergencyContact, Note, PaymentRecord, PaymentStatus, PricingSnapshot, Traveler,
};
use tourdesk_booking::{BookingRepository, StoreError};
use tourdesk_shared::Masked;
use tracing::debug;
use uuid::Uuid;

use crate::catalog_repo::to_i32;
use crate::database::{is_unique_violation, store_error};

const BOOKING_NUMBER_CONSTRAINT: &str = "bookings_booking_number_key";

const BOOKING_COLUMNS: &str = "id, booking_number, customer_id, catalog_item_id, slot_id, travelers, \
     total_travelers, start_date, end_date, base_price, subtotal, taxes, total_amount, currency, \
     payment_status, payment_method, transaction_id, paid_amount, payment_date, status, notes, \
     special_requests, emergency_contact, contact_email, version, created_at, updated_at";

pub struct PgBookingRepository {
    pool: PgPool,
    reservation_timeout: Duration,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            reservation_timeout: Duration::from_secs(3),
        }
    }

    /// Server-side deadline for each statement of the reserve-and-insert transaction.
    /// Expiry aborts the transaction, so a timed-out reservation never commits.
    pub fn with_reservation_timeout(mut self, timeout: Duration) -> Self {
        self.reservation_timeout = timeout;
        self
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    booking_number: String,
    customer_id: String,
    catalog_item_id: Uuid,
    slot_id: Uuid,
    travelers: Json<Vec<Traveler>>,
    total_travelers: i32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    base_price: i64,
    subtotal: i64,
    taxes: i64,
    total_amount: i64,
    currency: String,
    payment_status: String,
    payment_method: Option<String>,
    transaction_id: Option<String>,
    paid_amount: i64,
    payment_date: Option<DateTime<Utc>>,
    status: String,
    notes: Json<Vec<Note>>,
    special_requests: Option<String>,
    emergency_contact: Option<Json<EmergencyContact>>,
    contact_email: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = BookingStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Backend(format!("unknown booking status {}", row.status)))?;
        let payment_status = PaymentStatus::parse(&row.payment_status)
            .ok_or_else(|| StoreError::Backend(format!("unknown payment status {}", row.payment_status)))?;

        Ok(Booking {
            id: row.id,
            booking_number: row.booking_number,
            customer_id: row.customer_id,
            catalog_item_id: row.catalog_item_id,
            slot_id: row.slot_id,
            travelers: row.travelers.0,
            total_travelers: u32::try_from(row.total_travelers).unwrap_or(0),
            start_date: row.start_date,
            end_date: row.end_date,
            pricing: PricingSnapshot {
                base_price: row.base_price,
                subtotal: row.subtotal,
                taxes: row.taxes,
                total_amount: row.total_amount,
                currency: row.currency,
            },
            payment: PaymentRecord {
                status: payment_status,
                method: row.payment_method,
                transaction_id: row.transaction_id,
                paid_amount: row.paid_amount,
                payment_date: row.payment_date,
            },
            status,
            notes: row.notes.0,
            special_requests: row.special_requests,
            emergency_contact: row.emergency_contact.map(|c| c.0),
            contact_email: row.contact_email.map(Masked::new),
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_bookings(rows: Vec<BookingRow>) -> Result<Vec<Booking>, StoreError> {
    rows.into_iter().map(Booking::try_from).collect()
}

impl PgBookingRepository {
    /// Write the mutable part of a booking, guarded by its version.
    async fn write_mutable(
        tx: &mut Transaction<'_, Postgres>,
        booking: &Booking,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $3, payment_status = $4, payment_method = $5, transaction_id = $6,
                paid_amount = $7, payment_date = $8, notes = $9, special_requests = $10,
                version = $11, updated_at = $12
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(booking.id)
        .bind(expected_version)
        .bind(booking.status.as_str())
        .bind(booking.payment.status.as_str())
        .bind(&booking.payment.method)
        .bind(&booking.payment.transaction_id)
        .bind(booking.payment.paid_amount)
        .bind(booking.payment.payment_date)
        .bind(Json(&booking.notes))
        .bind(&booking.special_requests)
        .bind(booking.version)
        .bind(booking.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(store_error)?;

        if updated.rows_affected() == 1 {
            return Ok(());
        }

        let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM bookings WHERE id = $1")
            .bind(booking.id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(store_error)?;

        match exists {
            Some((current,)) => {
                debug!(
                    "Booking {} at version {}, expected {}",
                    booking.booking_number, current, expected_version
                );
                Err(StoreError::Conflict(format!("booking {}", booking.booking_number)))
            }
            None => Err(StoreError::NotFound(format!("booking {}", booking.id))),
        }
    }

    pub(crate) async fn insert_row(
        tx: &mut Transaction<'_, Postgres>,
        booking: &Booking,
        party: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            "INSERT INTO bookings ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
             $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)",
            BOOKING_COLUMNS
        ))
        .bind(booking.id)
        .bind(&booking.booking_number)
        .bind(&booking.customer_id)
        .bind(booking.catalog_item_id)
        .bind(booking.slot_id)
        .bind(Json(&booking.travelers))
        .bind(party)
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(booking.pricing.base_price)
        .bind(booking.pricing.subtotal)
        .bind(booking.pricing.taxes)
        .bind(booking.pricing.total_amount)
        .bind(&booking.pricing.currency)
        .bind(booking.payment.status.as_str())
        .bind(&booking.payment.method)
        .bind(&booking.payment.transaction_id)
        .bind(booking.payment.paid_amount)
        .bind(booking.payment.payment_date)
        .bind(booking.status.as_str())
        .bind(Json(&booking.notes))
        .bind(&booking.special_requests)
        .bind(booking.emergency_contact.as_ref().map(Json))
        .bind(booking.contact_email.as_ref().map(|e| e.expose().clone()))
        .bind(booking.version)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert_with_reservation(&self, booking: &Booking) -> Result<(), StoreError> {
        let party = to_i32(booking.total_travelers)?;
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let deadline = format!("{}ms", self.reservation_timeout.as_millis().max(1));
        sqlx::query("SELECT set_config('statement_timeout', $1, true), set_config('lock_timeout', $1, true)")
            .bind(&deadline)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        // FOR SHARE keeps capacity edits out until this transaction ends.
        let item: Option<(i32,)> =
            sqlx::query_as("SELECT capacity_per_slot FROM catalog_items WHERE id = $1 FOR SHARE")
                .bind(booking.catalog_item_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_error)?;
        let Some((capacity,)) = item else {
            return Err(StoreError::NotFound(format!("catalog item {}", booking.catalog_item_id)));
        };

        let reserved = sqlx::query(
            r#"
            UPDATE availability_slots
            SET booked_count = booked_count + $3
            WHERE id = $1 AND item_id = $2 AND booked_count + $3 <= $4
            "#,
        )
        .bind(booking.slot_id)
        .bind(booking.catalog_item_id)
        .bind(party)
        .bind(capacity)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        if reserved.rows_affected() == 0 {
            let slot: Option<(i32,)> =
                sqlx::query_as("SELECT booked_count FROM availability_slots WHERE id = $1 AND item_id = $2")
                    .bind(booking.slot_id)
                    .bind(booking.catalog_item_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(store_error)?;
            return Err(match slot {
                None => StoreError::SlotNotFound(booking.slot_id),
                Some((booked,)) => StoreError::CapacityExceeded {
                    requested: booking.total_travelers,
                    available: u32::try_from(capacity - booked).unwrap_or(0),
                },
            });
        }

        let inserted = Self::insert_row(&mut tx, booking, party).await;

        // Dropping `tx` on an error path rolls the reservation back.
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e, BOOKING_NUMBER_CONSTRAINT) => {
                return Err(StoreError::DuplicateBookingNumber(booking.booking_number.clone()));
            }
            Err(e) => return Err(store_error(e)),
        }

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE customer_id = $1 ORDER BY created_at DESC",
            BOOKING_COLUMNS
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        into_bookings(rows)
    }

    async fn list_all(&self) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings ORDER BY created_at DESC", BOOKING_COLUMNS))
                .fetch_all(&self.pool)
                .await
                .map_err(store_error)?;

        into_bookings(rows)
    }

    async fn update_booking(&self, booking: &Booking, expected_version: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        Self::write_mutable(&mut tx, booking, expected_version).await?;
        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn cancel_with_release(&self, booking: &Booking, expected_version: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        Self::write_mutable(&mut tx, booking, expected_version).await?;

        sqlx::query("UPDATE availability_slots SET booked_count = GREATEST(booked_count - $2, 0) WHERE id = $1")
            .bind(booking.slot_id)
            .bind(to_i32(booking.total_travelers)?)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }
}
