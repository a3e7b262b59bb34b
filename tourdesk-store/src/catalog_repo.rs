use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tourdesk_booking::{CatalogRepository, StoreError};
use tourdesk_catalog::{AvailabilitySlot, CatalogItem, ItemKind, PriceTier};
use uuid::Uuid;

use crate::database::store_error;

pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    kind: String,
    title: String,
    description: Option<String>,
    base_price: i64,
    currency: String,
    capacity_per_slot: i32,
    duration_days: i32,
    price_tiers: Json<Vec<PriceTier>>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SlotRow {
    id: Uuid,
    item_id: Uuid,
    start_date: NaiveDate,
    end_date: NaiveDate,
    booked_count: i32,
}

impl From<SlotRow> for AvailabilitySlot {
    fn from(row: SlotRow) -> Self {
        AvailabilitySlot {
            id: row.id,
            start_date: row.start_date,
            end_date: row.end_date,
            booked_count: u32::try_from(row.booked_count).unwrap_or(0),
        }
    }
}

impl ItemRow {
    fn into_item(self, slots: Vec<AvailabilitySlot>) -> Result<CatalogItem, StoreError> {
        let kind = ItemKind::parse(&self.kind)
            .ok_or_else(|| StoreError::Backend(format!("unknown item kind {}", self.kind)))?;
        Ok(CatalogItem {
            id: self.id,
            kind,
            title: self.title,
            description: self.description,
            base_price: self.base_price,
            currency: self.currency,
            capacity_per_slot: to_u32(self.capacity_per_slot),
            duration_days: to_u32(self.duration_days),
            price_tiers: self.price_tiers.0,
            availability_slots: slots,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

pub(crate) fn to_i32(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Backend(format!("{} does not fit the column", value)))
}

const ITEM_COLUMNS: &str = "id, kind, title, description, base_price, currency, capacity_per_slot, \
     duration_days, price_tiers, is_active, created_at, updated_at";

async fn insert_slot(
    tx: &mut Transaction<'_, Postgres>,
    item_id: Uuid,
    slot: &AvailabilitySlot,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO availability_slots (id, item_id, start_date, end_date, booked_count) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(slot.id)
    .bind(item_id)
    .bind(slot.start_date)
    .bind(slot.end_date)
    .bind(to_i32(slot.booked_count)?)
    .execute(&mut **tx)
    .await
    .map_err(store_error)?;
    Ok(())
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn create_item(&self, item: &CatalogItem) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        sqlx::query(
            r#"
            INSERT INTO catalog_items (id, kind, title, description, base_price, currency, capacity_per_slot,
                                       duration_days, price_tiers, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(item.id)
        .bind(item.kind.as_str())
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.base_price)
        .bind(&item.currency)
        .bind(to_i32(item.capacity_per_slot)?)
        .bind(to_i32(item.duration_days)?)
        .bind(Json(&item.price_tiers))
        .bind(item.is_active)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        for slot in &item.availability_slots {
            insert_slot(&mut tx, item.id, slot).await?;
        }

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<CatalogItem>, StoreError> {
        let row: Option<ItemRow> = sqlx::query_as(&format!("SELECT {} FROM catalog_items WHERE id = $1", ITEM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let slots: Vec<SlotRow> = sqlx::query_as(
            "SELECT id, item_id, start_date, end_date, booked_count FROM availability_slots \
             WHERE item_id = $1 ORDER BY start_date",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        row.into_item(slots.into_iter().map(AvailabilitySlot::from).collect())
            .map(Some)
    }

    async fn list_items(&self) -> Result<Vec<CatalogItem>, StoreError> {
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM catalog_items ORDER BY created_at DESC",
            ITEM_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let slot_rows: Vec<SlotRow> = sqlx::query_as(
            "SELECT id, item_id, start_date, end_date, booked_count FROM availability_slots ORDER BY start_date",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let mut slots: HashMap<Uuid, Vec<AvailabilitySlot>> = HashMap::new();
        for slot in slot_rows {
            slots.entry(slot.item_id).or_default().push(slot.into());
        }

        rows.into_iter()
            .map(|row| {
                let item_slots = slots.remove(&row.id).unwrap_or_default();
                row.into_item(item_slots)
            })
            .collect()
    }

    async fn update_item(&self, item: &CatalogItem) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // Row lock serializes against reservations, which take FOR SHARE on the item.
        let locked: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM catalog_items WHERE id = $1 FOR UPDATE")
            .bind(item.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("catalog item {}", item.id)));
        }

        let (booked,): (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(booked_count), 0) FROM availability_slots WHERE item_id = $1")
                .bind(item.id)
                .fetch_one(&mut *tx)
                .await
                .map_err(store_error)?;
        let booked = to_u32(booked);
        if item.capacity_per_slot < booked {
            return Err(StoreError::CapacityBelowBooked {
                capacity: item.capacity_per_slot,
                booked,
            });
        }

        sqlx::query(
            r#"
            UPDATE catalog_items
            SET title = $2, description = $3, base_price = $4, capacity_per_slot = $5,
                price_tiers = $6, is_active = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(item.id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.base_price)
        .bind(to_i32(item.capacity_per_slot)?)
        .bind(Json(&item.price_tiers))
        .bind(item.is_active)
        .bind(item.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn add_slot(&self, item_id: Uuid, slot: &AvailabilitySlot) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let locked: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM catalog_items WHERE id = $1 FOR UPDATE")
            .bind(item_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("catalog item {}", item_id)));
        }

        let overlapping: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM availability_slots WHERE item_id = $1 AND start_date <= $3 AND end_date >= $2 LIMIT 1",
        )
        .bind(item_id)
        .bind(slot.start_date)
        .bind(slot.end_date)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;
        if let Some((existing,)) = overlapping {
            return Err(StoreError::Conflict(format!("slot overlaps existing slot {}", existing)));
        }

        insert_slot(&mut tx, item_id, slot).await?;
        sqlx::query("UPDATE catalog_items SET updated_at = NOW() WHERE id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn delete_item(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // Conflicts with the reservation's FOR SHARE, so no booking lands between check and delete.
        let locked: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM catalog_items WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("catalog item {}", id)));
        }

        let (open,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM bookings WHERE catalog_item_id = $1 \
             AND status IN ('pending', 'confirmed', 'in_progress'))",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;
        if open {
            return Err(StoreError::Referenced(format!("catalog item {}", id)));
        }

        sqlx::query("DELETE FROM catalog_items WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }
}
