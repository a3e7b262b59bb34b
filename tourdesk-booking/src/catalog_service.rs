use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tourdesk_catalog::inventory::{self, Availability};
use tourdesk_catalog::{
    AvailabilitySlot, CatalogError, CatalogItem, CatalogItemUpdate, NewCatalogItem, PricingCalculator, Quote,
};
use tourdesk_core::{BookingError, BookingResult, Clock};
use tracing::info;
use uuid::Uuid;

use crate::manager::require_admin;
use crate::models::Requester;
use crate::repository::CatalogRepository;

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityView {
    pub item_id: Uuid,
    pub date: NaiveDate,
    pub party_size: u32,
    pub available: bool,
    pub slot_id: Option<Uuid>,
    pub remaining: Option<u32>,
}

/// Public catalog reads and admin catalog maintenance.
pub struct CatalogService {
    catalog: Arc<dyn CatalogRepository>,
    clock: Arc<dyn Clock>,
    pricing: PricingCalculator,
}

impl CatalogService {
    pub fn new(catalog: Arc<dyn CatalogRepository>, clock: Arc<dyn Clock>, pricing: PricingCalculator) -> Self {
        Self { catalog, clock, pricing }
    }

    pub async fn get_item(&self, item_id: Uuid) -> BookingResult<CatalogItem> {
        self.catalog
            .get_item(item_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("catalog item {}", item_id)))
    }

    /// Active items only.
    pub async fn list_items(&self) -> BookingResult<Vec<CatalogItem>> {
        let items = self.catalog.list_items().await?;
        Ok(items.into_iter().filter(|i| i.is_active).collect())
    }

    pub async fn availability(&self, item_id: Uuid, date: NaiveDate, party_size: u32) -> BookingResult<AvailabilityView> {
        let item = self.get_item(item_id).await?;

        let (available, slot_id, remaining) = match inventory::check(&item, date, party_size) {
            Availability::Available { slot_id, remaining } => (party_size >= 1, Some(slot_id), Some(remaining)),
            Availability::Insufficient { slot_id, remaining } => (false, Some(slot_id), Some(remaining)),
            Availability::NoInventory => (false, None, None),
        };

        Ok(AvailabilityView {
            item_id,
            date,
            party_size,
            available,
            slot_id,
            remaining,
        })
    }

    pub async fn quote(&self, item_id: Uuid, date: NaiveDate, party_size: u32) -> BookingResult<Quote> {
        let item = self.get_item(item_id).await?;
        self.pricing
            .compute_price(&item, date, party_size)
            .map_err(|e| BookingError::Validation(e.to_string()))
    }

    pub async fn create_item(&self, requester: &Requester, draft: NewCatalogItem) -> BookingResult<CatalogItem> {
        require_admin(requester)?;
        let item = CatalogItem::new(draft, self.clock.now()).map_err(catalog_error)?;
        self.catalog.create_item(&item).await?;

        info!("Catalog item {} created: {}", item.id, item.title);
        Ok(item)
    }

    pub async fn add_slot(
        &self,
        requester: &Requester,
        item_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> BookingResult<CatalogItem> {
        require_admin(requester)?;
        let mut item = self.get_item(item_id).await?;
        let slot = AvailabilitySlot::new(start_date, end_date);

        // Validate against the loaded copy first for a precise error.
        item.add_slot(slot.clone(), self.clock.now()).map_err(catalog_error)?;
        self.catalog.add_slot(item_id, &slot).await?;

        info!("Slot {} ({} to {}) added to {}", slot.id, start_date, end_date, item_id);
        Ok(item)
    }

    pub async fn update_item(
        &self,
        requester: &Requester,
        item_id: Uuid,
        update: CatalogItemUpdate,
    ) -> BookingResult<CatalogItem> {
        require_admin(requester)?;
        let mut item = self.get_item(item_id).await?;
        item.apply_update(update, self.clock.now()).map_err(catalog_error)?;
        self.catalog.update_item(&item).await?;
        Ok(item)
    }

    pub async fn delete_item(&self, requester: &Requester, item_id: Uuid) -> BookingResult<()> {
        require_admin(requester)?;
        self.catalog.delete_item(item_id).await?;
        info!("Catalog item {} deleted", item_id);
        Ok(())
    }
}

fn catalog_error(err: CatalogError) -> BookingError {
    match err {
        CatalogError::SlotOverlap { .. } => BookingError::Conflict(err.to_string()),
        CatalogError::Invalid(_) | CatalogError::CapacityBelowBooked { .. } => BookingError::Validation(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::tests::{adult, fixture, request, start_date};
    use tourdesk_catalog::ItemKind;

    fn service(f: &crate::manager::tests::Fixture) -> CatalogService {
        CatalogService::new(f.store.clone(), f.clock.clone(), PricingCalculator::default())
    }

    #[tokio::test]
    async fn test_availability_view_tracks_bookings() {
        let f = fixture(5000, 3).await;
        let catalog = service(&f);

        let view = catalog.availability(f.item_id, start_date(), 3).await.unwrap();
        assert!(view.available);
        assert_eq!(view.remaining, Some(3));

        f.manager
            .create_booking(&Requester::customer("alice"), request(f.item_id, vec![adult("A"), adult("B")]))
            .await
            .unwrap();

        let view = catalog.availability(f.item_id, start_date(), 2).await.unwrap();
        assert!(!view.available);
        assert_eq!(view.remaining, Some(1));

        let off_season = catalog
            .availability(f.item_id, NaiveDate::from_ymd_opt(2031, 1, 1).unwrap(), 1)
            .await
            .unwrap();
        assert!(!off_season.available);
        assert_eq!(off_season.slot_id, None);
    }

    #[tokio::test]
    async fn test_quote_and_unknown_item() {
        let f = fixture(5000, 10).await;
        let catalog = service(&f);

        let quote = catalog.quote(f.item_id, start_date(), 3).await.unwrap();
        assert_eq!(quote.total, 16500);

        assert!(matches!(
            catalog.quote(Uuid::new_v4(), start_date(), 1).await,
            Err(BookingError::NotFound(_))
        ));
        assert!(matches!(
            catalog.quote(f.item_id, start_date(), 0).await,
            Err(BookingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_catalog_maintenance() {
        let f = fixture(5000, 4).await;
        let catalog = service(&f);
        let admin = Requester::admin("ops");

        let draft = NewCatalogItem {
            kind: ItemKind::Service,
            title: "Airport transfer".to_string(),
            description: None,
            base_price: 2500,
            currency: "usd".to_string(),
            capacity_per_slot: 6,
            duration_days: 1,
            price_tiers: vec![],
        };
        assert!(matches!(
            catalog.create_item(&Requester::customer("alice"), draft.clone()).await,
            Err(BookingError::Forbidden(_))
        ));
        let created = catalog.create_item(&admin, draft).await.unwrap();
        assert_eq!(created.currency, "USD");

        let err = catalog
            .add_slot(&admin, f.item_id, start_date(), start_date())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));

        f.manager
            .create_booking(&Requester::customer("alice"), request(f.item_id, vec![adult("A"), adult("B"), adult("C")]))
            .await
            .unwrap();
        let shrink = CatalogItemUpdate {
            capacity_per_slot: Some(2),
            ..Default::default()
        };
        assert!(matches!(
            catalog.update_item(&admin, f.item_id, shrink).await,
            Err(BookingError::Validation(_))
        ));
        assert!(matches!(
            catalog.delete_item(&admin, f.item_id).await,
            Err(BookingError::InvalidState(_))
        ));

        let hide = CatalogItemUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        catalog.update_item(&admin, f.item_id, hide).await.unwrap();
        let listed = catalog.list_items().await.unwrap();
        assert!(listed.iter().all(|i| i.id != f.item_id));
        assert!(!catalog.availability(f.item_id, start_date(), 1).await.unwrap().available);
    }
}
