pub mod product;
pub mod pricing;
pub mod inventory;

pub use product::{AvailabilitySlot, CatalogError, CatalogItem, CatalogItemUpdate, ItemKind, NewCatalogItem, PriceTier};
pub use pricing::{PricingCalculator, PricingError, Quote, DEFAULT_TAX_RATE_BPS};
pub use inventory::{check_availability, Availability, InventoryError};
