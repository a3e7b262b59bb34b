pub mod app_config;
pub mod database;
pub mod catalog_repo;
pub mod booking_repo;
pub mod events;
pub mod notifier;

pub use app_config::{Config, StorageBackend};
pub use database::DbClient;
pub use catalog_repo::PgCatalogRepository;
pub use booking_repo::PgBookingRepository;
pub use events::EventProducer;
pub use notifier::KafkaNotifier;
