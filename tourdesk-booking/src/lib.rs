pub mod models;
pub mod repository;
pub mod memory;
pub mod notifier;
pub mod reconciliation;
pub mod manager;
pub mod catalog_service;
pub mod orchestrator;

pub use models::{Booking, BookingRequest, BookingStatus, PaymentStatus, Requester, Role, Traveler, TravelerType};
pub use repository::{BookingRepository, CatalogRepository, StoreError};
pub use memory::InMemoryStore;
pub use notifier::{LogNotifier, Notifier};
pub use reconciliation::Reconciliation;
pub use manager::{BookingManager, LifecycleRules};
pub use catalog_service::{AvailabilityView, CatalogService};
pub use orchestrator::{PaymentOrchestrator, SandboxGateway};
