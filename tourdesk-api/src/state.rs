use std::sync::Arc;
use tourdesk_booking::{BookingManager, CatalogService, PaymentOrchestrator};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingManager>,
    pub catalog: Arc<CatalogService>,
    pub payments: Arc<PaymentOrchestrator>,
    pub auth: AuthConfig,
    /// Applied to new catalog items that name no currency.
    pub default_currency: String,
}
