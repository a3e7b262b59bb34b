use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tourdesk_api::{app, state::{AppState, AuthConfig}};
use tourdesk_booking::{
    BookingManager, BookingRepository, CatalogRepository, CatalogService, InMemoryStore, LifecycleRules,
    LogNotifier, Notifier, PaymentOrchestrator, SandboxGateway,
};
use tourdesk_catalog::PricingCalculator;
use tourdesk_core::{Clock, SystemClock, WebhookVerifier};
use tourdesk_store::{Config, DbClient, EventProducer, KafkaNotifier, PgBookingRepository, PgCatalogRepository, StorageBackend};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tourdesk_api=debug,tourdesk_booking=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting TourDesk API on port {}", config.server.port);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut rules = config.business_rules.clone();
    let (catalog_repo, booking_repo): (Arc<dyn CatalogRepository>, Arc<dyn BookingRepository>) =
        match config.storage.backend {
            StorageBackend::Postgres => {
                let db = DbClient::new(&config.database)
                    .await
                    .context("Failed to connect to Postgres")?;
                db.migrate().await.context("Failed to run migrations")?;
                rules = db.fetch_business_rules(rules).await.unwrap_or_else(|e| {
                    tracing::warn!("Using configured business rules, overrides unavailable: {}", e);
                    config.business_rules.clone()
                });
                (
                    Arc::new(PgCatalogRepository::new(db.pool.clone())) as Arc<dyn CatalogRepository>,
                    Arc::new(
                        PgBookingRepository::new(db.pool.clone()).with_reservation_timeout(rules.reservation_timeout()),
                    ) as Arc<dyn BookingRepository>,
                )
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
                (store.clone() as Arc<dyn CatalogRepository>, store as Arc<dyn BookingRepository>)
            }
        };

    let notifier: Arc<dyn Notifier> = match &config.kafka.brokers {
        Some(brokers) => {
            let producer = EventProducer::new(brokers).context("Failed to create Kafka producer")?;
            Arc::new(KafkaNotifier::new(producer))
        }
        None => Arc::new(LogNotifier),
    };

    let pricing = PricingCalculator::new(rules.tax_rate_bps);

    let bookings = Arc::new(BookingManager::new(
        catalog_repo.clone(),
        booking_repo,
        notifier,
        clock.clone(),
        pricing.clone(),
        LifecycleRules {
            cancellation_window: rules.cancellation_window(),
            reservation_timeout: rules.reservation_timeout(),
        },
    ));

    let verifier = WebhookVerifier::new(
        config.payments.webhook_secret.clone(),
        config.payments.webhook_tolerance_seconds,
    );
    let gateway = Arc::new(SandboxGateway::new(verifier, clock.clone()));

    let app_state = AppState {
        catalog: Arc::new(CatalogService::new(catalog_repo, clock, pricing)),
        payments: Arc::new(PaymentOrchestrator::new(gateway, bookings.clone())),
        bookings,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        default_currency: rules.currency.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
